//! JSON-RPC method routing.
//!
//! The dispatcher sees envelopes that already passed
//! [`parse_envelope`](larkdocs_mcp::parse_envelope). The session id is
//! resolved at the HTTP boundary and handed in explicitly; the dispatcher
//! never looks at transport state.

use std::sync::Arc;

use larkdocs_document::DocumentSource;
use larkdocs_mcp::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ProtocolError, RequestId, ServerCapabilities, ServerInfo,
};
use larkdocs_oauth::CredentialManager;
use larkdocs_session::{Session, SessionId, SessionManager};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::tool::{self, DocumentArgs, DocumentTool};

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "larkdocs";

const INSTRUCTIONS: &str =
    "Call the `docs` tool with a Lark document URL to read the document's raw text.";

/// What the transport should send back.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// `None` for an accepted notification.
    pub response: Option<JsonRpcResponse>,
    /// Session created by this request, to be returned out of band.
    pub session_id: Option<SessionId>,
}

impl DispatchOutcome {
    fn reply(response: JsonRpcResponse) -> Self {
        Self {
            response: Some(response),
            session_id: None,
        }
    }

    fn accepted() -> Self {
        Self {
            response: None,
            session_id: None,
        }
    }
}

/// Routes protocol methods to their handlers.
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    tool: DocumentTool,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionManager>,
        credentials: Arc<CredentialManager>,
        documents: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            sessions,
            tool: DocumentTool::new(credentials, documents),
        }
    }

    /// Handle one request. `session_header` is the raw `Mcp-Session-Id`
    /// value, if the caller sent one.
    pub async fn dispatch(
        &self,
        request: JsonRpcRequest,
        session_header: Option<&str>,
    ) -> DispatchOutcome {
        let id = request.response_id();

        if request.is_notification() {
            return match self.notification(&request, session_header).await {
                Ok(()) => DispatchOutcome::accepted(),
                Err(e) => DispatchOutcome::reply(error_response(id, &request.method, e)),
            };
        }

        match self.call(&request, session_header).await {
            Ok((result, session_id)) => DispatchOutcome {
                response: Some(JsonRpcResponse::success(id, result)),
                session_id,
            },
            Err(e) => DispatchOutcome::reply(error_response(id, &request.method, e)),
        }
    }

    async fn call(
        &self,
        request: &JsonRpcRequest,
        session_header: Option<&str>,
    ) -> Result<(Value, Option<SessionId>), ProtocolError> {
        match request.method.as_str() {
            // Any session header on initialize is ignored.
            "initialize" => {
                let (result, session_id) = self.initialize(request.params.clone()).await?;
                Ok((result, Some(session_id)))
            }
            "ping" => {
                self.require_session(session_header).await?;
                Ok((json!({}), None))
            }
            "tools/list" => {
                self.require_session(session_header).await?;
                let result = ListToolsResult {
                    tools: vec![tool::tool_info()],
                };
                Ok((encode(&result)?, None))
            }
            "tools/call" => {
                let session = self.require_session(session_header).await?;
                let result = self.call_tool(request.params.clone(), &session).await?;
                Ok((result, None))
            }
            other => Err(ProtocolError::MethodNotFound(other.to_string())),
        }
    }

    async fn notification(
        &self,
        request: &JsonRpcRequest,
        session_header: Option<&str>,
    ) -> Result<(), ProtocolError> {
        if request.method == "initialize" {
            return Err(ProtocolError::InvalidRequest(
                "initialize must carry an id".to_string(),
            ));
        }

        let session = self.require_session(session_header).await?;
        match request.method.as_str() {
            "notifications/initialized" => {
                debug!(session_id = %session.id, "Client initialized");
            }
            other => {
                debug!(session_id = %session.id, method = %other, "Ignoring notification");
            }
        }
        Ok(())
    }

    async fn initialize(&self, params: Option<Value>) -> Result<(Value, SessionId), ProtocolError> {
        let params: InitializeParams = decode_params(params)?;

        let session_id = self
            .sessions
            .create_session(params.client_info.clone(), &params.protocol_version)
            .await?;

        debug!(
            session_id = %session_id,
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            "Initialize accepted"
        );

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: ServerCapabilities::tools_only(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };

        Ok((encode(&result)?, session_id))
    }

    async fn call_tool(&self, params: Option<Value>, session: &Session) -> Result<Value, ProtocolError> {
        let params: CallToolParams = decode_params(params)?;
        if !tool::is_document_tool(&params.name) {
            return Err(ProtocolError::UnknownTool(params.name));
        }

        let args = DocumentArgs::parse(params.arguments.as_ref())?;
        debug!(session_id = %session.id, tool = %params.name, url = %args.url, "Tool call");

        let result = self.tool.call(args).await?;
        encode(&result)
    }

    /// Validate and touch the session named by the header.
    async fn require_session(&self, session_header: Option<&str>) -> Result<Session, ProtocolError> {
        let Some(raw) = session_header.map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(ProtocolError::UnknownSession(
                "missing Mcp-Session-Id header".to_string(),
            ));
        };

        let session = self.sessions.validate(raw).await?;
        self.sessions.touch(&session.id).await;
        Ok(session)
    }
}

fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ProtocolError> {
    let params = params.ok_or_else(|| ProtocolError::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value)
        .map_err(|e| ProtocolError::Internal(format!("failed to encode result: {}", e)))
}

fn error_response(id: RequestId, method: &str, error: ProtocolError) -> JsonRpcResponse {
    match &error {
        ProtocolError::Internal(detail) => {
            error!(method = %method, error = %detail, "Internal error handling request");
        }
        other => warn!(method = %method, kind = other.kind(), error = %other, "Request rejected"),
    }
    JsonRpcResponse::from_protocol_error(id, &error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use larkdocs_document::{RawDocument, UpstreamError};
    use larkdocs_mcp::JsonRpcError;
    use larkdocs_oauth::CredentialSettings;
    use larkdocs_session::SessionConfig;

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for CountingSource {
        async fn fetch_raw_content(
            &self,
            document_id: &str,
            _lang: u32,
            _bearer_token: &str,
        ) -> Result<RawDocument, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawDocument {
                content: format!("content of {}", document_id),
                data: json!({ "content": format!("content of {}", document_id) }),
            })
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<SessionManager>, Arc<CountingSource>) {
        let sessions = Arc::new(SessionManager::new(SessionConfig::default()));
        let credentials = Arc::new(
            CredentialManager::new(CredentialSettings::new().with_bearer_token("t-static")).unwrap(),
        );
        let source = Arc::new(CountingSource::default());
        (
            Dispatcher::new(sessions.clone(), credentials, source.clone()),
            sessions,
            source,
        )
    }

    fn rpc(id: i64, method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(id, method, params)
    }

    fn initialize_request(version: &str) -> JsonRpcRequest {
        rpc(
            1,
            "initialize",
            Some(json!({
                "protocolVersion": version,
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0" }
            })),
        )
    }

    async fn open_session(dispatcher: &Dispatcher) -> String {
        let outcome = dispatcher
            .dispatch(initialize_request("2024-11-05"), None)
            .await;
        outcome.session_id.unwrap().to_string()
    }

    fn error_code(outcome: &DispatchOutcome) -> i64 {
        outcome.response.as_ref().unwrap().error.as_ref().unwrap().code
    }

    #[tokio::test]
    async fn test_initialize_creates_session() {
        let (dispatcher, sessions, _) = dispatcher();
        let outcome = dispatcher
            .dispatch(initialize_request("2024-11-05"), Some("stale-id"))
            .await;

        let session_id = outcome.session_id.unwrap();
        let response = outcome.response.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "larkdocs");
        assert!(result.get("sessionId").is_none());
        assert!(sessions.validate(&session_id.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_initialize_rejects_unknown_version() {
        let (dispatcher, sessions, _) = dispatcher();
        let outcome = dispatcher
            .dispatch(initialize_request("1999-01-01"), None)
            .await;

        assert!(outcome.session_id.is_none());
        assert_eq!(error_code(&outcome), JsonRpcError::UNSUPPORTED_PROTOCOL_VERSION);
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_initialize_at_session_limit_keeps_existing_sessions() {
        let sessions = Arc::new(SessionManager::new(SessionConfig::new().with_max_sessions(1)));
        let credentials = Arc::new(
            CredentialManager::new(CredentialSettings::new().with_bearer_token("t-static")).unwrap(),
        );
        let dispatcher = Dispatcher::new(
            sessions.clone(),
            credentials,
            Arc::new(CountingSource::default()),
        );

        let existing = open_session(&dispatcher).await;
        let outcome = dispatcher
            .dispatch(initialize_request("2024-11-05"), None)
            .await;

        assert!(outcome.session_id.is_none());
        assert_eq!(error_code(&outcome), JsonRpcError::SESSION_LIMIT_REACHED);
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.data.unwrap()["kind"], "SessionLimitReached");
        assert!(sessions.validate(&existing).await.is_ok());
    }

    #[tokio::test]
    async fn test_initialize_without_params_is_invalid() {
        let (dispatcher, _, _) = dispatcher();
        let outcome = dispatcher
            .dispatch(rpc(1, "initialize", None), None)
            .await;
        assert_eq!(error_code(&outcome), JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_list_requires_session() {
        let (dispatcher, _, _) = dispatcher();
        let request = rpc(2, "tools/list", None);

        let outcome = dispatcher.dispatch(request.clone(), None).await;
        assert_eq!(error_code(&outcome), JsonRpcError::UNKNOWN_SESSION);

        let outcome = dispatcher
            .dispatch(request, Some("00000000000000000000000000000000"))
            .await;
        assert_eq!(error_code(&outcome), JsonRpcError::UNKNOWN_SESSION);
    }

    #[tokio::test]
    async fn test_tools_list_returns_document_tool() {
        let (dispatcher, _, _) = dispatcher();
        let session = open_session(&dispatcher).await;

        let outcome = dispatcher
            .dispatch(rpc(2, "tools/list", None), Some(&session))
            .await;
        let result = outcome.response.unwrap().result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "docs");
        assert_eq!(tools[0]["inputSchema"]["properties"]["lang"]["default"], 0);
    }

    #[tokio::test]
    async fn test_tools_call_before_initialize_never_creates_session() {
        let (dispatcher, sessions, source) = dispatcher();
        let request = rpc(
            3,
            "tools/call",
            Some(json!({ "name": "docs", "arguments": { "url": "https://x.larksuite.com/docx/ABC" } })),
        );

        let outcome = dispatcher.dispatch(request, None).await;
        assert_eq!(error_code(&outcome), JsonRpcError::UNKNOWN_SESSION);
        assert!(sessions.is_empty().await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tools_call_success_and_alias() {
        let (dispatcher, _, source) = dispatcher();
        let session = open_session(&dispatcher).await;

        for name in ["docs", "get_document_raw_content"] {
            let request = rpc(
                3,
                "tools/call",
                Some(json!({
                    "name": name,
                    "arguments": { "url": "https://example.larksuite.com/wiki/ABC123" }
                })),
            );
            let outcome = dispatcher.dispatch(request, Some(&session)).await;
            let result = outcome.response.unwrap().result.unwrap();
            assert_eq!(result["isError"], false);
            assert_eq!(result["structuredContent"]["document_id"], "ABC123");
            assert_eq!(result["structuredContent"]["raw_content"], "content of ABC123");
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool() {
        let (dispatcher, _, _) = dispatcher();
        let session = open_session(&dispatcher).await;

        let request = rpc(
            3,
            "tools/call",
            Some(json!({ "name": "search", "arguments": {} })),
        );
        let outcome = dispatcher.dispatch(request, Some(&session)).await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
        assert_eq!(error.data.unwrap()["kind"], "UnknownTool");
    }

    #[tokio::test]
    async fn test_tools_call_invalid_url_is_protocol_error() {
        let (dispatcher, _, source) = dispatcher();
        let session = open_session(&dispatcher).await;

        let request = JsonRpcRequest::new(
            "call-4",
            "tools/call",
            Some(json!({ "name": "docs", "arguments": { "url": "not-a-url" } })),
        );
        let outcome = dispatcher.dispatch(request, Some(&session)).await;
        let response = outcome.response.unwrap();
        assert_eq!(response.id, RequestId::from("call-4"));
        assert_eq!(response.error.unwrap().data.unwrap()["kind"], "InvalidUrl");
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (dispatcher, _, _) = dispatcher();
        let outcome = dispatcher
            .dispatch(rpc(9, "resources/list", None), None)
            .await;
        assert_eq!(error_code(&outcome), JsonRpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ping() {
        let (dispatcher, _, _) = dispatcher();
        let session = open_session(&dispatcher).await;
        let outcome = dispatcher
            .dispatch(rpc(5, "ping", None), Some(&session))
            .await;
        assert_eq!(outcome.response.unwrap().result.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_initialized_notification_is_accepted() {
        let (dispatcher, _, _) = dispatcher();
        let session = open_session(&dispatcher).await;

        let outcome = dispatcher
            .dispatch(
                JsonRpcRequest::notification("notifications/initialized", None),
                Some(&session),
            )
            .await;
        assert!(outcome.response.is_none());

        let outcome = dispatcher
            .dispatch(
                JsonRpcRequest::notification("notifications/initialized", None),
                None,
            )
            .await;
        assert_eq!(error_code(&outcome), JsonRpcError::UNKNOWN_SESSION);
    }

    #[tokio::test]
    async fn test_closed_session_is_rejected() {
        let (dispatcher, sessions, _) = dispatcher();
        let session = open_session(&dispatcher).await;
        let id: SessionId = session.parse().unwrap();
        assert!(sessions.close(&id).await);

        let outcome = dispatcher
            .dispatch(rpc(2, "tools/list", None), Some(&session))
            .await;
        assert_eq!(error_code(&outcome), JsonRpcError::UNKNOWN_SESSION);
    }
}
