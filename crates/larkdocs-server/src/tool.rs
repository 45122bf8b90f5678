//! The document-fetch tool.
//!
//! A call runs in four steps: validate the arguments, resolve the document
//! id, obtain a bearer token, fetch. Failures in the first two are
//! protocol errors and nothing leaves the process. Credential and upstream
//! failures are tool results with `success: false`.

use std::sync::Arc;

use larkdocs_document::{
    DocumentError, DocumentFailure, DocumentRequest, DocumentResult, DocumentSource, FailureKind,
};
use larkdocs_mcp::{CallToolResult, ProtocolError, ToolInfo};
use larkdocs_oauth::{CredentialManager, OAuthError};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

/// Advertised tool name.
pub const TOOL_NAME: &str = "docs";

/// Accepted alternative name.
pub const TOOL_ALIAS: &str = "get_document_raw_content";

/// Whether `name` refers to the document tool.
pub fn is_document_tool(name: &str) -> bool {
    name == TOOL_NAME || name == TOOL_ALIAS
}

/// Descriptor returned by `tools/list`.
pub fn tool_info() -> ToolInfo {
    ToolInfo {
        name: TOOL_NAME.to_string(),
        description: Some(
            "Fetch the raw text content of a Lark document by its URL.".to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Document URL; the last path segment is the document id"
                },
                "lang": {
                    "type": "integer",
                    "minimum": 0,
                    "default": 0,
                    "description": "Language of mentions in the returned text"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        }),
        output_schema: Some(json!({
            "type": "object",
            "properties": {
                "success": { "type": "boolean" },
                "document_id": { "type": "string" },
                "url": { "type": "string" },
                "raw_content": { "type": ["string", "null"] },
                "content": { "type": ["string", "null"] },
                "error": { "type": "object" }
            },
            "required": ["success", "document_id", "url", "raw_content", "content"]
        })),
    }
}

/// Validated tool arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentArgs {
    pub url: String,
    pub lang: Option<u32>,
}

impl DocumentArgs {
    /// Validate `tools/call` arguments against the input schema.
    pub fn parse(arguments: Option<&Map<String, Value>>) -> Result<Self, ProtocolError> {
        let Some(arguments) = arguments else {
            return Err(ProtocolError::InvalidParams(
                "arguments must be an object with a 'url' field".to_string(),
            ));
        };

        let url = match arguments.get("url") {
            Some(Value::String(url)) => url.clone(),
            Some(_) => {
                return Err(ProtocolError::InvalidParams(
                    "'url' must be a string".to_string(),
                ));
            }
            None => {
                return Err(ProtocolError::InvalidParams(
                    "missing required argument 'url'".to_string(),
                ));
            }
        };

        let lang = match arguments.get("lang") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        ProtocolError::InvalidParams(
                            "'lang' must be a non-negative integer".to_string(),
                        )
                    })?,
            ),
        };

        if let Some(unknown) = arguments.keys().find(|k| *k != "url" && *k != "lang") {
            return Err(ProtocolError::InvalidParams(format!(
                "unexpected argument '{}'",
                unknown
            )));
        }

        Ok(Self { url, lang })
    }
}

/// Executes document-tool calls.
pub struct DocumentTool {
    credentials: Arc<CredentialManager>,
    documents: Arc<dyn DocumentSource>,
}

impl DocumentTool {
    pub fn new(credentials: Arc<CredentialManager>, documents: Arc<dyn DocumentSource>) -> Self {
        Self {
            credentials,
            documents,
        }
    }

    /// Run one call. `Err` is a protocol error; `Ok` may still carry a
    /// failed fetch with `isError: true`.
    pub async fn call(&self, args: DocumentArgs) -> Result<CallToolResult, ProtocolError> {
        let request = DocumentRequest::new(args.url, args.lang).map_err(|e| match e {
            DocumentError::InvalidUrl { .. } => ProtocolError::InvalidUrl(e.to_string()),
            DocumentError::Config(msg) => ProtocolError::Internal(msg),
        })?;

        let result = self.fetch(&request).await;
        match &result.error {
            None => info!(
                document_id = %request.document_id,
                lang = request.lang,
                "Document fetched"
            ),
            Some(failure) => warn!(
                document_id = %request.document_id,
                kind = ?failure.kind,
                status = ?failure.status,
                "Document fetch failed"
            ),
        }

        let value = serde_json::to_value(&result)
            .map_err(|e| ProtocolError::Internal(format!("failed to encode result: {}", e)))?;
        Ok(CallToolResult::structured(value, !result.success))
    }

    async fn fetch(&self, request: &DocumentRequest) -> DocumentResult {
        let token = match self.credentials.get_authorization().await {
            Ok(token) => token,
            Err(e) => {
                let failure = self.credential_failure(e).await;
                return DocumentResult::failed(request, failure);
            }
        };

        debug!(document_id = %request.document_id, "Calling upstream");
        match self
            .documents
            .fetch_raw_content(&request.document_id, request.lang, &token)
            .await
        {
            Ok(document) => DocumentResult::succeeded(request, document),
            Err(e) => DocumentResult::failed(request, DocumentFailure::from(&e)),
        }
    }

    async fn credential_failure(&self, error: OAuthError) -> DocumentFailure {
        let kind = match &error {
            OAuthError::AuthExpired(_) => FailureKind::AuthExpired,
            OAuthError::Network(_) => FailureKind::NetworkFailure,
            OAuthError::Serialization(_) => FailureKind::InvalidResponse,
            OAuthError::NoCredential | OAuthError::InvalidRequest(_) | OAuthError::Config(_) => {
                FailureKind::NoCredential
            }
        };

        let failure = DocumentFailure::new(kind, error.to_string());
        if matches!(kind, FailureKind::NoCredential | FailureKind::AuthExpired)
            && let Some(url) = self.credentials.authorization_url().await
        {
            return failure.with_authorization_url(url);
        }
        failure
    }
}
