//! MCP over HTTP: one endpoint, session correlated by header.
//!
//! - `POST /mcp`: one JSON-RPC request per body. Replies are `200` with a
//!   JSON-RPC body, protocol errors included. Accepted notifications get
//!   `202` and no body. `initialize` replies carry `Mcp-Session-Id`.
//! - `DELETE /mcp`: close the session named in `Mcp-Session-Id`.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use larkdocs_mcp::{JsonRpcResponse, SESSION_HEADER, parse_envelope};
use larkdocs_session::SessionId;
use tracing::{debug, warn};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// `Mcp-Session-Id` as a typed header name.
pub const SESSION_HEADER_NAME: HeaderName = HeaderName::from_static("mcp-session-id");

/// Create the MCP endpoint routes.
pub fn mcp_routes() -> Router<AppState> {
    Router::new().route("/mcp", post(mcp_post_handler).delete(mcp_delete_handler))
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(&SESSION_HEADER_NAME).and_then(|v| v.to_str().ok())
}

/// POST /mcp - Handle one JSON-RPC request.
pub async fn mcp_post_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match parse_envelope(&body) {
        Ok(request) => request,
        Err(rejected) => {
            warn!(kind = rejected.error.kind(), error = %rejected.error, "Rejected envelope");
            return Json(JsonRpcResponse::from_protocol_error(
                rejected.id,
                &rejected.error,
            ))
            .into_response();
        }
    };

    debug!(method = %request.method, id = ?request.id, "MCP request");

    let outcome = state
        .dispatcher
        .dispatch(request, session_header(&headers))
        .await;

    let Some(reply) = outcome.response else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut response = Json(reply).into_response();
    if let Some(session_id) = outcome.session_id {
        match HeaderValue::from_str(&session_id.to_string()) {
            Ok(value) => {
                response.headers_mut().insert(SESSION_HEADER_NAME, value);
            }
            Err(e) => warn!(error = %e, "Session id is not a valid header value"),
        }
    }
    response
}

/// DELETE /mcp - Close a session.
pub async fn mcp_delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let raw = session_header(&headers)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::BadRequest(format!("missing {} header", SESSION_HEADER)))?;

    let id: SessionId = raw
        .parse()
        .map_err(|_| ServerError::NotFound(format!("session {}", raw)))?;

    if state.sessions.close(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("session {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app, body_json};
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn post(body: impl Into<Body>, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.body(body.into()).unwrap()
    }

    fn initialize_body() -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0.0.1" }
            }
        })
        .to_string()
    }

    async fn initialize(app: &Router) -> String {
        let response = app.clone().oneshot(post(initialize_body(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get(SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_initialize_sets_session_header() {
        let app = app();
        let response = app.oneshot(post(initialize_body(), None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let session = response.headers().get(SESSION_HEADER).unwrap();
        assert_eq!(session.len(), 32);

        let body = body_json(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_parse_error_is_200_with_null_id() {
        let response = app().oneshot(post("{not json", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_wrong_version_is_invalid_request_with_id() {
        let body = json!({ "jsonrpc": "1.0", "id": 8, "method": "tools/list" }).to_string();
        let response = app().oneshot(post(body, None)).await.unwrap();

        let body = body_json(response).await;
        assert_eq!(body["id"], 8);
        assert_eq!(body["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_notification_is_202() {
        let app = app();
        let session = initialize(&app).await;

        let body = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string();
        let response = app.oneshot(post(body, Some(&session))).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_tools_list_with_session() {
        let app = app();
        let session = initialize(&app).await;

        let body = json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }).to_string();
        let response = app.oneshot(post(body, Some(&session))).await.unwrap();
        assert!(response.headers().get(SESSION_HEADER).is_none());

        let body = body_json(response).await;
        assert_eq!(body["result"]["tools"][0]["name"], "docs");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let body = format!(
            r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#,
            "x".repeat(8192)
        );
        let response = app().oneshot(post(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_delete_closes_session() {
        let app = app();
        let session = initialize(&app).await;

        let delete = |session: &str| {
            Request::builder()
                .method(Method::DELETE)
                .uri("/mcp")
                .header(SESSION_HEADER, session)
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(delete(&session)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.clone().oneshot(delete(&session)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" }).to_string();
        let response = app.oneshot(post(body, Some(&session))).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn test_delete_without_header_is_400() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/mcp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
