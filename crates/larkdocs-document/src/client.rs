//! Upstream client for the Lark docx raw content API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::{DocumentError, UpstreamError};
use crate::types::RawDocument;

/// Default open-platform API domain.
pub const DEFAULT_API_DOMAIN: &str = "https://open.larksuite.com";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream bodies kept in failures are cut to this many bytes.
pub const MAX_ERROR_BODY: usize = 2048;

/// Source of raw document content.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch a document's raw text. Performs exactly one request and never
    /// retries.
    async fn fetch_raw_content(
        &self,
        document_id: &str,
        lang: u32,
        bearer_token: &str,
    ) -> Result<RawDocument, UpstreamError>;
}

/// reqwest-backed [`DocumentSource`] for the Lark open platform.
#[derive(Debug, Clone)]
pub struct LarkDocumentClient {
    api_domain: String,
    client: reqwest::Client,
}

impl LarkDocumentClient {
    /// Create a client for `api_domain` with the default timeout.
    pub fn new(api_domain: impl Into<String>) -> Result<Self, DocumentError> {
        Self::with_timeout(api_domain, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        api_domain: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DocumentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocumentError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_domain: api_domain.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// URL of the raw content endpoint for a document.
    pub fn raw_content_url(&self, document_id: &str) -> String {
        format!(
            "{}/open-apis/docx/v1/documents/{}/raw_content",
            self.api_domain,
            urlencoding::encode(document_id)
        )
    }
}

#[async_trait]
impl DocumentSource for LarkDocumentClient {
    async fn fetch_raw_content(
        &self,
        document_id: &str,
        lang: u32,
        bearer_token: &str,
    ) -> Result<RawDocument, UpstreamError> {
        tracing::debug!(document_id = %document_id, lang, "Fetching raw content");

        let response = self
            .client
            .get(self.raw_content_url(document_id))
            .query(&[("lang", lang)])
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Network("request timed out".to_string())
                } else {
                    UpstreamError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Network(format!("failed to read response body: {}", e)))?;

        let result = interpret_response(status, &body);
        match &result {
            Ok(doc) => tracing::debug!(
                document_id = %document_id,
                bytes = doc.content.len(),
                "Fetched raw content"
            ),
            Err(e) => tracing::warn!(
                document_id = %document_id,
                status = status.as_u16(),
                error = %e,
                "Raw content fetch failed"
            ),
        }
        result
    }
}

/// Map a content API response onto a document or a typed failure.
fn interpret_response(status: StatusCode, body: &str) -> Result<RawDocument, UpstreamError> {
    match status {
        StatusCode::UNAUTHORIZED => {
            return Err(UpstreamError::Unauthorized {
                body: truncate_body(body),
            });
        }
        StatusCode::FORBIDDEN => {
            return Err(UpstreamError::Forbidden {
                body: truncate_body(body),
            });
        }
        s if !s.is_success() => {
            return Err(UpstreamError::Http {
                status: s.as_u16(),
                body: truncate_body(body),
            });
        }
        _ => {}
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("body is not JSON: {}", e)))?;

    if let Some(code) = value.get("code").and_then(Value::as_i64)
        && code != 0
    {
        let msg = value
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(UpstreamError::Http {
            status: status.as_u16(),
            body: truncate_body(&format!("code {}: {}", code, msg)),
        });
    }

    let data = value
        .get("data")
        .cloned()
        .ok_or_else(|| UpstreamError::InvalidResponse("missing data object".to_string()))?;

    let content = data
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| UpstreamError::InvalidResponse("data.content is not a string".to_string()))?
        .to_string();

    Ok(RawDocument { content, data })
}

/// Cut a body to [`MAX_ERROR_BODY`] bytes on a character boundary.
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_PATH: &str = "/open-apis/docx/v1/documents/ABC123/raw_content";

    fn client_for(server: &MockServer) -> LarkDocumentClient {
        LarkDocumentClient::new(server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .and(query_param("lang", "0"))
            .and(header("authorization", "Bearer t-valid"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "code": 0, "msg": "success", "data": { "content": "hello" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let doc = client_for(&server)
            .fetch_raw_content("ABC123", 0, "t-valid")
            .await
            .unwrap();
        assert_eq!(doc.content, "hello");
        assert_eq!(doc.data["content"], "hello");
    }

    #[tokio::test]
    async fn test_body_without_code_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "content": "hello" } })),
            )
            .mount(&server)
            .await;

        let doc = client_for(&server)
            .fetch_raw_content("ABC123", 0, "t")
            .await
            .unwrap();
        assert_eq!(doc.content, "hello");
    }

    #[tokio::test]
    async fn test_lang_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .and(query_param("lang", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "content": "x" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .fetch_raw_content("ABC123", 2, "t")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_and_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"code\":99991663}"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/open-apis/docx/v1/documents/Locked/raw_content"))
            .respond_with(ResponseTemplate::new(403).set_body_string("no permission"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_raw_content("ABC123", 0, "t").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unauthorized { ref body } if body.contains("99991663")));

        let err = client.fetch_raw_content("Locked", 0, "t").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Forbidden { .. }));
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_raw_content("ABC123", 0, "t")
            .await
            .unwrap_err();
        match err {
            UpstreamError::Http { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_raw_content("ABC123", 0, "t")
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_platform_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "code": 1770002, "msg": "not found" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_raw_content("ABC123", 0, "t")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::types::FailureKind::UpstreamHttpError);
        assert!(err.body().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_failure() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = LarkDocumentClient::new(format!("http://{}", addr)).unwrap();
        let err = client.fetch_raw_content("ABC123", 0, "t").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Network(_)));
    }

    #[test]
    fn test_missing_content_is_invalid() {
        let err = interpret_response(StatusCode::OK, r#"{"code":0,"data":{}}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidResponse(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(MAX_ERROR_BODY);
        let cut = truncate_body(&long);
        assert!(cut.len() <= MAX_ERROR_BODY + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn test_raw_content_url_trims_slash() {
        let client = LarkDocumentClient::new("https://open.larksuite.com/").unwrap();
        assert_eq!(
            client.raw_content_url("ABC123"),
            "https://open.larksuite.com/open-apis/docx/v1/documents/ABC123/raw_content"
        );
    }
}
