//! Request and result types for document fetches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, UpstreamError};
use crate::resolver::resolve_document_id;

/// A validated request for a document's raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    pub source_url: String,
    pub document_id: String,
    pub lang: u32,
}

impl DocumentRequest {
    /// Resolve the identifier from `source_url`. `lang` defaults to 0.
    pub fn new(source_url: impl Into<String>, lang: Option<u32>) -> Result<Self> {
        let source_url = source_url.into();
        let document_id = resolve_document_id(&source_url)?;
        Ok(Self {
            source_url,
            document_id,
            lang: lang.unwrap_or(0),
        })
    }
}

/// Successful upstream payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// `data.content` from the response.
    pub content: String,
    /// The whole `data` object.
    pub data: Value,
}

/// Caller-visible failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    NoCredential,
    AuthExpired,
    Unauthorized,
    Forbidden,
    NetworkFailure,
    UpstreamHttpError,
    InvalidResponse,
}

/// Structured description of why a fetch did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Where to authorize when the failure is a missing or expired credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
}

impl DocumentFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
            authorization_url: None,
        }
    }

    pub fn with_authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = Some(url.into());
        self
    }
}

impl From<&UpstreamError> for DocumentFailure {
    fn from(e: &UpstreamError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
            status: e.status(),
            body: e.body().map(str::to_string),
            authorization_url: None,
        }
    }
}

/// Outcome of a document fetch, returned as the tool's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub success: bool,
    pub document_id: String,
    pub url: String,
    pub raw_content: Option<String>,
    /// Pretty-printed JSON of the upstream `data` object.
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DocumentFailure>,
}

impl DocumentResult {
    pub fn succeeded(request: &DocumentRequest, document: RawDocument) -> Self {
        let content = serde_json::to_string_pretty(&document.data).ok();
        Self {
            success: true,
            document_id: request.document_id.clone(),
            url: request.source_url.clone(),
            raw_content: Some(document.content),
            content,
            error: None,
        }
    }

    pub fn failed(request: &DocumentRequest, failure: DocumentFailure) -> Self {
        Self {
            success: false,
            document_id: request.document_id.clone(),
            url: request.source_url.clone(),
            raw_content: None,
            content: None,
            error: Some(failure),
        }
    }
}
