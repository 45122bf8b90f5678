//! Lark document access.
//!
//! Resolves a document URL to its identifier and fetches the document's
//! raw text from the docx content API. Failures are typed so callers can
//! tell an expired token from a missing document or a network fault.

pub mod client;
pub mod error;
pub mod resolver;
pub mod types;

pub use client::{DEFAULT_API_DOMAIN, DocumentSource, LarkDocumentClient, MAX_ERROR_BODY};
pub use error::{DocumentError, Result, UpstreamError};
pub use resolver::resolve_document_id;
pub use types::{DocumentFailure, DocumentRequest, DocumentResult, FailureKind, RawDocument};
