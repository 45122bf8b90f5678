//! Document identifier resolution.

use url::Url;

use crate::error::{DocumentError, Result};

/// Extract the document identifier from a Lark document URL.
///
/// The identifier is the last non-empty path segment, percent-decoded and
/// trimmed. Query strings and fragments are ignored. Only absolute
/// `http`/`https` URLs are accepted and the identifier may contain only
/// ASCII alphanumerics, `_` and `-`.
///
/// ```
/// use larkdocs_document::resolve_document_id;
///
/// let id = resolve_document_id("https://example.larksuite.com/wiki/ABC123?from=space").unwrap();
/// assert_eq!(id, "ABC123");
/// ```
pub fn resolve_document_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let invalid = |reason: &str| DocumentError::InvalidUrl {
        url: trimmed.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(trimmed).map_err(|_| invalid("not an absolute URL"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }

    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .ok_or_else(|| invalid("URL has no path segment"))?;

    let decoded = urlencoding::decode(segment).map_err(|_| invalid("segment is not valid UTF-8"))?;
    let id = decoded.trim();

    if id.is_empty() {
        return Err(invalid("document identifier is empty"));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("document identifier contains unsupported characters"));
    }

    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wiki_url() {
        assert_eq!(
            resolve_document_id("https://example.larksuite.com/wiki/ABC123").unwrap(),
            "ABC123"
        );
    }

    #[test]
    fn test_query_fragment_and_trailing_slash() {
        let id = resolve_document_id(
            "  https://team.sg.larksuite.com/docx/JPfzwwtrui160NkKzCploKsog0f/?fromScene=spaceOverview#part  ",
        )
        .unwrap();
        assert_eq!(id, "JPfzwwtrui160NkKzCploKsog0f");
    }

    #[test]
    fn test_percent_encoded_segment() {
        assert_eq!(
            resolve_document_id("https://example.larksuite.com/docx/doc%5Fid-9").unwrap(),
            "doc_id-9"
        );
    }

    #[test]
    fn test_idempotent_on_same_input() {
        let url = "https://example.larksuite.com/wiki/ABC123";
        assert_eq!(
            resolve_document_id(url).unwrap(),
            resolve_document_id(url).unwrap()
        );
    }

    #[test]
    fn test_rejects_non_urls() {
        for input in ["not-a-url", "", "   ", "/wiki/ABC123", "example.com/wiki/ABC"] {
            assert!(
                matches!(
                    resolve_document_id(input),
                    Err(DocumentError::InvalidUrl { .. })
                ),
                "expected InvalidUrl for {input:?}"
            );
        }
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(resolve_document_id("ftp://example.com/wiki/ABC123").is_err());
        assert!(resolve_document_id("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_rejects_empty_path() {
        assert!(resolve_document_id("https://example.larksuite.com").is_err());
        assert!(resolve_document_id("https://example.larksuite.com///").is_err());
    }

    #[test]
    fn test_rejects_bad_charset() {
        assert!(resolve_document_id("https://example.larksuite.com/wiki/ABC.123").is_err());
        assert!(resolve_document_id("https://example.larksuite.com/wiki/%20%20").is_err());
        assert!(resolve_document_id("https://example.larksuite.com/wiki/a%2Fb").is_err());
    }
}
