//! Document parsing and text extraction
//!
//! This module handles:
//! - PDF text extraction, page by page
//! - Capturing each document's outcome as data rather than as an error

mod pdf;

pub use pdf::*;

#[cfg(test)]
pub(crate) use pdf::test_support;

use serde::{Deserialize, Serialize};

/// Status recorded for a successfully parsed document
pub const PARSE_SUCCESS: &str = "SUCCESS";

/// Outcome of extracting one document
///
/// `page_count` and `text` are present exactly when `status` is
/// [`PARSE_SUCCESS`]; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOutput {
    page_count: Option<i64>,
    text: Option<String>,
    status: String,
}

impl ParsedOutput {
    pub fn success(page_count: i64, text: String) -> Self {
        Self {
            page_count: Some(page_count),
            text: Some(text),
            status: PARSE_SUCCESS.to_string(),
        }
    }

    pub fn failure(message: impl std::fmt::Display) -> Self {
        Self {
            page_count: None,
            text: None,
            status: format!("ERROR: {}", message),
        }
    }

    /// Rebuild an output from stored columns, repairing rows that break the invariant
    pub fn from_parts(page_count: Option<i64>, text: Option<String>, status: String) -> Self {
        match (page_count, text) {
            (Some(pages), Some(text)) if status == PARSE_SUCCESS => Self::success(pages, text),
            _ if status == PARSE_SUCCESS => {
                Self::failure("stored row marked SUCCESS without page count or text")
            }
            _ => Self {
                page_count: None,
                text: None,
                status,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PARSE_SUCCESS
    }

    pub fn page_count(&self) -> Option<i64> {
        self.page_count
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_carries_text_and_pages() {
        let output = ParsedOutput::success(3, "hello".to_string());
        assert!(output.is_success());
        assert_eq!(output.page_count(), Some(3));
        assert_eq!(output.text(), Some("hello"));
        assert_eq!(output.status(), "SUCCESS");
    }

    #[test]
    fn test_failure_embeds_message() {
        let output = ParsedOutput::failure("invalid file header");
        assert!(!output.is_success());
        assert_eq!(output.page_count(), None);
        assert_eq!(output.text(), None);
        assert_eq!(output.status(), "ERROR: invalid file header");
    }

    #[test]
    fn test_from_parts_enforces_invariant() {
        let ok = ParsedOutput::from_parts(Some(1), Some("t".into()), "SUCCESS".into());
        assert!(ok.is_success());

        let broken = ParsedOutput::from_parts(None, Some("t".into()), "SUCCESS".into());
        assert!(!broken.is_success());
        assert_eq!(broken.text(), None);

        let failed = ParsedOutput::from_parts(Some(2), Some("t".into()), "ERROR: x".into());
        assert_eq!(failed.page_count(), None);
        assert_eq!(failed.status(), "ERROR: x");
    }
}
