//! PDF text extraction

use super::ParsedOutput;
use crate::error::{Error, Result};
use lopdf::Document;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Extract page count and text from raw PDF bytes
///
/// Failures are returned as a failed [`ParsedOutput`] so that one bad file
/// never aborts a batch. A panic inside the PDF parser is caught and
/// recorded the same way.
pub fn parse_pdf(bytes: &[u8]) -> ParsedOutput {
    parse_with(bytes, extract_pdf_text)
}

fn parse_with<F>(bytes: &[u8], extract: F) -> ParsedOutput
where
    F: Fn(&[u8]) -> Result<(i64, String)>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| extract(bytes))) {
        Ok(Ok((pages, text))) => ParsedOutput::success(pages, text),
        Ok(Err(Error::Parse(message))) => ParsedOutput::failure(message),
        Ok(Err(e)) => ParsedOutput::failure(e),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("PDF parser panicked: {}", message);
            ParsedOutput::failure(format!("PDF parser panicked: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Page count and concatenated page text, each page followed by a blank line
pub fn extract_pdf_text(bytes: &[u8]) -> Result<(i64, String)> {
    let doc = Document::load_mem(bytes).map_err(|e| Error::Parse(e.to_string()))?;

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(Error::Parse("PDF contains no pages".to_string()));
    }

    let mut text = String::new();
    for page_number in pages.keys() {
        let page_text = doc
            .extract_text(&[*page_number])
            .map_err(|e| Error::Parse(format!("page {}: {}", page_number, e)))?;
        text.push_str(&page_text);
        text.push_str("\n\n");
    }

    debug!(pages = pages.len(), chars = text.len(), "Extracted PDF text");
    Ok((pages.len() as i64, text))
}


#[cfg(test)]
mod tests {
    use super::test_support::build_pdf;
    use super::*;

    #[test]
    fn test_parse_multi_page_pdf() {
        let pages: Vec<String> = (1..=3).map(|i| format!("Page number {}", i)).collect();
        let output = parse_pdf(&build_pdf(&pages));

        assert!(output.is_success(), "status: {}", output.status());
        assert_eq!(output.page_count(), Some(3));
        let text = output.text().unwrap();
        assert!(text.contains("Page number 1"));
        assert!(text.contains("Page number 3"));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_parse_garbage_is_captured_as_failure() {
        let output = parse_pdf(b"this is not a pdf");
        assert!(!output.is_success());
        assert!(output.status().starts_with("ERROR: "));
        assert_eq!(output.text(), None);
        assert_eq!(output.page_count(), None);
    }

    #[test]
    fn test_parser_panic_becomes_failure_row() {
        let output = parse_with(b"%PDF-1.7", |_| panic!("xref offset out of range"));

        assert!(!output.is_success());
        assert_eq!(
            output.status(),
            "ERROR: PDF parser panicked: xref offset out of range"
        );
        assert_eq!(output.text(), None);
    }

    #[test]
    fn test_parse_zero_page_pdf_fails() {
        let output = parse_pdf(&build_pdf(&[]));
        assert!(!output.is_success());
        assert!(output.status().starts_with("ERROR: "));
    }
}
