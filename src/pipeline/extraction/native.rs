use super::document::Document;
use super::types::{ExtractionMethod, ExtractionStrategy};
use super::ExtractionError;

/// Reads the embedded text layer of a digital PDF with pdf-extract.
///
/// Fastest tier; only works when the document carries real text objects.
pub struct NativeTextStrategy;

impl ExtractionStrategy for NativeTextStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::NativeText
    }

    fn extract(&self, document: &Document) -> Result<String, ExtractionError> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(document.bytes())
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        tracing::debug!(
            path = %document.path().display(),
            pages = pages.len(),
            "Read native text layer"
        );

        Ok(pages.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::document::fixtures::make_test_pdf;

    #[test]
    fn extracts_text_from_digital_pdf() {
        let doc = Document::from_bytes("hello.pdf", make_test_pdf(&["Hello World from Ragvault"]));
        let text = NativeTextStrategy.extract(&doc).unwrap();
        assert!(
            text.contains("Hello") || text.contains("World"),
            "Expected text to contain 'Hello' or 'World', got: {text}"
        );
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let doc = Document::from_bytes("junk.pdf", b"not a pdf".to_vec());
        let result = NativeTextStrategy.extract(&doc);
        assert!(matches!(result, Err(ExtractionError::PdfParsing(_))));
    }

    #[test]
    fn reports_native_method() {
        assert_eq!(NativeTextStrategy.method(), ExtractionMethod::NativeText);
        assert!(NativeTextStrategy.is_available());
    }
}
