use super::document::Document;
use super::types::{ExtractionMethod, ExtractionStrategy};
use super::ExtractionError;

/// How far into the file a displaced `%PDF-` header is searched for.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Walks each page's content streams with lopdf.
///
/// Slower than the text-layer tier and more tolerant of broken structure:
/// bytes prepended before the `%PDF-` header are skipped, and a page whose
/// content cannot be decoded is dropped instead of failing the document.
/// A file whose object structure lopdf cannot parse at all still fails here
/// and is left to OCR.
pub struct LayoutAwareStrategy;

impl ExtractionStrategy for LayoutAwareStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::LayoutAware
    }

    fn extract(&self, document: &Document) -> Result<String, ExtractionError> {
        let pdf = load_lenient(document.bytes())?;
        if pdf.is_encrypted() {
            return Err(ExtractionError::PdfEncrypted);
        }

        let page_numbers: Vec<u32> = pdf.get_pages().keys().copied().collect();
        let mut pages = Vec::with_capacity(page_numbers.len());
        let mut skipped = 0usize;

        for page in &page_numbers {
            match pdf.extract_text(&[*page]) {
                Ok(text) => pages.push(reflow(&text)),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(page, error = %e, "Skipping undecodable page");
                }
            }
        }

        if pages.is_empty() && !page_numbers.is_empty() {
            return Err(ExtractionError::PdfParsing(format!(
                "none of {} pages could be decoded",
                page_numbers.len()
            )));
        }

        tracing::debug!(
            path = %document.path().display(),
            pages = pages.len(),
            skipped,
            "Walked page content streams"
        );

        Ok(pages.join("\n"))
    }
}

fn load_lenient(bytes: &[u8]) -> Result<lopdf::Document, ExtractionError> {
    let first_error = match lopdf::Document::load_mem(bytes) {
        Ok(pdf) => return Ok(pdf),
        Err(e) => ExtractionError::PdfParsing(e.to_string()),
    };

    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    let Some(offset) = window.windows(5).position(|w| w == b"%PDF-").filter(|&o| o > 0) else {
        return Err(first_error);
    };

    tracing::debug!(offset, "Retrying parse from displaced PDF header");
    lopdf::Document::load_mem(&bytes[offset..]).map_err(|_| first_error)
}

/// Collapse runs of spaces inside each line and drop trailing whitespace,
/// keeping the line structure of the page.
fn reflow(page_text: &str) -> String {
    page_text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
