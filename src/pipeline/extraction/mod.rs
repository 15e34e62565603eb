pub mod types;
pub mod document;
pub mod sanitize;
pub mod native;
pub mod layout;
pub mod ocr;
pub mod pdfium;
pub mod orchestrator;

pub use types::*;
pub use document::*;
pub use sanitize::*;
pub use native::*;
pub use layout::*;
pub use ocr::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single extraction tier or of reading the document itself.
///
/// Tier failures are absorbed by the cascade; only `Io` on the document read
/// ever reaches a caller of [`ExtractionPipeline::extract`].
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document not found: {0}")]
    NotFound(PathBuf),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("PDF page {page} rendering failed: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Tessdata not found at: {0}")]
    TessdataNotFound(PathBuf),

    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("Extraction tier panicked: {0}")]
    Panicked(String),
}
