use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use super::document::Document;
use super::ExtractionError;

/// Which tier produced the returned text.
///
/// `None` means every tier ran (or was skipped) without clearing the quality
/// gate; `NotFound` means the document was never read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    NativeText,
    LayoutAware,
    Ocr,
    None,
    NotFound,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeText => "native_text",
            Self::LayoutAware => "layout_aware",
            Self::Ocr => "ocr",
            Self::None => "none",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the diagnostic trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The tier ran, whatever it produced.
    Tried(ExtractionMethod),
    /// The tier's capability provider is absent in this deployment.
    Unavailable(ExtractionMethod),
}

impl Attempt {
    pub fn method(&self) -> ExtractionMethod {
        match self {
            Self::Tried(m) | Self::Unavailable(m) => *m,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tried(m) => f.write_str(m.as_str()),
            Self::Unavailable(m) => write!(f, "{}_unavailable", m.as_str()),
        }
    }
}

impl Serialize for Attempt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of running the cascade over one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionOutcome {
    pub text: String,
    pub method: ExtractionMethod,
    pub attempted: Vec<Attempt>,
}

impl ExtractionOutcome {
    pub fn not_found() -> Self {
        Self {
            text: String::new(),
            method: ExtractionMethod::NotFound,
            attempted: vec![],
        }
    }

    pub fn exhausted(attempted: Vec<Attempt>) -> Self {
        Self {
            text: String::new(),
            method: ExtractionMethod::None,
            attempted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Trail rendered as tags, e.g. `["native_text", "layout_aware", "ocr_unavailable"]`.
    pub fn attempted_tags(&self) -> Vec<String> {
        self.attempted.iter().map(ToString::to_string).collect()
    }
}

/// One tier of the cascade.
pub trait ExtractionStrategy: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    /// Probed once when the pipeline is built, never per document.
    fn is_available(&self) -> bool {
        true
    }

    fn extract(&self, document: &Document) -> Result<String, ExtractionError>;
}

/// Raw OCR result from the engine
#[derive(Debug)]
pub struct OcrPageResult {
    pub text: String,
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// Renders PDF pages to images for OCR.
pub trait PdfPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// `page_number` is 0-based.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}
