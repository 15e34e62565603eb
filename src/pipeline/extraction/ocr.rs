use std::path::{Path, PathBuf};

use super::document::Document;
use super::pdfium::PdfiumRenderer;
use super::types::{ExtractionMethod, ExtractionStrategy, OcrEngine, OcrPageResult, PdfPageRenderer};
use super::ExtractionError;
use crate::config::ExtractionConfig;

/// Tessdata locations probed when neither the config nor `TESSDATA_PREFIX` names one.
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Bundled Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: PathBuf,
    languages: String,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Initialize with a tessdata directory holding at least the first
    /// requested language's traineddata.
    pub fn new(tessdata_dir: &Path, languages: &str) -> Result<Self, ExtractionError> {
        let primary = languages.split('+').next().unwrap_or("eng");
        if !tessdata_dir.join(format!("{primary}.traineddata")).exists() {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
            languages: languages.to_string(),
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let tessdata = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata), Some(&self.languages))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;
        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        Ok(OcrPageResult { text, confidence })
    }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

/// Mock renderer reporting a fixed page count and emitting placeholder images.
pub struct MockPdfPageRenderer {
    page_count: usize,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        if page_number >= self.page_count {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: "out of range".into(),
            });
        }
        Ok(format!("page-{page_number}").into_bytes())
    }
}

struct OcrBackend {
    engine: Box<dyn OcrEngine + Send + Sync>,
    renderer: Box<dyn PdfPageRenderer + Send + Sync>,
}

/// Renders every page and runs OCR on it. Slowest tier, the only one that
/// reads scanned documents.
pub struct OcrStrategy {
    backend: Option<OcrBackend>,
    unavailable_reason: Option<String>,
    dpi: u32,
    max_pages: usize,
}

impl OcrStrategy {
    pub fn new(
        engine: Box<dyn OcrEngine + Send + Sync>,
        renderer: Box<dyn PdfPageRenderer + Send + Sync>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            backend: Some(OcrBackend { engine, renderer }),
            unavailable_reason: None,
            dpi: config.ocr_dpi,
            max_pages: config.max_ocr_pages,
        }
    }

    /// A tier that is recorded as unavailable and never invoked.
    pub fn unavailable(reason: impl Into<String>, config: &ExtractionConfig) -> Self {
        Self {
            backend: None,
            unavailable_reason: Some(reason.into()),
            dpi: config.ocr_dpi,
            max_pages: config.max_ocr_pages,
        }
    }

    /// Probe the deployment for an OCR engine and a page renderer.
    pub fn detect(config: &ExtractionConfig) -> Self {
        let backend = default_ocr_engine(config)
            .and_then(|engine| PdfiumRenderer::new().map(|renderer| (engine, renderer)));

        match backend {
            Ok((engine, renderer)) => {
                tracing::info!(dpi = config.ocr_dpi, "OCR tier available");
                Self::new(engine, Box::new(renderer), config)
            }
            Err(e) => {
                tracing::info!(reason = %e, "OCR tier unavailable, it will be skipped");
                Self::unavailable(e.to_string(), config)
            }
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }
}

impl ExtractionStrategy for OcrStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn extract(&self, document: &Document) -> Result<String, ExtractionError> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            ExtractionError::Unavailable(self.unavailable_reason.clone().unwrap_or_default())
        })?;
        let bytes = document.bytes();

        let total = backend.renderer.page_count(bytes)?;
        let pages = total.min(self.max_pages);
        if total > pages {
            tracing::warn!(total, limit = self.max_pages, "OCR limited to leading pages");
        }

        let mut texts = Vec::with_capacity(pages);
        let mut last_error = None;
        for page in 0..pages {
            let result = backend
                .renderer
                .render_page(bytes, page, self.dpi)
                .and_then(|image| backend.engine.ocr_image(&image));
            match result {
                Ok(ocr) => {
                    tracing::debug!(page, confidence = ocr.confidence, "OCR page done");
                    texts.push(ocr.text);
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "OCR failed on page");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if texts.is_empty() => Err(e),
            _ => Ok(texts.join("\n")),
        }
    }
}

/// Locate a tessdata directory: config, then `TESSDATA_PREFIX`, then system paths.
pub fn find_tessdata_dir(config: &ExtractionConfig) -> Option<PathBuf> {
    if let Some(dir) = &config.tessdata_dir {
        return Some(dir.clone());
    }
    if let Some(prefix) = std::env::var_os("TESSDATA_PREFIX") {
        return Some(PathBuf::from(prefix));
    }
    SYSTEM_TESSDATA_DIRS
        .iter()
        .map(Path::new)
        .find(|dir| dir.join("eng.traineddata").exists())
        .map(Path::to_path_buf)
}

#[cfg(feature = "ocr")]
fn default_ocr_engine(
    config: &ExtractionConfig,
) -> Result<Box<dyn OcrEngine + Send + Sync>, ExtractionError> {
    let dir = find_tessdata_dir(config)
        .ok_or_else(|| ExtractionError::Unavailable("no tessdata directory found".into()))?;
    Ok(Box::new(BundledTesseract::new(&dir, &config.ocr_languages)?))
}

#[cfg(not(feature = "ocr"))]
fn default_ocr_engine(
    _config: &ExtractionConfig,
) -> Result<Box<dyn OcrEngine + Send + Sync>, ExtractionError> {
    Err(ExtractionError::Unavailable(
        "built without the `ocr` feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Engine that fails on every call.
    struct FailingOcrEngine;

    impl OcrEngine for FailingOcrEngine {
        fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
            Err(ExtractionError::OcrProcessing("engine crashed".into()))
        }
    }

    fn scanned_doc() -> Document {
        Document::from_bytes("scan.pdf", b"%PDF-1.4 scanned".to_vec())
    }

    #[test]
    fn ocrs_each_page() {
        let strategy = OcrStrategy::new(
            Box::new(MockOcrEngine::new("Scanned line", 0.9)),
            Box::new(MockPdfPageRenderer::new(3)),
            &ExtractionConfig::default(),
        );
        let text = strategy.extract(&scanned_doc()).unwrap();
        assert_eq!(text, "Scanned line\nScanned line\nScanned line");
    }

    #[test]
    fn page_limit_caps_rendering() {
        let config = ExtractionConfig {
            max_ocr_pages: 2,
            ..Default::default()
        };
        let strategy = OcrStrategy::new(
            Box::new(MockOcrEngine::new("x", 0.9)),
            Box::new(MockPdfPageRenderer::new(10)),
            &config,
        );
        assert_eq!(strategy.extract(&scanned_doc()).unwrap(), "x\nx");
    }

    #[test]
    fn every_page_failing_is_an_error() {
        let strategy = OcrStrategy::new(
            Box::new(FailingOcrEngine),
            Box::new(MockPdfPageRenderer::new(2)),
            &ExtractionConfig::default(),
        );
        assert!(matches!(
            strategy.extract(&scanned_doc()),
            Err(ExtractionError::OcrProcessing(_))
        ));
    }

    #[test]
    fn unavailable_strategy_reports_reason() {
        let strategy = OcrStrategy::unavailable("no tesseract", &ExtractionConfig::default());
        assert!(!strategy.is_available());
        assert_eq!(strategy.unavailable_reason(), Some("no tesseract"));
        assert!(matches!(
            strategy.extract(&scanned_doc()),
            Err(ExtractionError::Unavailable(_))
        ));
    }

    #[cfg(not(feature = "ocr"))]
    #[test]
    fn detect_without_ocr_feature_is_unavailable() {
        let strategy = OcrStrategy::detect(&ExtractionConfig::default());
        assert!(!strategy.is_available());
        assert!(strategy.unavailable_reason().unwrap().contains("ocr"));
    }

    #[test]
    fn configured_tessdata_dir_wins() {
        let config = ExtractionConfig {
            tessdata_dir: Some(PathBuf::from("/custom/tessdata")),
            ..Default::default()
        };
        assert_eq!(find_tessdata_dir(&config), Some(PathBuf::from("/custom/tessdata")));
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn bundled_tesseract_rejects_missing_tessdata() {
        let dir = tempfile::tempdir().unwrap();
        let result = BundledTesseract::new(dir.path(), "eng");
        assert!(matches!(result, Err(ExtractionError::TessdataNotFound(_))));
    }
}
