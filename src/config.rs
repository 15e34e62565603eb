use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Ragvault";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the versioned models root when set.
pub const MODELS_DIR_ENV: &str = "RAGVAULT_MODELS_DIR";

/// Reference model used whenever a requested version cannot be loaded.
pub const DEFAULT_BASELINE_MODEL: &str = "all-MiniLM-L6-v2";

/// Minimum trimmed character count an extraction tier must produce to be accepted.
pub const DEFAULT_MIN_TEXT_CHARS: usize = 100;

/// Page rendering resolution handed to the OCR tier.
pub const DEFAULT_OCR_DPI: u32 = 200;

/// Get the application data directory
/// ~/Ragvault/ on all platforms, falling back to the working directory when
/// no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the root under which each model version gets its own directory.
pub fn models_dir() -> PathBuf {
    match std::env::var_os(MODELS_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => app_data_dir().join("models"),
    }
}

/// Get the directory holding the non-versioned baseline model.
pub fn baseline_model_dir() -> PathBuf {
    app_data_dir().join("baseline").join(DEFAULT_BASELINE_MODEL)
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "ragvault=info,warn"
}

/// Tunables for the extraction cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Quality gate: trimmed character count a tier must reach.
    pub min_text_chars: usize,
    /// Rendering DPI for pages sent to OCR.
    pub ocr_dpi: u32,
    /// Tesseract language string, e.g. "eng" or "eng+fra".
    pub ocr_languages: String,
    /// Explicit tessdata location; `TESSDATA_PREFIX` and system paths otherwise.
    pub tessdata_dir: Option<PathBuf>,
    /// Pages beyond this index are never rendered for OCR.
    pub max_ocr_pages: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            ocr_dpi: DEFAULT_OCR_DPI,
            ocr_languages: "eng".into(),
            tessdata_dir: None,
            max_ocr_pages: 50,
        }
    }
}

/// Where versioned artifacts live and which baseline to fall back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub models_root: PathBuf,
    pub baseline_name: String,
    pub baseline_dir: PathBuf,
}

impl ResolverConfig {
    pub fn new(
        models_root: impl Into<PathBuf>,
        baseline_name: impl Into<String>,
        baseline_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            models_root: models_root.into(),
            baseline_name: baseline_name.into(),
            baseline_dir: baseline_dir.into(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new(models_dir(), DEFAULT_BASELINE_MODEL, baseline_model_dir())
    }
}
