use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use super::document::Document;
use super::layout::LayoutAwareStrategy;
use super::native::NativeTextStrategy;
use super::ocr::OcrStrategy;
use super::sanitize::{sanitize_extracted_text, stripped_char_count};
use super::types::{Attempt, ExtractionMethod, ExtractionOutcome, ExtractionStrategy};
use super::ExtractionError;
use crate::config::ExtractionConfig;

struct Tier {
    strategy: Box<dyn ExtractionStrategy>,
    available: bool,
}

/// Runs extraction tiers in priority order and returns the first output that
/// clears the quality gate.
///
/// Tiers run strictly one after another. Availability is probed once here,
/// so an absent OCR provider shows up as `ocr_unavailable` on every document
/// without being retried.
pub struct ExtractionPipeline {
    tiers: Vec<Tier>,
    min_text_chars: usize,
}

impl ExtractionPipeline {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>, config: &ExtractionConfig) -> Self {
        let tiers = strategies
            .into_iter()
            .map(|strategy| {
                let available = strategy.is_available();
                if !available {
                    tracing::info!(method = %strategy.method(), "Extraction tier unavailable");
                }
                Tier {
                    strategy,
                    available,
                }
            })
            .collect();

        Self {
            tiers,
            min_text_chars: config.min_text_chars,
        }
    }

    /// Text layer, then content-stream walk, then OCR when the deployment has it.
    pub fn with_defaults(config: &ExtractionConfig) -> Self {
        Self::new(
            vec![
                Box::new(NativeTextStrategy),
                Box::new(LayoutAwareStrategy),
                Box::new(OcrStrategy::detect(config)),
            ],
            config,
        )
    }

    /// Tier order as configured.
    pub fn methods(&self) -> Vec<ExtractionMethod> {
        self.tiers.iter().map(|t| t.strategy.method()).collect()
    }

    /// Tiers whose capability provider is missing in this deployment.
    pub fn unavailable_methods(&self) -> Vec<ExtractionMethod> {
        self.tiers
            .iter()
            .filter(|t| !t.available)
            .map(|t| t.strategy.method())
            .collect()
    }

    /// Extract text from the document at `path`.
    ///
    /// Document-quality problems never surface as errors: a missing path
    /// yields `NotFound`, an empty document or a cascade where no tier
    /// clears the gate yields `None`. Only a failed read of an existing
    /// file is returned as `Err`.
    pub fn extract(&self, path: &Path) -> Result<ExtractionOutcome, ExtractionError> {
        let document = match Document::open(path) {
            Ok(doc) => doc,
            Err(ExtractionError::NotFound(_)) => {
                tracing::warn!(path = %path.display(), "Document not found");
                return Ok(ExtractionOutcome::not_found());
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Document unreadable");
                return Err(e);
            }
        };

        if document.is_empty() {
            tracing::warn!(path = %path.display(), "Document has no pages, nothing to extract");
            return Ok(ExtractionOutcome::exhausted(vec![]));
        }

        Ok(self.extract_document(&document))
    }

    /// Run the cascade over an already loaded document.
    pub fn extract_document(&self, document: &Document) -> ExtractionOutcome {
        let mut attempted = Vec::with_capacity(self.tiers.len());

        for tier in &self.tiers {
            let method = tier.strategy.method();
            if !tier.available {
                attempted.push(Attempt::Unavailable(method));
                continue;
            }
            attempted.push(Attempt::Tried(method));

            let text = match run_tier(tier.strategy.as_ref(), document) {
                Ok(raw) => sanitize_extracted_text(&raw),
                Err(e) => {
                    tracing::warn!(
                        path = %document.path().display(),
                        method = %method,
                        error = %e,
                        "Extraction tier failed, moving on"
                    );
                    continue;
                }
            };

            let chars = stripped_char_count(&text);
            if chars >= self.min_text_chars {
                tracing::info!(
                    path = %document.path().display(),
                    method = %method,
                    chars,
                    attempts = attempted.len(),
                    "Extraction accepted"
                );
                return ExtractionOutcome {
                    text,
                    method,
                    attempted,
                };
            }

            tracing::debug!(
                method = %method,
                chars,
                threshold = self.min_text_chars,
                "Extraction below quality gate"
            );
        }

        tracing::warn!(
            path = %document.path().display(),
            attempts = attempted.len(),
            "All extraction tiers exhausted"
        );
        ExtractionOutcome::exhausted(attempted)
    }
}

/// Third-party parsers can panic on hostile input; a panic is one more
/// tier failure.
fn run_tier(
    strategy: &dyn ExtractionStrategy,
    document: &Document,
) -> Result<String, ExtractionError> {
    panic::catch_unwind(AssertUnwindSafe(|| strategy.extract(document)))
        .unwrap_or_else(|payload| Err(ExtractionError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One-shot extraction with the default three-tier cascade.
pub fn extract(path: &Path, config: &ExtractionConfig) -> Result<ExtractionOutcome, ExtractionError> {
    ExtractionPipeline::with_defaults(config).extract(path)
}
