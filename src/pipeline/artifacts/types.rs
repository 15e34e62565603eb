use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ArtifactError;

/// Embedding model abstraction
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ArtifactError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ArtifactError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize;
}

/// Allow `Box<dyn EmbeddingModel>` to be used as `&impl EmbeddingModel`.
impl EmbeddingModel for Box<dyn EmbeddingModel> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ArtifactError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ArtifactError> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// A model fresh out of fine-tuning that can persist itself.
pub trait TrainedModel: EmbeddingModel {
    /// Identifier of the model this one was fine-tuned from.
    fn base_model(&self) -> &str;

    fn parameter_counts(&self) -> ParameterCounts;

    fn write_weights(&self, path: &Path) -> Result<(), ArtifactError>;

    /// Returns `false` when the model has no config to persist.
    fn write_config(&self, path: &Path) -> Result<bool, ArtifactError>;
}

/// Turns a model directory into a usable model.
pub trait ModelLoader: Send + Sync {
    fn load(&self, dir: &Path) -> Result<Box<dyn EmbeddingModel>, ArtifactError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterCounts {
    pub total: u64,
    pub trainable: u64,
}

/// Retrieval benchmark results measured after fine-tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkScores {
    pub recall_at_5_baseline: f64,
    pub recall_at_5_finetuned: f64,
    pub mrr: f64,
}

impl BenchmarkScores {
    /// Relative recall@5 gain of the fine-tuned model over its baseline, in
    /// percent. Zero when the baseline recall is zero.
    pub fn improvement_pct(&self) -> f64 {
        if self.recall_at_5_baseline == 0.0 {
            return 0.0;
        }
        (self.recall_at_5_finetuned - self.recall_at_5_baseline) / self.recall_at_5_baseline
            * 100.0
    }
}

/// Outcome of the adversarial retrieval suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdversarialResults {
    pub passed: u32,
    pub total: u32,
}

impl AdversarialResults {
    pub fn new(passed: u32, total: u32) -> Result<Self, ArtifactError> {
        let results = Self { passed, total };
        results.validate()?;
        Ok(results)
    }

    /// More passes than tests is never a valid record.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.passed > self.total {
            return Err(ArtifactError::AdversarialCountsInvalid {
                passed: self.passed,
                total: self.total,
            });
        }
        Ok(())
    }
}

/// Summary of what a resolver ended up serving.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub has_manifest: bool,
    pub safety_validated: Option<bool>,
    pub recall_improvement_pct: Option<f64>,
    /// Why the requested version was not served, when the baseline was used
    /// in its place.
    pub fallback_reason: Option<String>,
}
