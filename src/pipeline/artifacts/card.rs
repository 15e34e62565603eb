use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{AdversarialResults, BenchmarkScores, ParameterCounts};
use super::{validate_version, ArtifactError};

/// Manifest certifying one model version: provenance, benchmark scores,
/// content hashes and adversarial-suite counters.
///
/// Fields are private and there are no setters. Any change to a persisted
/// card would invalidate the hashes it vouches for, so a new card means a
/// new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    name: String,
    version: String,
    base_model: String,
    training_corpus_hash: String,
    training_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    training_commit: Option<String>,
    recall_at_5_baseline: f64,
    recall_at_5_finetuned: f64,
    mrr: f64,
    embedding_dimension: usize,
    total_parameters: u64,
    trainable_parameters: u64,
    weights_hash: String,
    #[serde(default)]
    config_hash: Option<String>,
    adversarial_tests_passed: u32,
    adversarial_tests_total: u32,
    #[serde(default)]
    notes: String,
}

/// Everything needed to mint a card.
#[derive(Debug, Clone)]
pub struct ModelCardParams {
    pub name: String,
    pub version: String,
    pub base_model: String,
    pub training_corpus_hash: String,
    pub training_date: DateTime<Utc>,
    pub training_commit: Option<String>,
    pub benchmarks: BenchmarkScores,
    pub embedding_dimension: usize,
    pub parameters: ParameterCounts,
    pub weights_hash: String,
    pub config_hash: Option<String>,
    pub adversarial: AdversarialResults,
    pub notes: String,
}

impl ModelCard {
    pub fn new(params: ModelCardParams) -> Result<Self, ArtifactError> {
        params.adversarial.validate()?;
        validate_version(&params.version)?;
        if params.weights_hash.is_empty() {
            return Err(ArtifactError::InvalidManifest("weights hash is empty".into()));
        }

        Ok(Self {
            name: params.name,
            version: params.version,
            base_model: params.base_model,
            training_corpus_hash: params.training_corpus_hash,
            training_date: params.training_date,
            training_commit: params.training_commit,
            recall_at_5_baseline: params.benchmarks.recall_at_5_baseline,
            recall_at_5_finetuned: params.benchmarks.recall_at_5_finetuned,
            mrr: params.benchmarks.mrr,
            embedding_dimension: params.embedding_dimension,
            total_parameters: params.parameters.total,
            trainable_parameters: params.parameters.trainable,
            weights_hash: params.weights_hash,
            config_hash: params.config_hash,
            adversarial_tests_passed: params.adversarial.passed,
            adversarial_tests_total: params.adversarial.total,
            notes: params.notes,
        })
    }

    /// Parse a manifest file, rejecting records no writer could have produced.
    pub fn read(path: &Path) -> Result<Self, ArtifactError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ArtifactError::ManifestMissing(
                path.parent().unwrap_or(path).to_path_buf(),
            ),
            _ => ArtifactError::Io(e),
        })?;

        let card: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ArtifactError::InvalidManifest(e.to_string()))?;

        if card.adversarial().validate().is_err() {
            return Err(ArtifactError::InvalidManifest(format!(
                "{} adversarial passes recorded for {} tests",
                card.adversarial_tests_passed, card.adversarial_tests_total
            )));
        }
        if card.weights_hash.is_empty() {
            return Err(ArtifactError::InvalidManifest("weights hash is empty".into()));
        }
        Ok(card)
    }

    pub fn to_json_pretty(&self) -> Result<String, ArtifactError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn base_model(&self) -> &str {
        &self.base_model
    }

    pub fn training_corpus_hash(&self) -> &str {
        &self.training_corpus_hash
    }

    pub fn training_date(&self) -> DateTime<Utc> {
        self.training_date
    }

    pub fn training_commit(&self) -> Option<&str> {
        self.training_commit.as_deref()
    }

    pub fn benchmarks(&self) -> BenchmarkScores {
        BenchmarkScores {
            recall_at_5_baseline: self.recall_at_5_baseline,
            recall_at_5_finetuned: self.recall_at_5_finetuned,
            mrr: self.mrr,
        }
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    pub fn parameters(&self) -> ParameterCounts {
        ParameterCounts {
            total: self.total_parameters,
            trainable: self.trainable_parameters,
        }
    }

    pub fn weights_hash(&self) -> &str {
        &self.weights_hash
    }

    pub fn config_hash(&self) -> Option<&str> {
        self.config_hash.as_deref()
    }

    pub fn adversarial(&self) -> AdversarialResults {
        AdversarialResults {
            passed: self.adversarial_tests_passed,
            total: self.adversarial_tests_total,
        }
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn improvement_pct(&self) -> f64 {
        improvement_pct(self)
    }

    pub fn is_safety_validated(&self) -> bool {
        is_safety_validated(self)
    }
}

/// Relative recall@5 gain recorded in the card, see
/// [`BenchmarkScores::improvement_pct`].
pub fn improvement_pct(card: &ModelCard) -> f64 {
    card.benchmarks().improvement_pct()
}

/// Every adversarial test passed.
pub fn is_safety_validated(card: &ModelCard) -> bool {
    card.adversarial_tests_passed == card.adversarial_tests_total
}
