use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::card::{ModelCard, ModelCardParams};
use super::types::{AdversarialResults, BenchmarkScores, TrainedModel};
use super::{validate_version, ArtifactError, CONFIG_FILE, MANIFEST_FILE, WEIGHTS_FILE};
use crate::pipeline::hash::hash_file;

const DEFAULT_MODEL_NAME: &str = "ragvault-embedder";

/// Persists trained models as new, immutable versions.
pub struct ArtifactWriter {
    models_root: PathBuf,
    name: String,
}

impl ArtifactWriter {
    pub fn new(models_root: impl Into<PathBuf>) -> Self {
        Self {
            models_root: models_root.into(),
            name: DEFAULT_MODEL_NAME.to_string(),
        }
    }

    /// Model name recorded in every manifest this writer produces.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    /// Write weights, config and manifest for `version`, returning its directory.
    ///
    /// The version directory is claimed with a non-recursive create, so two
    /// concurrent saves of one version cannot both succeed. The manifest is
    /// written last; a directory without one is never served. Any failure
    /// after the claim removes the partial directory.
    pub fn save(
        &self,
        model: &dyn TrainedModel,
        version: &str,
        training_corpus_hash: &str,
        scores: BenchmarkScores,
        adversarial: AdversarialResults,
        training_commit: Option<&str>,
    ) -> Result<PathBuf, ArtifactError> {
        validate_version(version)?;
        adversarial.validate()?;

        fs::create_dir_all(&self.models_root)?;
        let dir = self.models_root.join(version);
        fs::create_dir(&dir).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => ArtifactError::VersionExists(version.to_string()),
            _ => ArtifactError::Io(e),
        })?;

        let result = self.write_version(
            &dir,
            model,
            version,
            training_corpus_hash,
            scores,
            adversarial,
            training_commit,
        );

        match result {
            Ok(card) => {
                tracing::info!(
                    version,
                    path = %dir.display(),
                    weights_hash = %card.weights_hash(),
                    safety_validated = card.is_safety_validated(),
                    recall_improvement_pct = card.improvement_pct(),
                    "Saved model version"
                );
                Ok(dir)
            }
            Err(e) => {
                tracing::warn!(version, error = %e, "Save failed, removing partial version");
                if let Err(cleanup) = fs::remove_dir_all(&dir) {
                    tracing::warn!(path = %dir.display(), error = %cleanup, "Could not remove partial version");
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_version(
        &self,
        dir: &Path,
        model: &dyn TrainedModel,
        version: &str,
        training_corpus_hash: &str,
        scores: BenchmarkScores,
        adversarial: AdversarialResults,
        training_commit: Option<&str>,
    ) -> Result<ModelCard, ArtifactError> {
        let weights_path = dir.join(WEIGHTS_FILE);
        model.write_weights(&weights_path)?;

        let config_path = dir.join(CONFIG_FILE);
        let wrote_config = model.write_config(&config_path)?;

        let weights_hash = hash_file(&weights_path)?;
        let config_hash = if wrote_config {
            Some(hash_file(&config_path)?)
        } else {
            None
        };

        let card = ModelCard::new(ModelCardParams {
            name: self.name.clone(),
            version: version.to_string(),
            base_model: model.base_model().to_string(),
            training_corpus_hash: training_corpus_hash.to_string(),
            training_date: Utc::now(),
            training_commit: training_commit.map(str::to_string),
            benchmarks: scores,
            embedding_dimension: model.dimension(),
            parameters: model.parameter_counts(),
            weights_hash,
            config_hash,
            adversarial,
            notes: summary_notes(scores, adversarial),
        })?;

        write_manifest(dir, &card)?;
        Ok(card)
    }
}

/// Persist the manifest through a temp file so a reader never sees it half written.
fn write_manifest(dir: &Path, card: &ModelCard) -> Result<(), ArtifactError> {
    let json = card.to_json_pretty()?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(dir.join(MANIFEST_FILE))
        .map_err(|e| ArtifactError::Io(e.error))?;
    Ok(())
}

fn summary_notes(scores: BenchmarkScores, adversarial: AdversarialResults) -> String {
    format!(
        "recall@5 {:.3} -> {:.3} ({:+.1}%), MRR {:.3}, adversarial {}/{}",
        scores.recall_at_5_baseline,
        scores.recall_at_5_finetuned,
        scores.improvement_pct(),
        scores.mrr,
        adversarial.passed,
        adversarial.total
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::artifacts::embedder::StaticEmbedder;
    use crate::pipeline::artifacts::types::{EmbeddingModel, ParameterCounts};
    use crate::pipeline::artifacts::verifier::IntegrityVerifier;
    use crate::pipeline::artifacts::list_versions;
    use std::sync::Barrier;

    fn scores() -> BenchmarkScores {
        BenchmarkScores {
            recall_at_5_baseline: 0.5,
            recall_at_5_finetuned: 0.65,
            mrr: 0.61,
        }
    }

    fn model() -> StaticEmbedder {
        StaticEmbedder::seeded("all-MiniLM-L6-v2", 64, 8, 3).unwrap()
    }

    /// Model whose weights write fails after the directory was claimed.
    struct BrokenModel;

    impl EmbeddingModel for BrokenModel {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, ArtifactError> {
            Ok(vec![0.0; 4])
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    impl TrainedModel for BrokenModel {
        fn base_model(&self) -> &str {
            "broken"
        }

        fn parameter_counts(&self) -> ParameterCounts {
            ParameterCounts { total: 0, trainable: 0 }
        }

        fn write_weights(&self, path: &Path) -> Result<(), ArtifactError> {
            fs::write(path, b"partial")?;
            Err(ArtifactError::Model("disk full".into()))
        }

        fn write_config(&self, _path: &Path) -> Result<bool, ArtifactError> {
            Ok(false)
        }
    }

    #[test]
    fn save_writes_all_three_files() {
        let root = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(root.path());
        let dir = writer
            .save(&model(), "v1", "corpus", scores(), AdversarialResults::new(10, 10).unwrap(), Some("abc123"))
            .unwrap();

        assert_eq!(dir, root.path().join("v1"));
        assert!(dir.join(WEIGHTS_FILE).is_file());
        assert!(dir.join(CONFIG_FILE).is_file());
        assert!(dir.join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn saved_manifest_matches_model_and_verifies() {
        let root = tempfile::tempdir().unwrap();
        let dir = ArtifactWriter::new(root.path())
            .with_name("contracts-embedder")
            .save(&model(), "v2", "corpus", scores(), AdversarialResults::new(9, 10).unwrap(), None)
            .unwrap();

        let card = IntegrityVerifier::verify(&dir).unwrap();
        assert_eq!(card.name(), "contracts-embedder");
        assert_eq!(card.version(), "v2");
        assert_eq!(card.base_model(), "all-MiniLM-L6-v2");
        assert_eq!(card.embedding_dimension(), 8);
        assert_eq!(card.parameters().total, 64 * 8);
        assert_eq!(card.training_corpus_hash(), "corpus");
        assert!(card.training_commit().is_none());
        assert_eq!(card.weights_hash(), hash_file(&dir.join(WEIGHTS_FILE)).unwrap());
        assert!(card.config_hash().is_some());
        assert!(!card.is_safety_validated());
        assert!(card.notes().contains("+30.0%"));
    }

    #[test]
    fn existing_version_is_never_overwritten() {
        let root = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(root.path());
        let adv = AdversarialResults::new(10, 10).unwrap();
        writer.save(&model(), "v1", "corpus", scores(), adv, None).unwrap();
        let before = fs::read(root.path().join("v1").join(MANIFEST_FILE)).unwrap();

        let other = StaticEmbedder::seeded("all-MiniLM-L6-v2", 64, 8, 4).unwrap();
        let err = writer.save(&other, "v1", "corpus", scores(), adv, None).unwrap_err();
        assert!(matches!(err, ArtifactError::VersionExists(ref v) if v == "v1"));
        assert_eq!(fs::read(root.path().join("v1").join(MANIFEST_FILE)).unwrap(), before);
    }

    #[test]
    fn concurrent_saves_of_one_version_admit_one_winner() {
        let root = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(root.path());
        let barrier = Barrier::new(2);
        let adv = AdversarialResults::new(10, 10).unwrap();

        let results: Vec<Result<PathBuf, ArtifactError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2u64)
                .map(|seed| {
                    let writer = &writer;
                    let barrier = &barrier;
                    s.spawn(move || {
                        let m = StaticEmbedder::seeded("all-MiniLM-L6-v2", 64, 8, seed).unwrap();
                        barrier.wait();
                        writer.save(&m, "v1", "corpus", scores(), adv, None)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ArtifactError::VersionExists(_)))));
        assert!(IntegrityVerifier::verify(&root.path().join("v1")).is_ok());
    }

    #[test]
    fn impossible_adversarial_counts_write_nothing() {
        let root = tempfile::tempdir().unwrap();
        let adv = AdversarialResults { passed: 11, total: 10 };
        let err = ArtifactWriter::new(root.path())
            .save(&model(), "v1", "corpus", scores(), adv, None)
            .unwrap_err();

        assert!(matches!(err, ArtifactError::AdversarialCountsInvalid { .. }));
        assert!(!root.path().join("v1").exists());
    }

    #[test]
    fn invalid_version_name_rejected() {
        let root = tempfile::tempdir().unwrap();
        let err = ArtifactWriter::new(root.path())
            .save(&model(), "../escape", "corpus", scores(), AdversarialResults::new(1, 1).unwrap(), None)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidVersion(_)));
    }

    #[test]
    fn failed_write_leaves_no_partial_version() {
        let root = tempfile::tempdir().unwrap();
        let err = ArtifactWriter::new(root.path())
            .save(&BrokenModel, "v1", "corpus", scores(), AdversarialResults::new(1, 1).unwrap(), None)
            .unwrap_err();

        assert!(matches!(err, ArtifactError::Model(_)));
        assert!(!root.path().join("v1").exists());
        assert!(list_versions(root.path()).unwrap().is_empty());
    }

    #[test]
    fn manifest_is_last_file_written() {
        let root = tempfile::tempdir().unwrap();
        let dir = ArtifactWriter::new(root.path())
            .save(&model(), "v1", "corpus", scores(), AdversarialResults::new(1, 1).unwrap(), None)
            .unwrap();

        let modified = |name: &str| fs::metadata(dir.join(name)).unwrap().modified().unwrap();
        assert!(modified(MANIFEST_FILE) >= modified(WEIGHTS_FILE));
        assert!(modified(MANIFEST_FILE) >= modified(CONFIG_FILE));
    }

    #[test]
    fn zero_baseline_notes_report_no_improvement() {
        let notes = summary_notes(
            BenchmarkScores {
                recall_at_5_baseline: 0.0,
                recall_at_5_finetuned: 0.8,
                mrr: 0.5,
            },
            AdversarialResults::new(0, 0).unwrap(),
        );
        assert!(notes.contains("+0.0%"));
        assert!(notes.contains("adversarial 0/0"));
    }

    #[test]
    fn notes_agree_with_card_improvement() {
        let root = tempfile::tempdir().unwrap();
        let scores = BenchmarkScores {
            recall_at_5_baseline: 0.4,
            recall_at_5_finetuned: 0.5,
            mrr: 0.45,
        };
        let dir = ArtifactWriter::new(root.path())
            .save(&model(), "v1", "corpus", scores, AdversarialResults::new(2, 2).unwrap(), None)
            .unwrap();

        let card = IntegrityVerifier::verify(&dir).unwrap();
        let expected = format!("({:+.1}%)", card.improvement_pct());
        assert!(card.notes().contains(&expected), "notes: {}", card.notes());
    }
}
