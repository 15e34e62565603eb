//! Versioned, integrity-verified store for fine-tuned embedding models.
//!
//! One directory per version under a models root:
//!
//! ```text
//! <models_root>/<version>/
//!     model.bin        weights
//!     config.json      model config (optional)
//!     model_card.json  manifest, written last
//! ```

pub mod types;
pub mod card;
pub mod embedder;
pub mod verifier;
pub mod resolver;
pub mod writer;

pub use types::*;
pub use card::*;
pub use embedder::*;
pub use verifier::*;
pub use resolver::*;
pub use writer::*;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::pipeline::hash::HashError;

pub const WEIGHTS_FILE: &str = "model.bin";
pub const CONFIG_FILE: &str = "config.json";
pub const MANIFEST_FILE: &str = "model_card.json";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hashing failed: {0}")]
    Hash(#[from] HashError),

    #[error("Manifest serialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model version not found: {0}")]
    VersionNotFound(String),

    #[error("Model version already exists: {0}")]
    VersionExists(String),

    #[error("Invalid version name: {0:?}")]
    InvalidVersion(String),

    #[error("Manifest missing in {0}")]
    ManifestMissing(PathBuf),

    #[error("Weights file missing in {0}")]
    WeightsMissing(PathBuf),

    #[error("Config file missing in {0} but the manifest records its hash")]
    ConfigMissing(PathBuf),

    #[error("Integrity mismatch for {file}: manifest records {expected}, file hashes to {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Adversarial counts invalid: {passed} passed of {total}")]
    AdversarialCountsInvalid { passed: u32, total: u32 },

    #[error("Model error: {0}")]
    Model(String),

    #[error("No model loaded")]
    NotLoaded,
}

impl ArtifactError {
    /// True for failures that point at corruption or tampering rather than
    /// absence.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::IntegrityMismatch { .. } | Self::ConfigMissing(_) | Self::InvalidManifest(_)
        )
    }

    /// True when the disk itself could not be read. These are never
    /// answered with a substitute model.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Hash(_))
    }
}

/// A version must be a single, ordinary path component.
pub fn validate_version(version: &str) -> Result<(), ArtifactError> {
    let well_formed = !version.is_empty()
        && version != "."
        && version != ".."
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if well_formed {
        Ok(())
    } else {
        Err(ArtifactError::InvalidVersion(version.to_string()))
    }
}

/// Versions under `models_root` that carry a manifest, sorted by name.
/// A root that does not exist yet holds no versions.
pub fn list_versions(models_root: &Path) -> Result<Vec<String>, ArtifactError> {
    let entries = match std::fs::read_dir(models_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };

    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || !entry.path().join(MANIFEST_FILE).is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            versions.push(name.to_string());
        }
    }
    versions.sort();
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_versions() {
        for v in ["v1", "2024-06-01", "v1.2.3", "finetune_03"] {
            assert!(validate_version(v).is_ok(), "{v} should be valid");
        }
    }

    #[test]
    fn rejects_path_like_versions() {
        for v in ["", ".", "..", "../v1", "a/b", "v1\\x", "v 1"] {
            assert!(
                matches!(validate_version(v), Err(ArtifactError::InvalidVersion(_))),
                "{v:?} should be rejected"
            );
        }
    }

    #[test]
    fn list_versions_of_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_versions(&dir.path().join("models")).unwrap().is_empty());
    }

    #[test]
    fn list_versions_skips_directories_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        for v in ["v2", "v1"] {
            std::fs::create_dir(dir.path().join(v)).unwrap();
            std::fs::write(dir.path().join(v).join(MANIFEST_FILE), "{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("partial")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        assert_eq!(list_versions(dir.path()).unwrap(), vec!["v1", "v2"]);
    }

    #[test]
    fn integrity_failures_are_distinguishable_from_absence() {
        let mismatch = ArtifactError::IntegrityMismatch {
            file: WEIGHTS_FILE.into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(mismatch.is_integrity_failure());
        assert!(!ArtifactError::VersionNotFound("v1".into()).is_integrity_failure());
        assert!(!ArtifactError::WeightsMissing(PathBuf::from("/m/v1")).is_integrity_failure());
    }
}
