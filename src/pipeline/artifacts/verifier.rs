use std::path::Path;

use super::card::ModelCard;
use super::{ArtifactError, CONFIG_FILE, MANIFEST_FILE, WEIGHTS_FILE};
use crate::pipeline::hash::hash_file;

/// Certifies that a model directory still holds the exact bytes its manifest
/// describes.
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Recompute weights and config hashes and compare them with the manifest.
    ///
    /// A mismatch is reported, never repaired. A config file is only allowed
    /// to be absent when the manifest records no config hash, and a config
    /// file the manifest does not vouch for is rejected as well.
    pub fn verify(dir: &Path) -> Result<ModelCard, ArtifactError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let weights_path = dir.join(WEIGHTS_FILE);
        let config_path = dir.join(CONFIG_FILE);

        if !manifest_path.is_file() {
            return Err(ArtifactError::ManifestMissing(dir.to_path_buf()));
        }
        if !weights_path.is_file() {
            return Err(ArtifactError::WeightsMissing(dir.to_path_buf()));
        }

        let card = ModelCard::read(&manifest_path)?;

        if let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) {
            if dir_name != card.version() {
                tracing::error!(
                    dir = %dir.display(),
                    manifest_version = card.version(),
                    "Manifest version does not match its directory, possible tampering"
                );
                return Err(ArtifactError::InvalidManifest(format!(
                    "manifest describes version {:?} but lives in {dir_name:?}",
                    card.version()
                )));
            }
        }

        check_hash(WEIGHTS_FILE, &weights_path, card.weights_hash(), dir)?;

        match (config_path.is_file(), card.config_hash()) {
            (true, Some(expected)) => check_hash(CONFIG_FILE, &config_path, expected, dir)?,
            (true, None) => {
                tracing::error!(dir = %dir.display(), "Config present but not recorded in manifest");
                return Err(ArtifactError::IntegrityMismatch {
                    file: CONFIG_FILE.into(),
                    expected: "<none recorded>".into(),
                    actual: hash_file(&config_path)?,
                });
            }
            (false, Some(_)) => {
                tracing::error!(dir = %dir.display(), "Config recorded in manifest is missing");
                return Err(ArtifactError::ConfigMissing(dir.to_path_buf()));
            }
            (false, None) => {}
        }

        tracing::debug!(dir = %dir.display(), version = card.version(), "Artifact verified");
        Ok(card)
    }

    /// Re-check only the weights of an already verified directory.
    pub fn verify_weights(dir: &Path, card: &ModelCard) -> Result<(), ArtifactError> {
        check_hash(WEIGHTS_FILE, &dir.join(WEIGHTS_FILE), card.weights_hash(), dir)
    }
}

fn check_hash(file: &str, path: &Path, expected: &str, dir: &Path) -> Result<(), ArtifactError> {
    let actual = hash_file(path)?;
    if actual != expected {
        tracing::error!(
            dir = %dir.display(),
            file,
            expected,
            actual = %actual,
            "Hash mismatch, artifact corrupted or tampered"
        );
        return Err(ArtifactError::IntegrityMismatch {
            file: file.into(),
            expected: expected.into(),
            actual,
        });
    }
    Ok(())
}
