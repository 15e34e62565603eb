use std::sync::Arc;

use super::card::ModelCard;
use super::types::{EmbeddingModel, ModelInfo, ModelLoader};
use super::verifier::IntegrityVerifier;
use super::{validate_version, ArtifactError};
use crate::config::ResolverConfig;

/// Version reported when the baseline model is being served.
pub const BASELINE_VERSION: &str = "baseline";

/// Resolves a requested model version to one verified, loaded model.
///
/// Verification happens once, at resolution; encode calls trust the loaded
/// model for the lifetime of the resolver.
pub struct VersionResolver {
    config: ResolverConfig,
    loader: Arc<dyn ModelLoader>,
    model: Option<Box<dyn EmbeddingModel>>,
    card: Option<ModelCard>,
    version: Option<String>,
    fallback_reason: Option<String>,
}

impl VersionResolver {
    /// An unresolved resolver. Encoding fails with `NotLoaded` until
    /// [`resolve`](Self::resolve) succeeds.
    pub fn new(config: ResolverConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            config,
            loader,
            model: None,
            card: None,
            version: None,
            fallback_reason: None,
        }
    }

    /// Resolve `version` (or the baseline when `None`) in one step.
    pub fn open(
        version: Option<&str>,
        fallback_to_baseline: bool,
        config: &ResolverConfig,
        loader: Arc<dyn ModelLoader>,
    ) -> Result<Self, ArtifactError> {
        let mut resolver = Self::new(config.clone(), loader);
        resolver.resolve(version, fallback_to_baseline)?;
        Ok(resolver)
    }

    /// Load the requested version, or the baseline when none is requested.
    ///
    /// An artifact that fails verification is never loaded. With
    /// `fallback_to_baseline` a missing or unverifiable version is replaced
    /// by the baseline and the reason is kept in [`info`](Self::info);
    /// without it the failure is returned. I/O failures are always returned.
    pub fn resolve(
        &mut self,
        requested: Option<&str>,
        fallback_to_baseline: bool,
    ) -> Result<(), ArtifactError> {
        let Some(version) = requested else {
            return self.load_baseline(None);
        };

        let failure = match self.load_version(version) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if failure.is_io_failure() {
            tracing::error!(version, error = %failure, "Model version unreadable");
            return Err(failure);
        }
        if failure.is_integrity_failure() {
            tracing::error!(version, error = %failure, "Refusing to load artifact that failed verification");
        } else {
            tracing::warn!(version, error = %failure, "Model version could not be loaded");
        }

        if !fallback_to_baseline {
            return Err(failure);
        }

        tracing::warn!(
            requested = version,
            baseline = %self.config.baseline_name,
            "Falling back to baseline model"
        );
        self.load_baseline(Some(failure.to_string()))
    }

    fn load_version(&mut self, version: &str) -> Result<(), ArtifactError> {
        validate_version(version)?;
        let dir = self.config.models_root.join(version);
        if !dir.is_dir() {
            return Err(ArtifactError::VersionNotFound(version.to_string()));
        }

        // Versions are immutable once their manifest exists; the weights are
        // re-hashed after loading so a swap during the load is still caught.
        let card = IntegrityVerifier::verify(&dir)?;
        let model = self.loader.load(&dir)?;
        IntegrityVerifier::verify_weights(&dir, &card)?;
        if model.dimension() != card.embedding_dimension() {
            return Err(ArtifactError::InvalidManifest(format!(
                "manifest records dimension {}, model produces {}",
                card.embedding_dimension(),
                model.dimension()
            )));
        }

        tracing::info!(
            version,
            dimension = model.dimension(),
            safety_validated = card.is_safety_validated(),
            recall_improvement_pct = card.improvement_pct(),
            "Loaded verified model version"
        );

        self.model = Some(model);
        self.card = Some(card);
        self.version = Some(version.to_string());
        self.fallback_reason = None;
        Ok(())
    }

    fn load_baseline(&mut self, reason: Option<String>) -> Result<(), ArtifactError> {
        let model = self.loader.load(&self.config.baseline_dir)?;
        tracing::info!(
            baseline = %self.config.baseline_name,
            dimension = model.dimension(),
            "Loaded baseline model"
        );

        self.model = Some(model);
        self.card = None;
        self.version = Some(BASELINE_VERSION.to_string());
        self.fallback_reason = reason;
        Ok(())
    }

    pub fn encode(&self, text: &str) -> Result<Vec<f32>, ArtifactError> {
        self.model()?.embed(text)
    }

    pub fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ArtifactError> {
        self.model()?.embed_batch(texts)
    }

    fn model(&self) -> Result<&dyn EmbeddingModel, ArtifactError> {
        self.model.as_deref().ok_or(ArtifactError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Resolved version, `"baseline"` when the baseline is served.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Manifest that validated the loaded model; `None` for the baseline.
    pub fn card(&self) -> Option<&ModelCard> {
        self.card.as_ref()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.dimension())
    }

    pub fn info(&self) -> Result<ModelInfo, ArtifactError> {
        let version = self.version.clone().ok_or(ArtifactError::NotLoaded)?;
        Ok(ModelInfo {
            version,
            has_manifest: self.card.is_some(),
            safety_validated: self.card.as_ref().map(ModelCard::is_safety_validated),
            recall_improvement_pct: self.card.as_ref().map(ModelCard::improvement_pct),
            fallback_reason: self.fallback_reason.clone(),
        })
    }
}
