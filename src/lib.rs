pub mod config;
pub mod pipeline;

pub use pipeline::artifacts::{
    ArtifactError, ArtifactWriter, IntegrityVerifier, ModelCard, ModelInfo, VersionResolver,
};
pub use pipeline::extraction::{extract, ExtractionError, ExtractionOutcome, ExtractionPipeline};
pub use pipeline::hash::{hash_file, HashError};

use tracing_subscriber::EnvFilter;

/// Install the `fmt` subscriber, honouring `RUST_LOG` when set.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_tracing_is_idempotent() {
        super::init_tracing();
        super::init_tracing();
    }
}
