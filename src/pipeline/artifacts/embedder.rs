use std::fs::File;
use std::hash::Hasher;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::types::{EmbeddingModel, ModelLoader, ParameterCounts, TrainedModel};
use super::{ArtifactError, CONFIG_FILE, WEIGHTS_FILE};

/// Architecture tag written into `config.json` by [`StaticEmbedder`].
pub const STATIC_ARCHITECTURE: &str = "static-hashed";

/// Config persisted next to static embedding weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticEmbedderConfig {
    pub architecture: String,
    pub base_model: String,
    pub vocab_size: usize,
    pub dimension: usize,
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
}

fn default_lowercase() -> bool {
    true
}

/// Static token-embedding model: each token hashes to one row of a
/// `vocab_size x dimension` table, a text embeds to the L2-normalized mean of
/// its token rows.
///
/// Weights are stored as little-endian `f32`, row-major.
#[derive(Debug, Clone)]
pub struct StaticEmbedder {
    config: StaticEmbedderConfig,
    table: Vec<f32>,
}

impl StaticEmbedder {
    pub fn new(config: StaticEmbedderConfig, table: Vec<f32>) -> Result<Self, ArtifactError> {
        if config.vocab_size == 0 || config.dimension == 0 {
            return Err(ArtifactError::Model(format!(
                "empty embedding table ({} x {})",
                config.vocab_size, config.dimension
            )));
        }
        let expected = table_len(config.vocab_size, config.dimension)?;
        if table.len() != expected {
            return Err(ArtifactError::Model(format!(
                "weights hold {} values, config expects {expected}",
                table.len()
            )));
        }
        Ok(Self { config, table })
    }

    /// Deterministically initialized table, values in [-1, 1).
    pub fn seeded(
        base_model: &str,
        vocab_size: usize,
        dimension: usize,
        seed: u64,
    ) -> Result<Self, ArtifactError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let table = (0..table_len(vocab_size, dimension)?)
            .map(|_| rng.gen_range(-1.0f32..1.0))
            .collect();

        Self::new(
            StaticEmbedderConfig {
                architecture: STATIC_ARCHITECTURE.into(),
                base_model: base_model.into(),
                vocab_size,
                dimension,
                lowercase: true,
            },
            table,
        )
    }

    /// Load `config.json` and `model.bin` from a model directory.
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let config_path = dir.join(CONFIG_FILE);
        let config_file = File::open(&config_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ArtifactError::Model(format!("{} not found", config_path.display()))
            }
            _ => ArtifactError::Io(e),
        })?;
        let config: StaticEmbedderConfig = serde_json::from_reader(BufReader::new(config_file))?;
        if config.architecture != STATIC_ARCHITECTURE {
            return Err(ArtifactError::Model(format!(
                "unsupported architecture {:?}",
                config.architecture
            )));
        }

        let weights_path = dir.join(WEIGHTS_FILE);
        let bytes = std::fs::read(&weights_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ArtifactError::WeightsMissing(dir.to_path_buf()),
            _ => ArtifactError::Io(e),
        })?;
        if bytes.len() % 4 != 0 {
            return Err(ArtifactError::Model(format!(
                "weights length {} is not a whole number of f32 values",
                bytes.len()
            )));
        }
        let table = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let model = Self::new(config, table)?;
        tracing::debug!(
            dir = %dir.display(),
            vocab = model.config.vocab_size,
            dimension = model.config.dimension,
            "Static embedder loaded"
        );
        Ok(model)
    }

    pub fn config(&self) -> &StaticEmbedderConfig {
        &self.config
    }

    fn row(&self, token: &str) -> &[f32] {
        let mut hasher = fnv_rs::Fnv64::default();
        hasher.write(token.as_bytes());
        let idx = (hasher.finish() % self.config.vocab_size as u64) as usize;
        let start = idx * self.config.dimension;
        &self.table[start..start + self.config.dimension]
    }

    fn infer(&self, text: &str) -> Vec<f32> {
        let mut pooled = vec![0.0f32; self.config.dimension];
        let mut tokens = 0usize;

        for raw in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let token = if self.config.lowercase {
                raw.to_lowercase()
            } else {
                raw.to_string()
            };
            for (p, w) in pooled.iter_mut().zip(self.row(&token)) {
                *p += w;
            }
            tokens += 1;
        }

        if tokens > 0 {
            for val in &mut pooled {
                *val /= tokens as f32;
            }
        }
        l2_normalize(&mut pooled);
        pooled
    }
}

impl EmbeddingModel for StaticEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ArtifactError> {
        Ok(self.infer(text))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

impl TrainedModel for StaticEmbedder {
    fn base_model(&self) -> &str {
        &self.config.base_model
    }

    fn parameter_counts(&self) -> ParameterCounts {
        let total = self.table.len() as u64;
        ParameterCounts {
            total,
            trainable: total,
        }
    }

    fn write_weights(&self, path: &Path) -> Result<(), ArtifactError> {
        let mut writer = BufWriter::new(File::create(path)?);
        for value in &self.table {
            writer.write_all(&value.to_le_bytes())?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    fn write_config(&self, path: &Path) -> Result<bool, ArtifactError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &self.config)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(true)
    }
}

/// Loads [`StaticEmbedder`] directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticModelLoader;

impl ModelLoader for StaticModelLoader {
    fn load(&self, dir: &Path) -> Result<Box<dyn EmbeddingModel>, ArtifactError> {
        Ok(Box::new(StaticEmbedder::load(dir)?))
    }
}

/// Number of `f32` values in a `vocab_size x dimension` table.
fn table_len(vocab_size: usize, dimension: usize) -> Result<usize, ArtifactError> {
    vocab_size.checked_mul(dimension).ok_or_else(|| {
        ArtifactError::Model(format!(
            "embedding table {vocab_size} x {dimension} overflows"
        ))
    })
}

fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vec.iter_mut() {
            *val /= norm;
        }
    }
}

// ═══════════════════════════════════════════════════════════
// ONNX Embedder, behind the `onnx-embeddings` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use super::{l2_normalize, ArtifactError, EmbeddingModel, ModelLoader, CONFIG_FILE, WEIGHTS_FILE};
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// Default output width of MiniLM-class sentence encoders.
    pub const DEFAULT_ONNX_DIM: usize = 384;

    pub const TOKENIZER_FILE: &str = "tokenizer.json";

    #[derive(serde::Deserialize)]
    struct OnnxConfig {
        #[serde(default = "default_dim")]
        dimension: usize,
    }

    fn default_dim() -> usize {
        DEFAULT_ONNX_DIM
    }

    /// Transformer encoder exported to ONNX, mean-pooled over the attention mask.
    ///
    /// The model directory holds the ONNX graph as `model.bin`, the HuggingFace
    /// `tokenizer.json`, and optionally `config.json` with the output dimension.
    /// `Session::run` needs `&mut self`, hence the Mutex.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
        dimension: usize,
    }

    impl OnnxEmbedder {
        pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
            let model_path = dir.join(WEIGHTS_FILE);
            let tokenizer_path = dir.join(TOKENIZER_FILE);
            if !model_path.exists() {
                return Err(ArtifactError::WeightsMissing(dir.to_path_buf()));
            }
            if !tokenizer_path.exists() {
                return Err(ArtifactError::Model(format!(
                    "{} not found",
                    tokenizer_path.display()
                )));
            }

            let dimension = match std::fs::read(dir.join(CONFIG_FILE)) {
                Ok(bytes) => serde_json::from_slice::<OnnxConfig>(&bytes)?.dimension,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => DEFAULT_ONNX_DIM,
                Err(e) => return Err(e.into()),
            };

            let session = Session::builder()
                .map_err(|e: ort::Error| ArtifactError::Model(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| ArtifactError::Model(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| ArtifactError::Model(format!("ONNX load failed: {e}")))?;

            let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| ArtifactError::Model(format!("Tokenizer load failed: {e}")))?;

            tracing::info!(dir = %dir.display(), dimension, "ONNX embedder loaded");
            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimension,
            })
        }

        fn infer(&self, text: &str) -> Result<Vec<f32>, ArtifactError> {
            use ort::value::TensorRef;

            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| ArtifactError::Model(format!("Tokenization: {e}")))?;

            let to_i64 = |v: &[u32]| v.iter().map(|&x| i64::from(x)).collect::<Vec<_>>();
            let ids = to_i64(encoding.get_ids());
            let mask = to_i64(encoding.get_attention_mask());
            let types = to_i64(encoding.get_type_ids());
            let seq_len = ids.len();

            let shape = |v: Vec<i64>| {
                ndarray::Array2::from_shape_vec((1, seq_len), v)
                    .map_err(|e| ArtifactError::Model(e.to_string()))
            };
            let ids_array = shape(ids)?;
            let mask_array = shape(mask.clone())?;
            let type_array = shape(types)?;

            let tensor = |a: &ndarray::Array2<i64>| {
                TensorRef::from_array_view(a).map_err(|e| ArtifactError::Model(e.to_string()))
            };
            let inputs = ort::inputs![tensor(&ids_array)?, tensor(&mask_array)?, tensor(&type_array)?];

            let mut session = self
                .session
                .lock()
                .map_err(|_| ArtifactError::Model("Session lock poisoned".into()))?;
            let outputs = session
                .run(inputs)
                .map_err(|e| ArtifactError::Model(format!("ONNX inference failed: {e}")))?;

            // [1, seq_len, dimension]
            let (out_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ArtifactError::Model(format!("Output extraction: {e}")))?;
            if out_shape.len() != 3 || out_shape[2] as usize != self.dimension {
                return Err(ArtifactError::Model(format!(
                    "Unexpected output shape {out_shape:?}, expected [1, {seq_len}, {}]",
                    self.dimension
                )));
            }

            let mut pooled = vec![0.0f32; self.dimension];
            let mut mask_sum = 0.0f32;
            for (token, &m) in mask.iter().enumerate().take(seq_len) {
                let weight = m as f32;
                mask_sum += weight;
                let row = &data[token * self.dimension..(token + 1) * self.dimension];
                for (p, v) in pooled.iter_mut().zip(row) {
                    *p += v * weight;
                }
            }
            if mask_sum > 0.0 {
                for p in &mut pooled {
                    *p /= mask_sum;
                }
            }
            l2_normalize(&mut pooled);
            Ok(pooled)
        }
    }

    impl EmbeddingModel for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, ArtifactError> {
            self.infer(text)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    /// Loads [`OnnxEmbedder`] directories.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct OnnxModelLoader;

    impl ModelLoader for OnnxModelLoader {
        fn load(&self, dir: &Path) -> Result<Box<dyn EmbeddingModel>, ArtifactError> {
            Ok(Box::new(OnnxEmbedder::load(dir)?))
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::{OnnxEmbedder, OnnxModelLoader};

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> StaticEmbedder {
        StaticEmbedder::seeded("all-MiniLM-L6-v2", 512, 32, 7).unwrap()
    }

    #[test]
    fn embed_returns_configured_dimension() {
        let vec = model().embed("quarterly revenue report").unwrap();
        assert_eq!(vec.len(), 32);
    }

    #[test]
    fn embed_is_l2_normalized() {
        let vec = model().embed("test normalization").unwrap();
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "norm = {norm}");
    }

    #[test]
    fn embed_is_deterministic_and_case_folded() {
        let m = model();
        assert_eq!(m.embed("Same Text").unwrap(), m.embed("same text").unwrap());
        assert_ne!(m.embed("text A").unwrap(), m.embed("text B").unwrap());
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let vec = model().embed("  ,;  ").unwrap();
        assert!(vec.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn batch_matches_single_calls() {
        let m = model();
        let batch = m.embed_batch(&["one", "two", "three"]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], m.embed("two").unwrap());
    }

    #[test]
    fn seeds_produce_different_weights() {
        let a = StaticEmbedder::seeded("base", 64, 8, 1).unwrap();
        let b = StaticEmbedder::seeded("base", 64, 8, 2).unwrap();
        assert_ne!(a.embed("token").unwrap(), b.embed("token").unwrap());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let m = model();
        m.write_weights(&dir.path().join(WEIGHTS_FILE)).unwrap();
        assert!(m.write_config(&dir.path().join(CONFIG_FILE)).unwrap());

        let loaded = StaticModelLoader.load(dir.path()).unwrap();
        assert_eq!(loaded.dimension(), 32);
        assert_eq!(loaded.embed("hello world").unwrap(), m.embed("hello world").unwrap());
    }

    #[test]
    fn parameter_counts_cover_whole_table() {
        let counts = model().parameter_counts();
        assert_eq!(counts.total, 512 * 32);
        assert_eq!(counts.trainable, counts.total);
    }

    #[test]
    fn rejects_table_size_mismatch() {
        let config = model().config().clone();
        assert!(matches!(
            StaticEmbedder::new(config, vec![0.0; 10]),
            Err(ArtifactError::Model(_))
        ));
    }

    #[test]
    fn load_rejects_truncated_weights() {
        let dir = tempfile::tempdir().unwrap();
        let m = model();
        m.write_config(&dir.path().join(CONFIG_FILE)).unwrap();
        std::fs::write(dir.path().join(WEIGHTS_FILE), [0u8; 6]).unwrap();
        assert!(matches!(StaticEmbedder::load(dir.path()), Err(ArtifactError::Model(_))));
    }

    #[test]
    fn oversized_table_is_an_error_not_a_panic() {
        assert!(matches!(
            StaticEmbedder::seeded("base", usize::MAX / 2, 4, 1),
            Err(ArtifactError::Model(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let config = StaticEmbedderConfig {
            architecture: STATIC_ARCHITECTURE.into(),
            base_model: "base".into(),
            vocab_size: usize::MAX / 2,
            dimension: 4,
            lowercase: true,
        };
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            serde_json::to_vec(&config).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join(WEIGHTS_FILE), [0u8; 16]).unwrap();

        assert!(matches!(StaticEmbedder::load(dir.path()), Err(ArtifactError::Model(_))));
    }
}
