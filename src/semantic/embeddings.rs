//! Embedding model wrapper for fastembed.
//!
//! Provides a high-level interface for generating embeddings:
//! - Model download into a configurable cache directory on first use
//! - Batch embedding generation
//! - The [`Embedder`] seam the index is built against

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

/// Something that turns text into vectors of a fixed size.
pub trait Embedder: Send + Sync {
    /// Model name, used to tell indexes built by different models apart.
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    /// SHA256 hash of the model name for storage identification.
    fn model_id_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.name().as_bytes());
        hasher.finalize().into()
    }
}

/// Accepted model names: canonical, compact alias, fastembed model.
const SUPPORTED_MODELS: &[(&str, &str, fastembed::EmbeddingModel)] = &[
    ("all-MiniLM-L6-v2", "allminiml6v2", fastembed::EmbeddingModel::AllMiniLML6V2),
    ("all-MiniLM-L6-v2-q", "allminiml6v2q", fastembed::EmbeddingModel::AllMiniLML6V2Q),
    ("bge-small-en-v1.5", "bgesmallenv15", fastembed::EmbeddingModel::BGESmallENV15),
    ("bge-small-en-v1.5-q", "bgesmallenv15q", fastembed::EmbeddingModel::BGESmallENV15Q),
    ("bge-base-en-v1.5", "bgebaseenv15", fastembed::EmbeddingModel::BGEBaseENV15),
    ("bge-base-en-v1.5-q", "bgebaseenv15q", fastembed::EmbeddingModel::BGEBaseENV15Q),
    ("bge-large-en-v1.5", "bgelargeenv15", fastembed::EmbeddingModel::BGELargeENV15),
    ("bge-large-en-v1.5-q", "bgelargeenv15q", fastembed::EmbeddingModel::BGELargeENV15Q),
];

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

impl EmbeddingModel {
    /// Load the named model, downloading it into `models_dir` if needed.
    pub fn new(model_name: &str, models_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;

        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!("Loading embedding model '{}'", model_name);

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Parse model name string to fastembed enum. Matching ignores case.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        let wanted = name.to_lowercase();
        SUPPORTED_MODELS
            .iter()
            .find(|(canonical, compact, _)| {
                canonical.to_lowercase() == wanted || *compact == wanted
            })
            .map(|(_, _, model)| model.clone())
            .ok_or_else(|| {
                let names: Vec<&str> = SUPPORTED_MODELS.iter().map(|(n, _, _)| *n).collect();
                EmbeddingError::InvalidModel(format!(
                    "Unknown model: {}. Supported models: {}",
                    name,
                    names.join(", ")
                ))
            })
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl Embedder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::FakeEmbedder;

    #[test]
    #[ignore = "requires model download"]
    fn test_model_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf()).unwrap();

        assert_eq!(model.name(), "all-MiniLM-L6-v2");
        assert_eq!(model.dimensions(), 384);

        let embedding = model.embed("Hello, world!").unwrap();
        assert_eq!(embedding.len(), 384);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_model_name_aliases() {
        assert!(EmbeddingModel::parse_model_name("BGE-Base-EN-v1.5").is_ok());
        assert!(EmbeddingModel::parse_model_name("bgebaseenv15q").is_ok());
        assert!(EmbeddingModel::parse_model_name("all-MiniLM-L6-v2").is_ok());
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = EmbeddingModel::new("nonexistent-model", temp_dir.path().to_path_buf());
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
    }

    #[test]
    fn test_model_id_hash_follows_name() {
        let a = FakeEmbedder::new(8).named("model-a");
        let b = FakeEmbedder::new(8).named("model-b");

        assert_eq!(a.model_id_hash(), FakeEmbedder::new(8).named("model-a").model_id_hash());
        assert_ne!(a.model_id_hash(), b.model_id_hash());
    }

    #[test]
    fn test_default_embed_uses_batch() {
        let embedder = FakeEmbedder::new(8);
        let embedding = embedder.embed("rust tokio").unwrap();

        assert_eq!(embedding.len(), 8);
        assert_eq!(embedder.embedded_texts(), vec!["rust tokio".to_string()]);
    }
}
