use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::semantic::{EmbeddingError, IndexManagerError};
use crate::source::SourceError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("bookmark source error: {0}")]
    Source(#[from] SourceError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexManagerError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
