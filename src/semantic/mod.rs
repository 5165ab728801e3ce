//! Local semantic index for bookmark records.
//!
//! Embeddings are computed locally with fastembed-rs and searched in memory.
//!
//! # Architecture
//!
//! - `embeddings`: The [`Embedder`] seam and its fastembed implementation
//! - `index`: In-memory vector index with cosine similarity search
//! - `storage`: Binary file I/O for vectors.bin persistence
//! - `preprocess`: Indexed text layout and embedding input preparation
//! - `service`: Incremental index manager over bookmark records

pub mod embeddings;
mod index;
mod preprocess;
mod service;
mod storage;

pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use service::{IndexManager, IndexManagerError, RetrievedDocument};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "bge-base-en-v1.5";
