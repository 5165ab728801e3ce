//! Incremental index over bookmark records.
//!
//! The index is keyed by URL. Loading an existing index only embeds records
//! whose URL is not indexed yet; entries are never updated or removed.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::bookmarks::BookmarkRecord;
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::preprocess::{document_text, embedding_input};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

/// Upper bound on texts handed to the embedder at once.
pub const EMBED_BATCH_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum IndexManagerError {
    #[error("Bookmark {0} has no description, enrich before indexing")]
    MissingDescription(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),
}

/// A document returned by [`IndexManager::search`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub text: String,
    /// URL of the bookmark
    pub source: String,
    pub score: f32,
}

/// Persistent similarity index over bookmark records.
pub struct IndexManager {
    embedder: Arc<dyn Embedder>,
    index: VectorIndex,
    storage: VectorStorage,
}

/// A record ready to be embedded.
struct Pending {
    source: String,
    text: String,
}

impl IndexManager {
    /// Open the index in `index_dir` and bring it up to date with `records`.
    ///
    /// Every record must carry a description. New URLs are embedded and
    /// appended; an index written by another embedding model is rebuilt.
    pub fn load_or_create(
        embedder: Arc<dyn Embedder>,
        index_dir: &Path,
        records: &[BookmarkRecord],
    ) -> Result<Self, IndexManagerError> {
        let documents = Self::documents(records)?;

        let storage = VectorStorage::new(index_dir);
        let model_id = embedder.model_id_hash();
        let dimensions = embedder.dimensions();

        let existing = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(index) => Some(index),
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!(
                        "Index at {} was built with another embedding model, rebuilding with '{}'",
                        storage.path().display(),
                        embedder.name()
                    );
                    None
                }
                Err(VectorStorageError::DimensionMismatch { expected, got }) => {
                    log::warn!(
                        "Index at {} has {} dimensions, model produces {}, rebuilding",
                        storage.path().display(),
                        got,
                        expected
                    );
                    None
                }
                Err(e) => {
                    log::error!("Failed to load index from {}: {}", storage.path().display(), e);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let mut manager = match existing {
            Some(index) => {
                log::info!(
                    "Loaded index with {} documents from {}",
                    index.len(),
                    storage.path().display()
                );
                Self {
                    embedder,
                    index,
                    storage,
                }
            }
            None => {
                log::info!("Creating new index at {}", storage.path().display());
                let mut manager = Self {
                    embedder,
                    index: VectorIndex::with_capacity(dimensions, documents.len()),
                    storage,
                };
                let added = manager.add(documents)?;
                manager.save()?;
                log::info!("Index created with {} documents", added);
                return Ok(manager);
            }
        };

        let pending: Vec<Pending> = documents
            .into_iter()
            .filter(|doc| !manager.index.contains(&doc.source))
            .collect();

        if pending.is_empty() {
            log::info!("Index is up to date");
            return Ok(manager);
        }

        let added = manager.add(pending)?;
        manager.save()?;
        log::info!("Added {} new documents to the index", added);

        Ok(manager)
    }

    /// Return at most `k` documents ranked by similarity to `query`.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, IndexManagerError> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(&embedding_input(query))?;
        let results = self.index.search(&query_embedding, k)?;

        Ok(results
            .into_iter()
            .map(|r| RetrievedDocument {
                text: r.document.text.clone(),
                source: r.document.source.clone(),
                score: r.score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.index.contains(source)
    }

    /// Indexed text per record, first occurrence of a URL wins.
    fn documents(records: &[BookmarkRecord]) -> Result<Vec<Pending>, IndexManagerError> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());

        for record in records {
            let description = record
                .description
                .as_deref()
                .ok_or_else(|| IndexManagerError::MissingDescription(record.url.clone()))?;

            if seen.insert(record.url.as_str()) {
                documents.push(Pending {
                    source: record.url.clone(),
                    text: document_text(&record.name, description),
                });
            }
        }

        Ok(documents)
    }

    fn add(&mut self, documents: Vec<Pending>) -> Result<usize, IndexManagerError> {
        let mut added = 0;

        for chunk in documents.chunks(EMBED_BATCH_SIZE) {
            let inputs: Vec<String> = chunk.iter().map(|doc| embedding_input(&doc.text)).collect();
            let embeddings = self.embedder.embed_batch(&inputs)?;

            if embeddings.len() != chunk.len() {
                return Err(EmbeddingError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    embeddings.len()
                ))
                .into());
            }

            for (doc, embedding) in chunk.iter().zip(embeddings) {
                if self
                    .index
                    .insert(doc.source.clone(), doc.text.clone(), embedding)?
                {
                    added += 1;
                }
            }

            log::debug!("Embedded {} documents", added);
        }

        Ok(added)
    }

    fn save(&self) -> Result<(), IndexManagerError> {
        self.storage
            .save(&self.index, &self.embedder.model_id_hash())?;
        Ok(())
    }
}
