//! In-memory vector index with cosine similarity search.
//!
//! Stores bookmark documents keyed by URL and provides similarity search.

use std::collections::HashMap;

/// A document in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    /// URL of the bookmark, the unique key
    pub source: String,
    /// The text that was embedded
    pub text: String,
    /// The embedding vector
    pub embedding: Vec<f32>,
}

/// In-memory vector index for semantic search.
///
/// Documents are kept in insertion order so that saving is deterministic.
/// There is no removal: the index only grows.
pub struct VectorIndex {
    documents: Vec<IndexedDocument>,
    /// URL -> position in `documents`
    positions: HashMap<String, usize>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Search result from the vector index.
#[derive(Debug, Clone)]
pub struct SearchResult<'a> {
    pub document: &'a IndexedDocument,
    /// Cosine similarity score
    pub score: f32,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    #[cfg(test)]
    pub fn new(dimensions: usize) -> Self {
        Self::with_capacity(dimensions, 0)
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            documents: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Add a document.
    ///
    /// Returns `Ok(false)` and leaves the index untouched when `source` is
    /// already indexed.
    pub fn insert(
        &mut self,
        source: String,
        text: String,
        embedding: Vec<f32>,
    ) -> Result<bool, IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if Self::l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        if self.positions.contains_key(&source) {
            return Ok(false);
        }

        self.positions.insert(source.clone(), self.documents.len());
        self.documents.push(IndexedDocument {
            source,
            text,
            embedding,
        });

        Ok(true)
    }

    #[cfg(test)]
    pub fn get(&self, source: &str) -> Option<&IndexedDocument> {
        self.positions.get(source).map(|&pos| &self.documents[pos])
    }

    pub fn contains(&self, source: &str) -> bool {
        self.positions.contains_key(source)
    }

    /// All indexed URLs.
    #[cfg(test)]
    pub fn sources(&self) -> impl Iterator<Item = &str> + '_ {
        self.documents.iter().map(|d| d.source.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedDocument> {
        self.documents.iter()
    }

    /// Search for similar vectors using cosine similarity.
    ///
    /// Returns at most `limit` results sorted by score (highest first).
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult<'_>>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = Self::l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<SearchResult> = self
            .documents
            .iter()
            .map(|document| SearchResult {
                document,
                score: Self::cosine_similarity(query, &document.embedding, query_norm),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        Ok(results)
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Assumes query_norm is precomputed for efficiency.
    fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
        let target_norm = Self::l2_norm(target);
        if target_norm < f32::EPSILON {
            return 0.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        dot_product / (query_norm * target_norm)
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}
