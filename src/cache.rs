//! Persistent cache of enriched bookmark records.
//!
//! The current format is a pretty-printed JSON array. Older installs wrote a
//! bincode-encoded list instead; it is read once, rewritten as JSON and never
//! consulted again once the JSON file exists.

use std::path::{Path, PathBuf};

use bincode::serde::decode_from_slice;
use serde::{Deserialize, Serialize};

use crate::bookmarks::BookmarkRecord;

/// File name of the legacy cache, looked up next to the JSON cache.
pub const LEGACY_CACHE_FILE: &str = "all_bookmarks.bin";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("bookmark cache {} is malformed: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("legacy bookmark cache {} is malformed: {source}", path.display())]
    Legacy {
        path: PathBuf,
        #[source]
        source: bincode::error::DecodeError,
    },

    #[error("legacy bookmark cache {} has {extra} trailing bytes", path.display())]
    LegacyTrailingData { path: PathBuf, extra: usize },
}

/// Record layout of the legacy cache. bincode is not self-describing, so the
/// optional description is always present on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LegacyRecord {
    folder: String,
    name: String,
    url: String,
    description: Option<String>,
}

impl From<LegacyRecord> for BookmarkRecord {
    fn from(legacy: LegacyRecord) -> Self {
        BookmarkRecord {
            folder: legacy.folder,
            name: legacy.name,
            url: legacy.url,
            description: legacy.description,
        }
    }
}

fn legacy_config() -> impl bincode::config::Config {
    bincode::config::standard()
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    legacy_path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let legacy_path = path
            .parent()
            .map(|dir| dir.join(LEGACY_CACHE_FILE))
            .unwrap_or_else(|| PathBuf::from(LEGACY_CACHE_FILE));

        Self { path, legacy_path }
    }

    #[cfg(test)]
    pub fn with_legacy_path(mut self, legacy_path: impl Into<PathBuf>) -> Self {
        self.legacy_path = legacy_path.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    /// Load the cached records.
    ///
    /// Falls back to migrating the legacy cache, and to an empty list when
    /// neither file exists.
    pub fn load(&self) -> Result<Vec<BookmarkRecord>, CacheError> {
        if self.path.exists() {
            log::info!("Loading bookmark cache from {}", self.path.display());
            let data = std::fs::read(&self.path).map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?;
            return serde_json::from_slice(&data).map_err(|source| CacheError::Json {
                path: self.path.clone(),
                source,
            });
        }

        if self.legacy_path.exists() {
            log::info!(
                "Migrating legacy cache {} -> {}",
                self.legacy_path.display(),
                self.path.display()
            );
            let records = self.read_legacy()?;
            self.save(&records)?;
            return Ok(records);
        }

        log::info!("No existing bookmark cache found; starting fresh");
        Ok(vec![])
    }

    /// Overwrite the cache with `records`.
    pub fn save(&self, records: &[BookmarkRecord]) -> Result<(), CacheError> {
        let io_err = |source: std::io::Error| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(records).map_err(|source| CacheError::Json {
            path: self.path.clone(),
            source,
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        if let Err(err) = std::fs::write(&temp_path, &json) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(io_err(err));
        }
        std::fs::rename(&temp_path, &self.path).map_err(io_err)?;

        log::info!("Saved {} bookmarks to {}", records.len(), self.path.display());
        Ok(())
    }

    fn read_legacy(&self) -> Result<Vec<BookmarkRecord>, CacheError> {
        let data = std::fs::read(&self.legacy_path).map_err(|source| CacheError::Io {
            path: self.legacy_path.clone(),
            source,
        })?;

        let (records, read): (Vec<LegacyRecord>, usize) =
            decode_from_slice(&data, legacy_config()).map_err(|source| CacheError::Legacy {
                path: self.legacy_path.clone(),
                source,
            })?;

        if read != data.len() {
            return Err(CacheError::LegacyTrailingData {
                path: self.legacy_path.clone(),
                extra: data.len() - read,
            });
        }

        Ok(records.into_iter().map(BookmarkRecord::from).collect())
    }
}

/// Encode records in the legacy format.
#[cfg(test)]
pub(crate) fn encode_legacy(records: &[BookmarkRecord]) -> Vec<u8> {
    let legacy: Vec<LegacyRecord> = records
        .iter()
        .map(|r| LegacyRecord {
            folder: r.folder.clone(),
            name: r.name.clone(),
            url: r.url.clone(),
            description: r.description.clone(),
        })
        .collect();

    bincode::serde::encode_to_vec(&legacy, legacy_config()).unwrap()
}
