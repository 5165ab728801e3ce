//! Startup pipeline: source → merge with cache → enrich → cache → index.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::Instrument;

use crate::bookmarks::BookmarkRecord;
use crate::cache::CacheStore;
use crate::config::Config;
use crate::enrich::Enricher;
use crate::errors::AppError;
use crate::llm::LanguageModel;
use crate::reconcile;
use crate::semantic::{Embedder, IndexManager};
use crate::source;

/// Enriched bookmarks and the index built over them.
pub struct Library {
    pub records: Vec<BookmarkRecord>,
    pub index: IndexManager,
}

pub struct Pipeline {
    config: Config,
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    library: OnceCell<Arc<Library>>,
}

impl Pipeline {
    pub fn new(config: Config, model: Arc<dyn LanguageModel>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            model,
            embedder,
            library: OnceCell::new(),
        }
    }

    /// Run the pipeline, once per process.
    ///
    /// Concurrent callers wait for the same run. A failed run is not
    /// remembered, the next call starts over.
    pub async fn run(&self) -> Result<Arc<Library>, AppError> {
        self.library
            .get_or_try_init(|| self.build().instrument(tracing::info_span!("pipeline")))
            .await
            .map(Arc::clone)
    }

    async fn build(&self) -> Result<Arc<Library>, AppError> {
        let source_path = source::locate_bookmarks(self.config.bookmarks_path.as_deref())?;
        let fresh = source::read_bookmarks(&source_path)?;

        let cache = CacheStore::new(&self.config.bookmarks_cache_path);
        let cached = cache.load()?;

        let merged = reconcile::merge(fresh, cached);

        let enricher = Enricher::new(self.model.clone())
            .with_max_concurrent(self.config.max_concurrent_descriptions)
            .with_timeout(self.config.description_timeout());
        let records = enricher.enrich(merged.records).await;

        cache.save(&records)?;

        let embedder = self.embedder.clone();
        let index_dir = self.config.vector_store_dir.clone();
        let (records, index) = tokio::task::spawn_blocking(move || {
            let index = IndexManager::load_or_create(embedder, &index_dir, &records);
            (records, index)
        })
        .await?;

        Ok(Arc::new(Library {
            records,
            index: index?,
        }))
    }
}
