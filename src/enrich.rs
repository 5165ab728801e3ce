//! Concurrent description generation for bookmarks that lack one.
//!
//! Every record without a description gets exactly one model call. Calls
//! run concurrently behind a semaphore; a failing call never aborts the
//! batch, the record gets a fallback description instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::bookmarks::BookmarkRecord;
use crate::llm::{ChatMessage, LanguageModel, LlmError};

/// Default number of generation calls in flight.
pub const MAX_CONCURRENT: usize = 5;

/// Progress is logged every this many completions (and on the last one).
const PROGRESS_EVERY: usize = 10;

pub fn build_prompt(record: &BookmarkRecord) -> String {
    format!(
        "Generate a concise description (2-3 sentences) for the following bookmark.\n\
         Folder: {}\n\
         Name: {}\n\
         URL: {}\n\n\
         If you cannot access the URL, infer the description from the name and folder \
         context. Do NOT mention that you cannot access the URL.",
        record.folder, record.name, record.url
    )
}

pub fn fallback_description(record: &BookmarkRecord) -> String {
    format!("Bookmark: {}", record.name)
}

/// Completion counter shared by the in-flight calls.
struct Progress {
    completed: AtomicUsize,
    total: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
        }
    }

    /// Count one completion. Returns whether progress was reported.
    fn tick(&self) -> bool {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let report = completed % PROGRESS_EVERY == 0 || completed == self.total;
        if report {
            log::info!("Descriptions: {}/{} complete", completed, self.total);
        }
        report
    }
}

pub struct Enricher {
    model: Arc<dyn LanguageModel>,
    max_concurrent: usize,
    timeout: Option<Duration>,
}

impl Enricher {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            max_concurrent: MAX_CONCURRENT,
            timeout: None,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    /// Give up on a single call after `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fill in the description of every record that has none.
    ///
    /// Order is preserved and records that already have a description are
    /// returned untouched.
    pub async fn enrich(&self, mut records: Vec<BookmarkRecord>) -> Vec<BookmarkRecord> {
        let pending: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.needs_description())
            .map(|(idx, _)| idx)
            .collect();

        if pending.is_empty() {
            log::info!("All bookmarks already have descriptions");
            return records;
        }

        let total = pending.len();
        log::info!(
            "Generating descriptions for {} bookmarks with {} ({} at a time)",
            total,
            self.model.name(),
            self.max_concurrent
        );

        let semaphore = Semaphore::new(self.max_concurrent);
        let progress = Progress::new(total);

        let descriptions = {
            let calls = pending
                .iter()
                .map(|&idx| self.describe(&records[idx], &semaphore, &progress));
            join_all(calls).await
        };

        let mut failed = 0;
        for (idx, description) in pending.into_iter().zip(descriptions) {
            let description = description.unwrap_or_else(|| {
                failed += 1;
                fallback_description(&records[idx])
            });
            records[idx].description = Some(description);
        }

        if failed > 0 {
            log::warn!(
                "Description generation complete, {} of {} used a fallback",
                failed,
                total
            );
        } else {
            log::info!("Description generation complete");
        }

        records
    }

    /// `None` when the call failed and the fallback should be used.
    async fn describe(
        &self,
        record: &BookmarkRecord,
        semaphore: &Semaphore,
        progress: &Progress,
    ) -> Option<String> {
        let prompt = build_prompt(record);

        // the semaphore is never closed
        let _permit = semaphore.acquire().await.ok()?;
        let result = self.generate(prompt).await;
        progress.tick();

        match result {
            Ok(description) => Some(description),
            Err(err) => {
                log::error!("Failed to generate description for {}: {}", record.url, err);
                None
            }
        }
    }

    async fn generate(&self, prompt: String) -> Result<String, LlmError> {
        let messages = [ChatMessage::user(prompt)];
        let call = self.model.complete(&messages);

        let text = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| LlmError::Timeout(timeout))??,
            None => call.await?,
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::FakeModel;

    fn records(n: usize) -> Vec<BookmarkRecord> {
        (0..n)
            .map(|i| BookmarkRecord::new("/Dev", format!("Site {i}"), format!("https://site{i}.dev")))
            .collect()
    }

    #[test]
    fn test_prompt_contents() {
        let record = BookmarkRecord::new("/Dev/Rust", "The Book", "https://doc.rust-lang.org/book");
        let prompt = build_prompt(&record);

        assert!(prompt.contains("Folder: /Dev/Rust"));
        assert!(prompt.contains("Name: The Book"));
        assert!(prompt.contains("URL: https://doc.rust-lang.org/book"));
        assert!(prompt.contains("2-3 sentences"));
        assert!(prompt.contains("Do NOT mention that you cannot access the URL"));
    }

    #[tokio::test]
    async fn test_every_record_gets_a_description() {
        let model = Arc::new(FakeModel::new());
        let enricher = Enricher::new(model.clone());

        let mut input = records(3);
        input[1].description = Some("Already described.".to_string());

        let output = enricher.enrich(input).await;

        assert_eq!(output.len(), 3);
        assert!(output.iter().all(|r| r.description.is_some()));
        assert_eq!(output[1].description.as_deref(), Some("Already described."));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_results_align_with_input_order() {
        // later calls finish first
        let model = Arc::new(FakeModel::new().with_reverse_delays(Duration::from_millis(5)));
        let enricher = Enricher::new(model);

        let output = enricher.enrich(records(8)).await;

        for (i, record) in output.iter().enumerate() {
            assert_eq!(record.name, format!("Site {i}"));
            let description = record.description.as_deref().unwrap();
            assert!(description.contains(&record.url), "{description}");
        }
    }

    #[tokio::test]
    async fn test_failure_uses_fallback() {
        let model = Arc::new(FakeModel::new().failing_for("https://site1.dev"));
        let enricher = Enricher::new(model.clone());

        let output = enricher.enrich(records(3)).await;

        assert_eq!(output[1].description.as_deref(), Some("Bookmark: Site 1"));
        assert_ne!(output[0].description.as_deref(), Some("Bookmark: Site 0"));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_response_uses_fallback() {
        let model = Arc::new(FakeModel::new().replying("   \n"));
        let enricher = Enricher::new(model);

        let output = enricher.enrich(records(1)).await;

        assert_eq!(output[0].description.as_deref(), Some("Bookmark: Site 0"));
    }

    #[tokio::test]
    async fn test_timeout_uses_fallback() {
        let model = Arc::new(FakeModel::new().with_delay(Duration::from_secs(30)));
        let enricher = Enricher::new(model).with_timeout(Some(Duration::from_millis(20)));

        let output = enricher.enrich(records(2)).await;

        assert_eq!(output[0].description.as_deref(), Some("Bookmark: Site 0"));
        assert_eq!(output[1].description.as_deref(), Some("Bookmark: Site 1"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let model = Arc::new(FakeModel::new().with_delay(Duration::from_millis(20)));
        let enricher = Enricher::new(model.clone());

        let output = enricher.enrich(records(23)).await;

        assert_eq!(output.len(), 23);
        assert_eq!(model.calls(), 23);
        assert_eq!(model.max_in_flight(), MAX_CONCURRENT);
    }

    #[tokio::test]
    async fn test_custom_concurrency_limit() {
        let model = Arc::new(FakeModel::new().with_delay(Duration::from_millis(10)));
        let enricher = Enricher::new(model.clone()).with_max_concurrent(2);

        enricher.enrich(records(6)).await;

        assert_eq!(model.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_nothing_to_do() {
        let model = Arc::new(FakeModel::new());
        let enricher = Enricher::new(model.clone());

        let input = vec![BookmarkRecord::new("", "A", "http://a").with_description("a")];
        let output = enricher.enrich(input.clone()).await;

        assert_eq!(output, input);
        assert_eq!(model.calls(), 0);
    }

    fn reporting_ticks(total: usize) -> Vec<usize> {
        let progress = Progress::new(total);
        let reported = (1..=total).filter(|_| progress.tick()).collect();
        assert_eq!(progress.completed.load(Ordering::SeqCst), total);
        reported
    }

    #[test]
    fn test_progress_reports_every_tenth_and_last() {
        assert_eq!(reporting_ticks(25), vec![10, 20, 25]);
        assert_eq!(reporting_ticks(20), vec![10, 20]);
        assert_eq!(reporting_ticks(7), vec![7]);
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_clamped() {
        let model = Arc::new(FakeModel::new());
        let enricher = Enricher::new(model.clone()).with_max_concurrent(usize::MAX);

        assert_eq!(enricher.max_concurrent, Semaphore::MAX_PERMITS);
        let output = enricher.enrich(records(3)).await;

        assert!(output.iter().all(|r| r.description.is_some()));
        assert_eq!(model.calls(), 3);
    }
}
