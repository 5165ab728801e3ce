//! Merging a fresh bookmark read with the cached, enriched set.

use std::collections::{HashMap, HashSet};

use crate::bookmarks::{count_missing_descriptions, BookmarkRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub total: usize,
    /// Records taken from the cache.
    pub reused: usize,
    /// Records only present in the fresh read.
    pub added: usize,
    /// Cached URLs that no longer exist in the source.
    pub dropped: usize,
    pub missing_descriptions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Merged {
    pub records: Vec<BookmarkRecord>,
    pub report: MergeReport,
}

/// Merge `fresh` with `cached`, matching by URL.
///
/// The output follows `fresh` order. A fresh record whose URL is cached is
/// replaced by the cached one, which keeps its description even when the
/// bookmark was renamed or moved. Cached records missing from `fresh` are
/// dropped.
pub fn merge(fresh: Vec<BookmarkRecord>, cached: Vec<BookmarkRecord>) -> Merged {
    let cached_urls: HashSet<String> = cached.iter().map(|b| b.url.clone()).collect();
    let fresh_urls: HashSet<&str> = fresh.iter().map(|b| b.url.as_str()).collect();
    let dropped = cached_urls
        .iter()
        .filter(|url| !fresh_urls.contains(url.as_str()))
        .count();

    // later duplicates win
    let cached_by_url: HashMap<String, BookmarkRecord> =
        cached.into_iter().map(|b| (b.url.clone(), b)).collect();

    let mut reused = 0;
    let mut added = 0;
    let records = fresh
        .into_iter()
        .map(|bookmark| match cached_by_url.get(&bookmark.url) {
            Some(cached) => {
                reused += 1;
                cached.clone()
            }
            None => {
                added += 1;
                bookmark
            }
        })
        .collect::<Vec<_>>();

    let report = MergeReport {
        total: records.len(),
        reused,
        added,
        dropped,
        missing_descriptions: count_missing_descriptions(&records),
    };

    log::info!(
        "Merged bookmarks: {} total, {} reused, {} new, {} removed, {} need descriptions",
        report.total,
        report.reused,
        report.added,
        report.dropped,
        report.missing_descriptions
    );

    Merged { records, report }
}
