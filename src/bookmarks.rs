use serde::{Deserialize, Serialize};

/// A single saved link.
///
/// `url` is the identity of a bookmark across runs. A `description` of
/// `None` means the record still needs enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BookmarkRecord {
    #[serde(default)]
    pub folder: String,
    pub name: String,
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BookmarkRecord {
    pub fn new(
        folder: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
            url: url.into(),
            description: None,
        }
    }

    #[cfg(test)]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn needs_description(&self) -> bool {
        self.description.is_none()
    }
}

/// Number of records that still lack a description.
pub fn count_missing_descriptions(records: &[BookmarkRecord]) -> usize {
    records.iter().filter(|r| r.needs_description()).count()
}
