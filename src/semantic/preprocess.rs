//! Text preparation for indexing and embedding.
//!
//! The indexed text of a bookmark is its name and description separated by a
//! blank line. The embedder sees a trimmed copy capped at a fixed length.

/// Maximum content length for embedding input (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 512;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// The text stored in the index for a bookmark.
pub fn document_text(name: &str, description: &str) -> String {
    format!("{}\n\n{}", name, description)
}

/// Prepare stored text (or a query) for the embedder.
pub fn embedding_input(text: &str) -> String {
    truncate_content(text.trim())
}

/// Truncate content to MAX_CONTENT_LENGTH chars, adding ellipsis if truncated.
fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}
