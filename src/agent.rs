//! Question answering over the indexed bookmarks.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::AppError;
use crate::llm::{ChatMessage, LanguageModel, Role};
use crate::pipeline::Library;
use crate::semantic::RetrievedDocument;

pub const SYSTEM_PROMPT: &str = "\
You are an AI bookmark assistant. You help users find relevant bookmarks from \
their personal Chrome bookmark collection.

**Instructions:**
- Answer using only the bookmarks provided in the context of each question.
- Present results as a numbered markdown list with clickable links: \
`[Name](url)` followed by a brief description.
- If the context holds no relevant bookmarks, say so honestly. Do not make up \
bookmarks.
- You can handle follow-up questions and refine answers based on conversation \
context.
- Be concise and helpful.";

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedDocument>,
}

/// Retrieved documents as `Source:`/`Content:` blocks separated by blank lines.
pub fn format_context(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|doc| format!("Source: {}\nContent: {}", doc.source, doc.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn user_prompt(question: &str, context: &str) -> String {
    if context.is_empty() {
        return format!("{question}\n\nRetrieved bookmarks: none");
    }
    format!("{question}\n\nRetrieved bookmarks:\n\n{context}")
}

/// A conversation with the model, grounded on retrieved bookmarks.
pub struct Agent {
    model: Arc<dyn LanguageModel>,
    library: Arc<Library>,
    k: usize,
    history: Vec<ChatMessage>,
}

impl Agent {
    pub fn new(model: Arc<dyn LanguageModel>, library: Arc<Library>, k: usize) -> Self {
        log::info!("Agent created with model={}, k={}", model.name(), k);
        Self {
            model,
            library,
            k,
            history: vec![],
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Change how many documents later questions retrieve.
    pub fn set_k(&mut self, k: usize) {
        self.k = k;
    }

    #[cfg(test)]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Search text for `question`. A follow-up is searched together with the
    /// previous question so that "more like that" still finds something.
    fn retrieval_query(&self, question: &str) -> String {
        let previous = self
            .history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str());

        match previous {
            Some(previous) => format!("{previous}\n{question}"),
            None => question.to_string(),
        }
    }

    pub async fn ask(&mut self, question: &str) -> Result<Answer, AppError> {
        let query = self.retrieval_query(question);
        let sources = self.retrieve(query).await?;
        log::debug!("Retrieved {} documents for question", sources.len());

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(user_prompt(
            question,
            &format_context(&sources),
        )));

        let text = self.model.complete(&messages).await?;

        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(text.clone()));

        Ok(Answer { text, sources })
    }

    async fn retrieve(&self, query: String) -> Result<Vec<RetrievedDocument>, AppError> {
        let library = self.library.clone();
        let k = self.k;

        let documents =
            tokio::task::spawn_blocking(move || library.index.search(&query, k)).await??;
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::BookmarkRecord;
    use crate::semantic::IndexManager;
    use crate::tests::fakes::{FakeEmbedder, FakeModel};

    fn library(dir: &std::path::Path) -> Arc<Library> {
        let records = vec![
            BookmarkRecord::new("/Food", "Recipes", "https://recipes.example")
                .with_description("Cooking recipes and kitchen tips."),
            BookmarkRecord::new("/Dev", "Rust Book", "https://doc.rust-lang.org/book")
                .with_description("The Rust programming language book."),
        ];
        let index =
            IndexManager::load_or_create(Arc::new(FakeEmbedder::new(64)), dir, &records).unwrap();
        Arc::new(Library { records, index })
    }

    #[test]
    fn test_format_context() {
        let docs = vec![
            RetrievedDocument {
                text: "A\n\nfirst".into(),
                source: "http://a".into(),
                score: 0.9,
            },
            RetrievedDocument {
                text: "B\n\nsecond".into(),
                source: "http://b".into(),
                score: 0.5,
            },
        ];

        assert_eq!(
            format_context(&docs),
            "Source: http://a\nContent: A\n\nfirst\n\nSource: http://b\nContent: B\n\nsecond"
        );
        assert_eq!(format_context(&[]), "");
    }

    #[tokio::test]
    async fn test_ask_sends_prompt_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeModel::new().replying("1. [Rust Book](https://doc.rust-lang.org/book)"));
        let mut agent = Agent::new(model.clone(), library(dir.path()), 1);

        let answer = agent.ask("rust programming book").await.unwrap();

        assert_eq!(answer.text, "1. [Rust Book](https://doc.rust-lang.org/book)");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source, "https://doc.rust-lang.org/book");

        let messages = model.last_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.starts_with("rust programming book"));
        assert!(messages[1]
            .content
            .contains("Source: https://doc.rust-lang.org/book\nContent: Rust Book\n\n"));
    }

    #[tokio::test]
    async fn test_history_carries_plain_turns() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeModel::new().replying("answer"));
        let mut agent = Agent::new(model.clone(), library(dir.path()), 2);

        agent.ask("first question").await.unwrap();
        agent.ask("second question").await.unwrap();

        let history = agent.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], ChatMessage::user("first question"));
        assert_eq!(history[1], ChatMessage::assistant("answer"));

        let messages = model.last_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1], ChatMessage::user("first question"));
        assert_eq!(messages[2], ChatMessage::assistant("answer"));
        assert!(messages[3].content.starts_with("second question"));
    }

    #[tokio::test]
    async fn test_follow_up_searches_with_previous_question() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeModel::new().replying("ok"));
        let mut agent = Agent::new(model.clone(), library(dir.path()), 1);

        agent.ask("rust programming book").await.unwrap();
        let follow_up = agent.ask("anything similar?").await.unwrap();

        assert_eq!(follow_up.sources[0].source, "https://doc.rust-lang.org/book");
        let messages = model.last_messages();
        assert!(messages[3].content.starts_with("anything similar?\n\n"));
    }

    #[test]
    fn test_retrieval_query_without_history() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::new(Arc::new(FakeModel::new()), library(dir.path()), 1);

        assert_eq!(agent.retrieval_query("rust"), "rust");
    }

    #[tokio::test]
    async fn test_set_k_changes_retrieval() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeModel::new().replying("ok"));
        let mut agent = Agent::new(model, library(dir.path()), 1);

        assert_eq!(agent.ask("recipes").await.unwrap().sources.len(), 1);

        agent.set_k(5);
        assert_eq!(agent.k(), 5);
        assert_eq!(agent.ask("recipes").await.unwrap().sources.len(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_leaves_history_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeModel::new().failing_all());
        let mut agent = Agent::new(model, library(dir.path()), 1);

        assert!(matches!(agent.ask("anything").await, Err(AppError::Llm(_))));
        assert!(agent.history().is_empty());
    }
}
