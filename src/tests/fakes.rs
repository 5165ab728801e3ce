//! Test doubles for the language model and the embedder.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{ChatMessage, LanguageModel, LlmError};
use crate::semantic::{Embedder, EmbeddingError};

/// Scripted [`LanguageModel`].
///
/// Replies with "A page about {url}." using the `URL:` line of the prompt,
/// or a fixed reply set with [`FakeModel::replying`].
#[derive(Default)]
pub struct FakeModel {
    reply: Option<String>,
    delay: Option<Duration>,
    reverse_delay: Option<Duration>,
    failing_urls: HashSet<String>,
    fail_all: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    /// Every call sleeps for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Earlier calls sleep longer, so they finish after later ones.
    pub fn with_reverse_delays(mut self, step: Duration) -> Self {
        self.reverse_delay = Some(step);
        self
    }

    pub fn failing_for(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    pub fn failing_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }

    fn prompt_url(messages: &[ChatMessage]) -> Option<String> {
        messages
            .last()?
            .content
            .lines()
            .find_map(|line| line.strip_prefix("URL: "))
            .map(str::to_string)
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    fn name(&self) -> &str {
        "fake-model"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(step) = self.reverse_delay {
            let remaining = 20usize.saturating_sub(call) as u32;
            tokio::time::sleep(step * remaining).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let url = Self::prompt_url(messages);
        let failing = url
            .as_ref()
            .is_some_and(|url| self.failing_urls.contains(url));
        if self.fail_all || failing {
            return Err(LlmError::Status {
                status: 500,
                body: "scripted failure".to_string(),
            });
        }

        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }

        Ok(match url {
            Some(url) => format!("A page about {url}."),
            None => "A page.".to_string(),
        })
    }
}

/// Deterministic [`Embedder`]: a hashed bag of lowercase words.
pub struct FakeEmbedder {
    name: String,
    dimensions: usize,
    embedded: Mutex<Vec<String>>,
    batch_calls: AtomicUsize,
    max_batch_len: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            name: "fake-embedder".to_string(),
            dimensions,
            embedded: Mutex::new(vec![]),
            batch_calls: AtomicUsize::new(0),
            max_batch_len: AtomicUsize::new(0),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Every text embedded so far, in call order.
    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded.lock().unwrap().clone()
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn max_batch_len(&self) -> usize {
        self.max_batch_len.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }

        // keep the norm non-zero for texts without words
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }

        vector
    }
}

impl Embedder for FakeEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.max_batch_len.fetch_max(texts.len(), Ordering::SeqCst);
        self.embedded.lock().unwrap().extend(texts.iter().cloned());

        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }
}
