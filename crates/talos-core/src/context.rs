//! Context - Conversation state ownership
//!
//! The context manager owns the canonical message sequence for one loop or
//! recipe session. The orchestration loop is its only mutator; providers
//! and tools only ever see snapshots returned by `messages()`.

use talos_llm::{Message, MessageRole};
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for context-manager implementations
#[async_trait::async_trait]
pub trait Context: Send + Sync {
    /// Append a message
    async fn append(&self, message: Message);

    /// Get a snapshot of all messages, in order
    async fn messages(&self) -> Vec<Message>;

    /// Remove all messages
    async fn clear(&self);

    /// Whether the context has grown enough to warrant compaction
    async fn should_compact(&self) -> bool {
        false
    }

    /// Compact the context to bound growth
    async fn compact(&self) {}
}

/// In-memory context with optional threshold-based compaction.
///
/// Compaction folds older non-system messages into one summary message,
/// keeping system messages and a recent window intact.
pub struct BufferContext {
    messages: RwLock<Vec<Message>>,
    compact_threshold: Option<usize>,
    keep_recent: usize,
}

impl Default for BufferContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferContext {
    /// Create a context that never compacts
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            compact_threshold: None,
            keep_recent: 8,
        }
    }

    /// Create a context that compacts once it exceeds `threshold` messages,
    /// keeping the most recent `keep_recent` intact
    #[must_use]
    pub fn with_compaction(threshold: usize, keep_recent: usize) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            compact_threshold: Some(threshold),
            keep_recent,
        }
    }

    /// Create a context pre-populated with messages (recipe stage slices)
    #[must_use]
    pub fn seeded(messages: Vec<Message>) -> Self {
        Self {
            messages: RwLock::new(messages),
            compact_threshold: None,
            keep_recent: 8,
        }
    }

    fn summarize(folded: &[Message]) -> Message {
        let lines: Vec<String> = folded
            .iter()
            .map(|m| {
                let preview: String = m.content.chars().take(120).collect();
                format!("{}: {}", m.role.as_str(), preview)
            })
            .collect();
        Message::system(format!(
            "[Conversation summary of {} earlier messages]\n{}",
            folded.len(),
            lines.join("\n")
        ))
    }
}

#[async_trait::async_trait]
impl Context for BufferContext {
    async fn append(&self, message: Message) {
        self.messages.write().await.push(message);
    }

    async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    async fn clear(&self) {
        self.messages.write().await.clear();
    }

    async fn should_compact(&self) -> bool {
        match self.compact_threshold {
            Some(threshold) => self.messages.read().await.len() > threshold,
            None => false,
        }
    }

    async fn compact(&self) {
        let mut messages = self.messages.write().await;
        if messages.len() <= self.keep_recent {
            return;
        }

        let split = messages.len() - self.keep_recent;
        let (older, recent) = messages.split_at(split);

        let mut compacted: Vec<Message> = older
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .cloned()
            .collect();
        let folded: Vec<Message> = older
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .cloned()
            .collect();
        if !folded.is_empty() {
            compacted.push(Self::summarize(&folded));
        }
        compacted.extend_from_slice(recent);

        debug!(
            before = messages.len(),
            after = compacted.len(),
            "Compacted context"
        );
        *messages = compacted;
    }
}
