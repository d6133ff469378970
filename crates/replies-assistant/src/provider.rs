use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AssistantMessage, Run};

/// Common interface for an assistant backend driven through a
/// thread-and-run lifecycle: append a user message to an
/// existing thread, start a run, poll it, and read back the messages the
/// run produced.
///
/// Thread creation is out of scope here — a `ConversationRecord`'s
/// `ai_config.thread_id` is seeded by the outbound engine before reply
/// processing ever sees the conversation.
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    async fn append_message(&self, thread_id: &str, content: &str) -> Result<()>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<AssistantMessage>>;

    /// Best-effort cancellation, used when a run exceeds its poll budget.
    /// Implementations should treat a failure here as non-fatal — the
    /// caller has already decided to time the turn out regardless.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;
}
