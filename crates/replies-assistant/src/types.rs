use serde::{Deserialize, Serialize};

/// Lifecycle state of an assistant run, mirroring the OpenAI Assistants API
/// thread-run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
    Expired,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired
        )
    }
}

/// A run handle returned by `create_run`/`get_run`.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    pub last_error: Option<String>,
    pub usage_total_tokens: Option<u32>,
}

/// A message on an assistant thread, as returned by `list_messages`.
#[derive(Debug, Clone)]
pub struct AssistantMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}
