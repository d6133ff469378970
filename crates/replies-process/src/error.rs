use thiserror::Error;

/// Errors that can occur while orchestrating a reply-processing turn.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("stage error: {0}")]
    Stage(#[from] replies_stage::error::StageError),

    #[error("conversation error: {0}")]
    Conversation(#[from] replies_conversations::error::ConversationError),

    #[error("queue error: {0}")]
    Queue(#[from] replies_queue::QueueError),

    #[error("channel error: {0}")]
    Channel(#[from] replies_channels::ChannelError),

    #[error("assistant error: {0}")]
    Assistant(#[from] replies_assistant::AssistantError),

    /// The trigger fired but the stage had nothing left to merge (another
    /// processor already drained it, or it expired before this run).
    #[error("stage empty for conversation {0}")]
    StageEmpty(String),

    /// Secret lookup failed while fetching AI or channel credentials for a
    /// leased conversation.
    #[error("credential resolution failed: {0}")]
    CredentialResolution(String),
}

impl ProcessingError {
    pub fn code(&self) -> &'static str {
        match self {
            ProcessingError::Stage(e) => e.code(),
            ProcessingError::Conversation(e) => e.code(),
            ProcessingError::Queue(e) => e.code(),
            ProcessingError::Channel(e) => e.code(),
            ProcessingError::Assistant(e) => e.code(),
            ProcessingError::StageEmpty(_) => "STAGE_EMPTY",
            ProcessingError::CredentialResolution(_) => "CREDENTIAL_RESOLUTION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
