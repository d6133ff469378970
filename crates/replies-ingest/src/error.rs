use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("channel error: {0}")]
    Channel(#[from] replies_channels::ChannelError),

    #[error("conversation error: {0}")]
    Conversation(#[from] replies_conversations::error::ConversationError),

    #[error("stage error: {0}")]
    Stage(#[from] replies_stage::error::StageError),

    #[error("queue error: {0}")]
    Queue(#[from] replies_queue::QueueError),

    #[error("secret resolution failed: {0}")]
    SecretResolution(String),

    #[error("unknown channel path segment: {0}")]
    UnknownChannel(String),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Channel(e) => e.code(),
            IngestError::Conversation(e) => e.code(),
            IngestError::Stage(e) => e.code(),
            IngestError::Queue(e) => e.code(),
            IngestError::SecretResolution(_) => "SECRET_RESOLUTION_ERROR",
            IngestError::UnknownChannel(_) => "UNKNOWN_CHANNEL",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
