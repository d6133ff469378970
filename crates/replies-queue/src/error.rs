use thiserror::Error;

/// Errors that can occur within the delay-queue subsystem.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("message {id} not found in queue {queue_name}")]
    MessageNotFound { queue_name: String, id: String },
}

impl QueueError {
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::Database(_) => "QUEUE_DATABASE_ERROR",
            QueueError::Serialization(_) => "QUEUE_SERIALIZATION_ERROR",
            QueueError::MessageNotFound { .. } => "QUEUE_MESSAGE_NOT_FOUND",
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
