use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("conversation not found for identifiers ({company_identifier}, {user_identifier})")]
    NotFound {
        company_identifier: String,
        user_identifier: String,
    },

    #[error("conversation {0} not found")]
    NotFoundById(String),

    /// Not a failure condition on its own — the caller silently consumes
    /// the trigger.
    #[error("lease already held for conversation {0}")]
    LeaseContention(String),

    #[error("conversation {0} is not ready for processing (missing thread_id or handed off)")]
    NotReady(String),
}

impl ConversationError {
    pub fn code(&self) -> &'static str {
        match self {
            ConversationError::Database(_) => "CONVERSATION_DATABASE_ERROR",
            ConversationError::Serialization(_) => "CONVERSATION_SERIALIZATION_ERROR",
            ConversationError::NotFound { .. } => "CONVERSATION_NOT_FOUND",
            ConversationError::NotFoundById(_) => "CONVERSATION_NOT_FOUND",
            ConversationError::LeaseContention(_) => "LEASE_CONTENTION",
            ConversationError::NotReady(_) => "CONVERSATION_NOT_READY",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConversationError>;
