use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Not a failure condition — `LockStore::try_acquire` returning this
    /// means a trigger is already scheduled for the burst; the caller
    /// silently skips scheduling another one.
    #[error("lock already held for conversation {conversation_id}")]
    LockContention { conversation_id: String },
}

impl StageError {
    pub fn code(&self) -> &'static str {
        match self {
            StageError::Database(_) => "STAGE_DATABASE_ERROR",
            StageError::LockContention { .. } => "LOCK_CONTENTION",
        }
    }
}

pub type Result<T> = std::result::Result<T, StageError>;
