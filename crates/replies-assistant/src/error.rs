use thiserror::Error;

/// Errors that can occur while driving an assistant turn.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The run did not reach a terminal state within the configured poll
    /// budget.
    #[error("run {run_id} on thread {thread_id} timed out after {waited_secs}s")]
    Timeout {
        thread_id: String,
        run_id: String,
        waited_secs: u64,
    },

    /// The run reached a terminal failure state (`failed`/`cancelled`/`expired`).
    #[error("run {run_id} on thread {thread_id} failed: {reason}")]
    RunFailed {
        thread_id: String,
        run_id: String,
        reason: String,
    },

    /// The run completed but no assistant message content could be extracted.
    #[error("assistant response malformed: {0}")]
    ResponseMalformed(String),
}

impl AssistantError {
    pub fn code(&self) -> &'static str {
        match self {
            AssistantError::Http(_) => "AI_HTTP_ERROR",
            AssistantError::Api { .. } => "AI_API_ERROR",
            AssistantError::Parse(_) => "AI_PARSE_ERROR",
            AssistantError::RateLimited { .. } => "AI_RATE_LIMITED",
            AssistantError::Timeout { .. } => "AI_TIMEOUT",
            AssistantError::RunFailed { .. } => "AI_TURN_FAILED",
            AssistantError::ResponseMalformed(_) => "AI_RESPONSE_MALFORMED",
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
