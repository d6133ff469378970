use thiserror::Error;

/// Errors that can occur while verifying, parsing, or sending through a
/// channel adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The provider rejected the send outright (4xx other than 429) —
    /// retrying with the same body will never succeed.
    #[error("send rejected permanently: {0}")]
    SendRejected(String),

    /// A transient failure (network error, 5xx, 429) — the caller may
    /// retry after a backoff.
    #[error("send failed transiently: {0}")]
    SendTransient(String),

    #[error("send retries exhausted after {attempts} attempts: {last_error}")]
    SendRetriesExhausted { attempts: u32, last_error: String },
}

impl ChannelError {
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::SignatureInvalid(_) => "CHANNEL_SIGNATURE_INVALID",
            ChannelError::MalformedPayload(_) => "CHANNEL_MALFORMED_PAYLOAD",
            ChannelError::SendRejected(_) => "CHANNEL_SEND_REJECTED",
            ChannelError::SendTransient(_) => "CHANNEL_SEND_TRANSIENT",
            ChannelError::SendRetriesExhausted { .. } => "CHANNEL_SEND_RETRIES_EXHAUSTED",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
