use replies_core::types::Channel;
use serde::{Deserialize, Serialize};

/// A single inbound message fragment, staged until its burst's batch window
/// elapses. Identity is `(conversation_id, message_sid)` — re-delivery of
/// the same `message_sid` overwrites in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFragment {
    pub conversation_id: String,
    pub message_sid: String,
    pub body: String,
    pub primary_channel: String,
    pub channel: Channel,
    /// When the provider reported (or, absent that, when ingest received) the fragment.
    pub received_at: String,
    pub expires_at: String,
}

/// The "a delayed trigger is already scheduled for this burst" token.
/// Identity is `conversation_id`; at most one live lock per conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerLock {
    pub conversation_id: String,
    pub expires_at: String,
}
