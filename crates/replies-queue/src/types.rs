use serde::{Deserialize, Serialize};

/// A delayed trigger message in flight on one of the per-channel queues.
///
/// `payload` is the JSON-encoded `ConversationKey` the trigger is for.
/// `receive_count` tracks delivery attempts for the dead-letter threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub queue_name: String,
    pub payload: String,
    /// ISO-8601 instant the message becomes eligible for `receive` again.
    pub visible_at: String,
    pub receive_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// A message moved to the dead-letter table after exceeding
/// `max_receive_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub queue_name: String,
    pub payload: String,
    pub receive_count: u32,
    pub moved_at: String,
}
