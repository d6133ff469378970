use std::sync::Arc;

use replies_core::types::{Channel, ConversationKey};
use tracing::instrument;

use crate::error::Result;
use crate::queue::{QueueConsumer, QueueProducer, SqliteQueue};
use crate::types::QueueMessage;

/// Routes `ConversationKey` triggers onto the per-channel delay queue named
/// for that channel, and decodes them back out on receive.
///
/// This is the seam `IngestCoordinator` and the worker loop actually talk
/// to — neither needs to know the trigger body is JSON under the hood.
pub struct TriggerScheduler {
    queue: Arc<SqliteQueue>,
    whatsapp_queue: String,
    sms_queue: String,
    email_queue: String,
    handoff_queue: String,
}

impl TriggerScheduler {
    pub fn new(
        queue: Arc<SqliteQueue>,
        whatsapp_queue: impl Into<String>,
        sms_queue: impl Into<String>,
        email_queue: impl Into<String>,
        handoff_queue: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            whatsapp_queue: whatsapp_queue.into(),
            sms_queue: sms_queue.into(),
            email_queue: email_queue.into(),
            handoff_queue: handoff_queue.into(),
        }
    }

    pub fn queue_name_for(&self, channel: Channel) -> &str {
        match channel {
            Channel::WhatsApp => &self.whatsapp_queue,
            Channel::Sms => &self.sms_queue,
            Channel::Email => &self.email_queue,
        }
    }

    pub fn handoff_queue_name(&self) -> &str {
        &self.handoff_queue
    }

    /// Schedule a reply-processing trigger for `key`, becoming visible
    /// after `delay_secs` (the remainder of the batch window).
    #[instrument(skip(self))]
    pub fn schedule_trigger(
        &self,
        channel: Channel,
        key: &ConversationKey,
        delay_secs: u64,
    ) -> Result<String> {
        let payload = serde_json::to_string(key)?;
        self.queue
            .enqueue(self.queue_name_for(channel), &payload, delay_secs)
    }

    /// Notify the handoff queue that a conversation now requires a human —
    /// fired immediately, no delay.
    pub fn notify_handoff(&self, key: &ConversationKey) -> Result<String> {
        let payload = serde_json::to_string(key)?;
        self.queue.enqueue(&self.handoff_queue, &payload, 0)
    }

    pub fn queue(&self) -> &Arc<SqliteQueue> {
        &self.queue
    }
}

/// Decode a `QueueMessage`'s payload back into the `ConversationKey` it
/// carries. Lives alongside `TriggerScheduler` since every queue consumer
/// in this codebase only ever enqueues conversation-key payloads.
pub fn decode_trigger(message: &QueueMessage) -> Result<ConversationKey> {
    Ok(serde_json::from_str(&message.payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn scheduler() -> TriggerScheduler {
        let queue = Arc::new(SqliteQueue::new(Connection::open_in_memory().unwrap()).unwrap());
        TriggerScheduler::new(
            queue,
            "whatsapp-triggers",
            "sms-triggers",
            "email-triggers",
            "handoff-notifications",
        )
    }

    #[test]
    fn schedule_and_receive_round_trips_the_key() {
        let scheduler = scheduler();
        let key = ConversationKey::new("+15551234567", "conv-1");
        scheduler
            .schedule_trigger(Channel::WhatsApp, &key, 0)
            .unwrap();

        let msg = scheduler
            .queue()
            .receive("whatsapp-triggers", 60, 5)
            .unwrap()
            .unwrap();
        let decoded = decode_trigger(&msg).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn handoff_notifications_land_on_their_own_queue() {
        let scheduler = scheduler();
        let key = ConversationKey::new("+15551234567", "conv-1");
        scheduler.notify_handoff(&key).unwrap();

        assert!(scheduler
            .queue()
            .receive("whatsapp-triggers", 60, 5)
            .unwrap()
            .is_none());
        let msg = scheduler
            .queue()
            .receive("handoff-notifications", 60, 5)
            .unwrap()
            .unwrap();
        assert_eq!(decode_trigger(&msg).unwrap(), key);
    }
}
