use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use replies_assistant::AssistantDriver;
use replies_channels::outbound::OutboundSender;
use replies_channels::types::OutboundReply;
use replies_conversations::types::{Message, Role};
use replies_conversations::ConversationStore;
use replies_core::secrets::SecretResolver;
use replies_core::types::{now_iso8601, Channel, ConversationKey};
use replies_queue::{decode_trigger, QueueConsumer, QueueMessage, TriggerScheduler, VisibilityHeartbeat};
use replies_stage::types::StagedFragment;
use replies_stage::{LockStore, StageStore};

use crate::error::{ProcessingError, Result};
use crate::merger::BatchMerger;

/// Resolves a per-conversation AI credential into a driver ready to run one
/// turn. Indirection over a bare `Arc<dyn AssistantProvider>` lets each
/// conversation's `ai_config.credential_ref` pick a distinct API key
/// without the coordinator caring which provider backs it.
pub trait AssistantDriverFactory: Send + Sync {
    fn build(&self, api_key: &str) -> AssistantDriver;
}

/// Resolves a per-conversation channel credential into a sender ready to
/// deliver one reply.
pub trait ChannelSenderFactory: Send + Sync {
    fn build(&self, channel: Channel, token: &str) -> Arc<dyn OutboundSender>;
}

/// Orchestrates one full reply-processing turn: lease, drain, merge, drive
/// the assistant, send, commit, clean up. Constructed once per worker
/// process and shared across every trigger it handles.
pub struct ProcessingCoordinator {
    stage: Arc<StageStore>,
    locks: Arc<LockStore>,
    conversations: Arc<ConversationStore>,
    trigger_scheduler: Arc<TriggerScheduler>,
    secrets: Arc<dyn SecretResolver>,
    assistant_factory: Arc<dyn AssistantDriverFactory>,
    sender_factory: Arc<dyn ChannelSenderFactory>,
    lease_steal_after_secs: u64,
    heartbeat_interval: Duration,
    visibility_extension: Duration,
}

struct TurnResult {
    merged_sids: Vec<String>,
}

impl ProcessingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage: Arc<StageStore>,
        locks: Arc<LockStore>,
        conversations: Arc<ConversationStore>,
        trigger_scheduler: Arc<TriggerScheduler>,
        secrets: Arc<dyn SecretResolver>,
        assistant_factory: Arc<dyn AssistantDriverFactory>,
        sender_factory: Arc<dyn ChannelSenderFactory>,
        lease_steal_after_secs: u64,
        heartbeat_interval: Duration,
        visibility_extension: Duration,
    ) -> Self {
        Self {
            stage,
            locks,
            conversations,
            trigger_scheduler,
            secrets,
            assistant_factory,
            sender_factory,
            lease_steal_after_secs,
            heartbeat_interval,
            visibility_extension,
        }
    }

    /// Handle one trigger message received from `queue_name`. `channel`
    /// is implied by which per-channel queue the caller is consuming —
    /// the worker loop owns that mapping, so it's passed in rather than
    /// re-derived here.
    ///
    /// Lost-lease races and an already-drained stage are a normal part of
    /// the protocol, not failures: they're logged and the trigger is
    /// acknowledged. Genuine failures leave the trigger un-acknowledged so
    /// it reappears once its visibility timeout lapses, and release the
    /// conversation's lease back to `retry` so the next delivery can pick
    /// it back up.
    #[instrument(skip(self, message), fields(queue_name, conversation_id))]
    pub async fn process(&self, channel: Channel, queue_name: &str, message: QueueMessage) -> Result<()> {
        let key = decode_trigger(&message)?;

        let Some(record) = self.conversations.get_by_key(&key)? else {
            warn!(conversation_id = %key.conversation_id, "trigger for unknown conversation, discarding");
            self.trigger_scheduler
                .queue()
                .delete(queue_name, &message.id)?;
            return Ok(());
        };

        if record.hand_off_to_human {
            info!(conversation_id = %key.conversation_id, "conversation already handed off, routing notification");
            self.trigger_scheduler.notify_handoff(&key)?;
            self.conversations.release_to_handoff(&key)?;
            self.locks.release(&key.conversation_id)?;
            self.trigger_scheduler
                .queue()
                .delete(queue_name, &message.id)?;
            return Ok(());
        }

        if !self
            .conversations
            .try_acquire_lease(&key, self.lease_steal_after_secs)?
        {
            info!(conversation_id = %key.conversation_id, "lease not acquired, discarding trigger");
            self.trigger_scheduler
                .queue()
                .delete(queue_name, &message.id)?;
            return Ok(());
        }

        let heartbeat = VisibilityHeartbeat::spawn(
            self.trigger_scheduler.queue().clone(),
            queue_name.to_string(),
            message.id.clone(),
            self.heartbeat_interval,
            self.visibility_extension,
        );

        let outcome = self.run_turn(channel, &key).await;
        heartbeat.stop().await;

        match outcome {
            Ok(TurnResult { merged_sids }) => {
                self.stage.bulk_delete(&key.conversation_id, &merged_sids)?;
                self.locks.release(&key.conversation_id)?;
                self.trigger_scheduler
                    .queue()
                    .delete(queue_name, &message.id)?;
                Ok(())
            }
            Err(e) => {
                warn!(conversation_id = %key.conversation_id, error = %e, "turn failed, releasing to retry");
                self.conversations.release_to_retry(&key)?;
                Err(e)
            }
        }
    }

    async fn run_turn(&self, channel: Channel, key: &ConversationKey) -> Result<TurnResult> {
        let fragments: Vec<StagedFragment> = self.stage.query(&key.conversation_id)?;
        if fragments.is_empty() {
            return Err(ProcessingError::StageEmpty(key.conversation_id.clone()));
        }
        let merged_sids = BatchMerger::merged_sids(fragments.clone());
        let merged_body = BatchMerger::merge(fragments);

        let record = self
            .conversations
            .get_by_key(key)?
            .ok_or_else(|| ProcessingError::StageEmpty(key.conversation_id.clone()))?;

        let thread_id = record.ai_config.thread_id.clone().ok_or_else(|| {
            ProcessingError::Conversation(replies_conversations::error::ConversationError::NotReady(
                key.conversation_id.clone(),
            ))
        })?;

        let ai_api_key = self
            .secrets
            .resolve(&record.ai_config.credential_ref)
            .map_err(|e| ProcessingError::CredentialResolution(e.to_string()))?;
        let channel_token = self
            .secrets
            .resolve(&record.channel_config.credential_ref)
            .map_err(|e| ProcessingError::CredentialResolution(e.to_string()))?;

        let driver = self.assistant_factory.build(&ai_api_key);
        let turn = driver
            .run_turn(&thread_id, &record.ai_config.assistant_id, &merged_body)
            .await?;

        let reply = OutboundReply {
            channel,
            to_identifier: key.primary_channel.clone(),
            from_identifier: record.channel_config.company_identifier.clone(),
            body: turn.reply_text.clone(),
        };

        self.conversations
            .record_send_intent(key, &payload_hash(&reply.body))?;

        let sender = self.sender_factory.build(channel, &channel_token);
        let provider_message_id = sender.send(&reply).await?;

        let now = now_iso8601();
        let user_message = Message {
            role: Role::User,
            content: merged_body,
            timestamp: now.clone(),
            token_count: None,
            message_sids: merged_sids.clone(),
        };
        let assistant_message = Message {
            role: Role::Assistant,
            content: turn.reply_text,
            timestamp: now,
            token_count: Some(turn.total_tokens),
            message_sids: vec![provider_message_id],
        };

        self.conversations.commit_turn(
            key,
            user_message,
            assistant_message,
            turn.total_tokens as u64,
        )?;

        Ok(TurnResult { merged_sids })
    }
}

fn payload_hash(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use replies_assistant::provider::AssistantProvider;
    use replies_assistant::types::{AssistantMessage, Run, RunStatus};
    use replies_channels::error::Result as ChannelResult;
    use replies_conversations::types::{AiConfig, ChannelConfig, ConversationRecord, ConversationStatus};
    use replies_core::secrets::{SecretRef, StaticSecretResolver};
    use rusqlite::Connection;
    use std::sync::Mutex as StdMutex;

    struct StubProvider {
        reply_json: String,
    }

    #[async_trait]
    impl AssistantProvider for StubProvider {
        async fn append_message(&self, _thread_id: &str, _content: &str) -> replies_assistant::error::Result<()> {
            Ok(())
        }
        async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> replies_assistant::error::Result<Run> {
            Ok(Run {
                id: "run_1".to_string(),
                thread_id: thread_id.to_string(),
                status: RunStatus::Completed,
                last_error: None,
                usage_total_tokens: Some(42),
            })
        }
        async fn get_run(&self, thread_id: &str, run_id: &str) -> replies_assistant::error::Result<Run> {
            Ok(Run {
                id: run_id.to_string(),
                thread_id: thread_id.to_string(),
                status: RunStatus::Completed,
                last_error: None,
                usage_total_tokens: Some(42),
            })
        }
        async fn list_messages(&self, _thread_id: &str) -> replies_assistant::error::Result<Vec<AssistantMessage>> {
            Ok(vec![AssistantMessage {
                id: "msg_1".to_string(),
                role: "assistant".to_string(),
                content: self.reply_json.clone(),
            }])
        }
        async fn cancel_run(&self, _thread_id: &str, _run_id: &str) -> replies_assistant::error::Result<()> {
            Ok(())
        }
    }

    struct StubDriverFactory {
        reply_json: String,
    }

    impl AssistantDriverFactory for StubDriverFactory {
        fn build(&self, _api_key: &str) -> AssistantDriver {
            AssistantDriver::new(
                Arc::new(StubProvider { reply_json: self.reply_json.clone() }),
                Duration::from_secs(5),
            )
        }
    }

    struct StubSender {
        sent: Arc<StdMutex<Vec<OutboundReply>>>,
    }

    #[async_trait]
    impl OutboundSender for StubSender {
        async fn send(&self, reply: &OutboundReply) -> ChannelResult<String> {
            self.sent.lock().unwrap().push(reply.clone());
            Ok("provider-msg-1".to_string())
        }
    }

    struct StubSenderFactory {
        sent: Arc<StdMutex<Vec<OutboundReply>>>,
    }

    impl ChannelSenderFactory for StubSenderFactory {
        fn build(&self, _channel: Channel, _token: &str) -> Arc<dyn OutboundSender> {
            Arc::new(StubSender { sent: self.sent.clone() })
        }
    }

    fn seeded_record() -> ConversationRecord {
        let now = now_iso8601();
        ConversationRecord {
            primary_channel: "+15551234567".to_string(),
            conversation_id: "conv-1".to_string(),
            messages: vec![],
            conversation_status: ConversationStatus::TemplateSent,
            channel_config: ChannelConfig {
                company_identifier: "acme-co".to_string(),
                credential_ref: SecretRef::new("whatsapp-shared-secret"),
            },
            ai_config: AiConfig {
                credential_ref: SecretRef::new("openai-key"),
                assistant_id: "asst_1".to_string(),
                thread_id: Some("thread_1".to_string()),
            },
            hand_off_to_human: false,
            total_tokens: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    struct Harness {
        coordinator: ProcessingCoordinator,
        stage: Arc<StageStore>,
        conversations: Arc<ConversationStore>,
        trigger_scheduler: Arc<TriggerScheduler>,
        sent: Arc<StdMutex<Vec<OutboundReply>>>,
    }

    fn harness(reply_json: &str) -> Harness {
        let stage_conn = Connection::open_in_memory().unwrap();
        replies_stage::db::init_db(&stage_conn).unwrap();
        let stage = Arc::new(StageStore::new(stage_conn));

        let lock_conn = Connection::open_in_memory().unwrap();
        replies_stage::db::init_db(&lock_conn).unwrap();
        let locks = Arc::new(LockStore::new(lock_conn));

        let conversations =
            Arc::new(ConversationStore::new(Connection::open_in_memory().unwrap()).unwrap());

        let queue = Arc::new(replies_queue::SqliteQueue::new(Connection::open_in_memory().unwrap()).unwrap());
        let trigger_scheduler = Arc::new(TriggerScheduler::new(
            queue,
            "whatsapp-triggers",
            "sms-triggers",
            "email-triggers",
            "handoff-notifications",
        ));

        let mut secret_values = std::collections::HashMap::new();
        secret_values.insert("openai-key".to_string(), "sk-test".to_string());
        secret_values.insert("whatsapp-shared-secret".to_string(), "tok".to_string());
        let secrets = Arc::new(StaticSecretResolver::new(secret_values));

        let sent = Arc::new(StdMutex::new(Vec::new()));
        let coordinator = ProcessingCoordinator::new(
            stage.clone(),
            locks,
            conversations.clone(),
            trigger_scheduler.clone(),
            secrets,
            Arc::new(StubDriverFactory { reply_json: reply_json.to_string() }),
            Arc::new(StubSenderFactory { sent: sent.clone() }),
            1200,
            Duration::from_secs(300),
            Duration::from_secs(600),
        );

        Harness { coordinator, stage, conversations, trigger_scheduler, sent }
    }

    #[test]
    fn payload_hash_is_stable_for_same_input() {
        assert_eq!(payload_hash("hello"), payload_hash("hello"));
        assert_ne!(payload_hash("hello"), payload_hash("world"));
    }

    #[tokio::test]
    async fn happy_path_drains_stage_sends_and_commits() {
        let h = harness(r#"{"content": "hi there"}"#);
        h.conversations.insert(&seeded_record()).unwrap();
        h.stage
            .put(&StageStore::fragment_with_ttl(
                "conv-1",
                "SM1",
                "hello",
                "+15551234567",
                Channel::WhatsApp,
                chrono::Utc::now(),
                60,
            ))
            .unwrap();

        let key = ConversationKey::new("+15551234567", "conv-1");
        let trigger_id = h
            .trigger_scheduler
            .schedule_trigger(Channel::WhatsApp, &key, 0)
            .unwrap();
        let message = h
            .trigger_scheduler
            .queue()
            .receive("whatsapp-triggers", 300, 5)
            .unwrap()
            .unwrap();
        assert_eq!(message.id, trigger_id);

        h.coordinator
            .process(Channel::WhatsApp, "whatsapp-triggers", message)
            .await
            .unwrap();

        assert!(h.stage.query("conv-1").unwrap().is_empty());
        assert_eq!(h.sent.lock().unwrap().len(), 1);
        assert_eq!(h.sent.lock().unwrap()[0].body, "hi there");

        let record = h.conversations.get_by_key(&key).unwrap().unwrap();
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.conversation_status, ConversationStatus::ReplySent);
        assert_eq!(record.total_tokens, 42);
    }

    #[tokio::test]
    async fn empty_stage_releases_lease_to_retry_and_leaves_trigger_in_place() {
        let h = harness(r#"{"content": "unused"}"#);
        h.conversations.insert(&seeded_record()).unwrap();

        let key = ConversationKey::new("+15551234567", "conv-1");
        h.trigger_scheduler
            .schedule_trigger(Channel::WhatsApp, &key, 0)
            .unwrap();
        let message = h
            .trigger_scheduler
            .queue()
            .receive("whatsapp-triggers", 300, 5)
            .unwrap()
            .unwrap();

        let err = h
            .coordinator
            .process(Channel::WhatsApp, "whatsapp-triggers", message)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STAGE_EMPTY");

        let record = h.conversations.get_by_key(&key).unwrap().unwrap();
        assert_eq!(record.conversation_status, ConversationStatus::Retry);
    }

    #[tokio::test]
    async fn handed_off_conversation_routes_to_handoff_queue_without_ai_turn() {
        let h = harness(r#"{"content": "unused"}"#);
        let mut record = seeded_record();
        record.hand_off_to_human = true;
        h.conversations.insert(&record).unwrap();
        h.stage
            .put(&StageStore::fragment_with_ttl(
                "conv-1",
                "SM1",
                "hello",
                "+15551234567",
                Channel::WhatsApp,
                chrono::Utc::now(),
                60,
            ))
            .unwrap();

        let key = ConversationKey::new("+15551234567", "conv-1");
        h.trigger_scheduler
            .schedule_trigger(Channel::WhatsApp, &key, 0)
            .unwrap();
        let message = h
            .trigger_scheduler
            .queue()
            .receive("whatsapp-triggers", 300, 5)
            .unwrap()
            .unwrap();

        h.coordinator
            .process(Channel::WhatsApp, "whatsapp-triggers", message)
            .await
            .unwrap();

        assert!(h.sent.lock().unwrap().is_empty());
        let handoff = h
            .trigger_scheduler
            .queue()
            .receive("handoff-notifications", 60, 5)
            .unwrap();
        assert!(handoff.is_some());
    }
}
