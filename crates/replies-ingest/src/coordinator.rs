use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use replies_channels::{parse_form_urlencoded, sorted_params, PayloadAdapter, SignatureVerifier};
use replies_conversations::ConversationResolver;
use replies_core::config::WebhookConfig;
use replies_core::secrets::{SecretRef, SecretResolver};
use replies_core::types::Channel;
use replies_queue::TriggerScheduler;
use replies_stage::{LockStore, StageStore};

use crate::error::{IngestError, Result};

/// Orchestrates one inbound webhook request end to end: authenticate, parse,
/// resolve, stage, and schedule exactly one trigger per burst.
///
/// Every exit path returns an empty provider-compliant ack — callers that
/// need to distinguish "staged" from "rejected" should inspect the `Result`
/// for logging, never for deciding what to send back over HTTP.
pub struct IngestCoordinator {
    stage: Arc<StageStore>,
    locks: Arc<LockStore>,
    resolver: Arc<ConversationResolver>,
    secrets: Arc<dyn SecretResolver>,
    trigger_scheduler: Arc<TriggerScheduler>,
    adapters: HashMap<Channel, Arc<dyn PayloadAdapter>>,
    webhooks: WebhookConfig,
    lock_ttl_seconds: u64,
    batch_window_seconds: u64,
}

impl IngestCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage: Arc<StageStore>,
        locks: Arc<LockStore>,
        resolver: Arc<ConversationResolver>,
        secrets: Arc<dyn SecretResolver>,
        trigger_scheduler: Arc<TriggerScheduler>,
        adapters: Vec<Arc<dyn PayloadAdapter>>,
        webhooks: WebhookConfig,
        lock_ttl_seconds: u64,
        batch_window_seconds: u64,
    ) -> Self {
        let adapters = adapters.into_iter().map(|a| (a.channel(), a)).collect();
        Self {
            stage,
            locks,
            resolver,
            secrets,
            trigger_scheduler,
            adapters,
            webhooks,
            lock_ttl_seconds,
            batch_window_seconds,
        }
    }

    #[instrument(skip(self, body), fields(channel = %channel))]
    pub fn ingest(&self, channel: Channel, url: &str, body: &str, signature: Option<&str>) -> Result<()> {
        let adapter = self
            .adapters
            .get(&channel)
            .ok_or_else(|| IngestError::UnknownChannel(channel.to_string()))?;

        let fragment = adapter.parse(body)?;

        let key = self
            .resolver
            .resolve(&fragment.to_identifier, &fragment.from_identifier)?;

        let secret_ref = SecretRef::new(self.webhooks.secret_id_for(channel));
        let secret = self
            .secrets
            .resolve(&secret_ref)
            .map_err(|e| IngestError::SecretResolution(e.to_string()))?;

        let signature = signature.ok_or_else(|| {
            replies_channels::ChannelError::SignatureInvalid("missing signature header".to_string())
        })?;
        let verifier = SignatureVerifier::new(secret);
        match channel {
            Channel::WhatsApp | Channel::Sms => {
                let params = sorted_params(parse_form_urlencoded(body));
                verifier.verify(url, &params, signature)?;
            }
            Channel::Email => {
                verifier.verify_raw(url, body, signature)?;
            }
        }

        let staged = StageStore::fragment_with_ttl(
            key.conversation_id.clone(),
            fragment.message_sid.clone(),
            fragment.body,
            key.primary_channel.clone(),
            channel,
            Utc::now(),
            self.lock_ttl_seconds,
        );
        self.stage.put(&staged)?;

        if self.locks.try_acquire(&key.conversation_id, self.lock_ttl_seconds)? {
            self.trigger_scheduler
                .schedule_trigger(channel, &key, self.batch_window_seconds)?;
            info!(conversation_id = %key.conversation_id, "trigger scheduled for burst");
        } else {
            info!(conversation_id = %key.conversation_id, "burst already has a scheduled trigger");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replies_channels::{EmailAdapter, SmsAdapter, WhatsAppAdapter};
    use replies_conversations::types::{AiConfig, ChannelConfig, ConversationRecord, ConversationStatus};
    use replies_conversations::ConversationStore;
    use replies_core::secrets::StaticSecretResolver;
    use rusqlite::Connection;
    use std::collections::HashMap as StdHashMap;

    fn coordinator() -> (IngestCoordinator, Arc<ConversationStore>) {
        let conv_store = Arc::new(ConversationStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let now = Utc::now().to_rfc3339();
        conv_store
            .insert(&ConversationRecord {
                primary_channel: "+15551234567".to_string(),
                conversation_id: "conv-1".to_string(),
                messages: vec![],
                conversation_status: ConversationStatus::TemplateSent,
                channel_config: ChannelConfig {
                    // business number the webhook `To` field carries below
                    company_identifier: "+1800".to_string(),
                    credential_ref: replies_core::secrets::SecretRef::new("whatsapp-shared-secret"),
                },
                ai_config: AiConfig {
                    credential_ref: replies_core::secrets::SecretRef::new("openai-key"),
                    assistant_id: "asst_123".to_string(),
                    thread_id: Some("thread_123".to_string()),
                },
                hand_off_to_human: false,
                total_tokens: 0,
                created_at: now.clone(),
                updated_at: now,
            })
            .unwrap();

        let stage_conn = Connection::open_in_memory().unwrap();
        replies_stage::db::init_db(&stage_conn).unwrap();
        let stage = Arc::new(StageStore::new(stage_conn));
        let lock_conn = Connection::open_in_memory().unwrap();
        replies_stage::db::init_db(&lock_conn).unwrap();
        let locks = Arc::new(LockStore::new(lock_conn));

        let queue = Arc::new(replies_queue::SqliteQueue::new(Connection::open_in_memory().unwrap()).unwrap());
        let trigger_scheduler = Arc::new(TriggerScheduler::new(
            queue,
            "whatsapp-triggers",
            "sms-triggers",
            "email-triggers",
            "handoff-notifications",
        ));

        let mut secrets = StdHashMap::new();
        secrets.insert("whatsapp-shared-secret".to_string(), "s3cr3t".to_string());
        secrets.insert("email-shared-secret".to_string(), "s3cr3t".to_string());
        let secrets = Arc::new(StaticSecretResolver::new(secrets));

        let resolver = Arc::new(ConversationResolver::new(conv_store.clone()));

        let coordinator = IngestCoordinator::new(
            stage,
            locks,
            resolver,
            secrets,
            trigger_scheduler,
            vec![Arc::new(WhatsAppAdapter), Arc::new(SmsAdapter), Arc::new(EmailAdapter)],
            WebhookConfig::default(),
            40,
            10,
        );
        (coordinator, conv_store)
    }

    fn sign(secret: &str, url: &str, params: &[(String, String)]) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        let mut canonical = url.to_string();
        for (k, v) in params {
            canonical.push_str(k);
            canonical.push_str(v);
        }
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_whatsapp_webhook_stages_and_schedules_trigger() {
        let (coordinator, _store) = coordinator();
        let url = "https://ingest.example.com/whatsapp";
        let params = sorted_params(vec![
            ("MessageSid".to_string(), "SM1".to_string()),
            ("From".to_string(), "whatsapp:+15551234567".to_string()),
            ("To".to_string(), "whatsapp:+1800".to_string()),
            ("Body".to_string(), "hello".to_string()),
        ]);
        let sig = sign("s3cr3t", url, &params);
        let body = "MessageSid=SM1&From=whatsapp%3A%2B15551234567&To=whatsapp%3A%2B1800&Body=hello";

        coordinator
            .ingest(Channel::WhatsApp, url, body, Some(&sig))
            .unwrap();

        assert_eq!(coordinator.stage.query("conv-1").unwrap().len(), 1);
        assert!(
            !coordinator.locks.try_acquire("conv-1", 40).unwrap(),
            "ingest should have already acquired the trigger lock for this burst"
        );
    }

    #[test]
    fn bad_signature_is_rejected_without_staging() {
        let (coordinator, _store) = coordinator();
        let url = "https://ingest.example.com/whatsapp";
        let body = "MessageSid=SM1&From=whatsapp%3A%2B15551234567&To=whatsapp%3A%2B1800&Body=hello";

        let err = coordinator
            .ingest(Channel::WhatsApp, url, body, Some("deadbeef"))
            .unwrap_err();
        assert!(matches!(err, IngestError::Channel(_)));
        assert!(coordinator.stage.query("conv-1").unwrap().is_empty());
    }

    #[test]
    fn unknown_conversation_is_not_found_without_staging() {
        let (coordinator, _store) = coordinator();
        let url = "https://ingest.example.com/whatsapp";
        let params = sorted_params(vec![
            ("MessageSid".to_string(), "SM1".to_string()),
            ("From".to_string(), "whatsapp:+19998887777".to_string()),
            ("To".to_string(), "whatsapp:+1800".to_string()),
            ("Body".to_string(), "hello".to_string()),
        ]);
        let sig = sign("s3cr3t", url, &params);
        let body = "MessageSid=SM1&From=whatsapp%3A%2B19998887777&To=whatsapp%3A%2B1800&Body=hello";

        let err = coordinator
            .ingest(Channel::WhatsApp, url, body, Some(&sig))
            .unwrap_err();
        assert!(matches!(err, IngestError::Conversation(_)));
    }

    #[test]
    fn second_fragment_in_window_finds_trigger_already_scheduled() {
        let (coordinator, _store) = coordinator();
        let url = "https://ingest.example.com/whatsapp";

        for sid in ["SM1", "SM2"] {
            let params = sorted_params(vec![
                ("MessageSid".to_string(), sid.to_string()),
                ("From".to_string(), "whatsapp:+15551234567".to_string()),
                ("To".to_string(), "whatsapp:+1800".to_string()),
                ("Body".to_string(), "hi".to_string()),
            ]);
            let sig = sign("s3cr3t", url, &params);
            let body = format!(
                "MessageSid={sid}&From=whatsapp%3A%2B15551234567&To=whatsapp%3A%2B1800&Body=hi"
            );
            coordinator
                .ingest(Channel::WhatsApp, url, &body, Some(&sig))
                .unwrap();
        }

        let fragments = coordinator.stage.query("conv-1").unwrap();
        assert_eq!(fragments.len(), 2);
    }
}
