use std::collections::HashMap;
use std::sync::Mutex;

use replies_core::types::ConversationKey;

use crate::error::{ConversationError, Result};
use crate::store::ConversationStore;

/// Maximum cached identifier mappings before the oldest is evicted.
const MAX_CACHE_ENTRIES: usize = 4096;

/// Resolves an inbound webhook's `(company_identifier, user_identifier)`
/// pair to the `ConversationKey` that owns it, caching the mapping so the
/// ingest hot path doesn't hit the secondary index on every fragment.
///
/// The cache only ever stores the identity mapping, never the record
/// itself — conversation state still comes from `ConversationStore` on
/// every read, so staleness here only costs an extra index lookup, never a
/// stale status or message list.
pub struct ConversationResolver {
    store: std::sync::Arc<ConversationStore>,
    cache: Mutex<HashMap<(String, String), ConversationKey>>,
    cache_order: Mutex<Vec<(String, String)>>,
}

impl ConversationResolver {
    pub fn new(store: std::sync::Arc<ConversationStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(Vec::new()),
        }
    }

    /// Resolve `(company_identifier, user_identifier)` to the conversation's
    /// key. Returns `ConversationError::NotFound` if no conversation has
    /// been seeded for this pair yet — reply processing never creates
    /// conversations, only the outbound engine does.
    pub fn resolve(
        &self,
        company_identifier: &str,
        user_identifier: &str,
    ) -> Result<ConversationKey> {
        let cache_key = (company_identifier.to_string(), user_identifier.to_string());

        if let Some(key) = self.cache.lock().unwrap().get(&cache_key).cloned() {
            return Ok(key);
        }

        let record = self
            .store
            .get_by_identifiers(company_identifier, user_identifier)?
            .ok_or_else(|| ConversationError::NotFound {
                company_identifier: company_identifier.to_string(),
                user_identifier: user_identifier.to_string(),
            })?;

        let key = ConversationKey::new(record.primary_channel, record.conversation_id);
        self.insert_cache(cache_key, key.clone());
        Ok(key)
    }

    fn insert_cache(&self, cache_key: (String, String), value: ConversationKey) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();

        if cache.len() >= MAX_CACHE_ENTRIES && !cache.contains_key(&cache_key) {
            if let Some(oldest) = order.first().cloned() {
                cache.remove(&oldest);
                order.retain(|k| k != &oldest);
            }
        }

        cache.insert(cache_key.clone(), value);
        order.push(cache_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AiConfig, ChannelConfig, ConversationRecord, ConversationStatus};
    use chrono::Utc;
    use replies_core::secrets::SecretRef;
    use rusqlite::Connection;
    use std::sync::Arc;

    fn seeded_resolver() -> ConversationResolver {
        let store = Arc::new(ConversationStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let now = Utc::now().to_rfc3339();
        store
            .insert(&ConversationRecord {
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
                    assistant_id: "asst_123".to_string(),
                    thread_id: Some("thread_123".to_string()),
                },
                hand_off_to_human: false,
                total_tokens: 0,
                created_at: now.clone(),
                updated_at: now,
            })
            .unwrap();
        ConversationResolver::new(store)
    }

    #[test]
    fn resolves_seeded_conversation() {
        let resolver = seeded_resolver();
        let key = resolver.resolve("acme-co", "+15551234567").unwrap();
        assert_eq!(key.conversation_id, "conv-1");
    }

    #[test]
    fn cache_hit_avoids_repeat_lookup_cost_but_still_correct() {
        let resolver = seeded_resolver();
        let first = resolver.resolve("acme-co", "+15551234567").unwrap();
        let second = resolver.resolve("acme-co", "+15551234567").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_pair_is_not_found() {
        let resolver = seeded_resolver();
        let err = resolver.resolve("acme-co", "+19998887777").unwrap_err();
        assert!(matches!(err, ConversationError::NotFound { .. }));
    }
}
