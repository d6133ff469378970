use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use replies_core::types::ConversationKey;

use crate::error::{ConversationError, Result};
use crate::types::{ConversationRecord, ConversationStatus, Message};

/// Durable store for `ConversationRecord`s: identity lookup, the secondary
/// `(company_identifier, user_identifier)` index, the processing lease, and
/// the atomic turn commit.
pub struct ConversationStore {
    db: Mutex<Connection>,
}

impl ConversationStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn get_by_key(&self, key: &ConversationKey) -> Result<Option<ConversationRecord>> {
        let db = self.db.lock().unwrap();
        row_by_key(&db, key)
    }

    /// Secondary lookup used by `ConversationResolver` to turn an inbound
    /// webhook's `(company_identifier, user_identifier)` pair into a key.
    pub fn get_by_identifiers(
        &self,
        company_identifier: &str,
        user_identifier: &str,
    ) -> Result<Option<ConversationRecord>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT primary_channel, conversation_id, messages_json, status,
                    channel_config_json, ai_config_json, hand_off_to_human,
                    total_tokens, created_at, updated_at
             FROM conversations
             WHERE company_identifier = ?1 AND primary_channel = ?2",
            params![company_identifier, user_identifier],
            row_to_record,
        )
        .optional()
        .map_err(ConversationError::from)
    }

    /// Seed a new conversation record (used by tests and by the outbound
    /// engine's integration point).
    pub fn insert(&self, record: &ConversationRecord) -> Result<()> {
        let db = self.db.lock().unwrap();
        insert_record(&db, record)
    }

    /// Attempt to acquire the processing lease for `key` by flipping
    /// `conversation_status` from a processable state to `processing_reply`.
    /// Returns `Ok(true)` if the lease was acquired.
    ///
    /// A lease already held by a dead processor is stolen once its
    /// `updated_at` is older than `lease_steal_after_secs`.
    pub fn try_acquire_lease(
        &self,
        key: &ConversationKey,
        lease_steal_after_secs: u64,
    ) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let current = row_by_key(&db, key)?
            .ok_or_else(|| ConversationError::NotFoundById(key.to_string()))?;

        if current.hand_off_to_human {
            return Ok(false);
        }

        let acquirable = match current.conversation_status {
            ConversationStatus::TemplateSent
            | ConversationStatus::Retry
            | ConversationStatus::ReplySent => true,
            ConversationStatus::ProcessingReply => {
                let updated_at: DateTime<Utc> = current
                    .updated_at
                    .parse()
                    .unwrap_or(now);
                let stale = now.signed_duration_since(updated_at).num_seconds()
                    >= lease_steal_after_secs as i64;
                if stale {
                    warn!(
                        conversation_id = %key.conversation_id,
                        primary_channel = %key.primary_channel,
                        "stealing processing lease from stale owner"
                    );
                }
                stale
            }
            ConversationStatus::HandoffRequired => false,
        };

        if !acquirable {
            debug!(
                conversation_id = %key.conversation_id,
                status = current.conversation_status.as_str(),
                "lease not acquirable"
            );
            return Ok(false);
        }

        let rows = db.execute(
            "UPDATE conversations SET status = ?1, updated_at = ?2
             WHERE primary_channel = ?3 AND conversation_id = ?4
               AND status = ?5",
            params![
                ConversationStatus::ProcessingReply.as_str(),
                now_str,
                key.primary_channel,
                key.conversation_id,
                current.conversation_status.as_str(),
            ],
        )?;

        Ok(rows == 1)
    }

    /// Release a held lease back to `retry` after a failed turn.
    pub fn release_to_retry(&self, key: &ConversationKey) -> Result<()> {
        self.set_status(key, ConversationStatus::Retry)
    }

    /// Gate a conversation out of reply processing permanently.
    pub fn release_to_handoff(&self, key: &ConversationKey) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "UPDATE conversations SET status = ?1, hand_off_to_human = 1, updated_at = ?2
             WHERE primary_channel = ?3 AND conversation_id = ?4",
            params![
                ConversationStatus::HandoffRequired.as_str(),
                now,
                key.primary_channel,
                key.conversation_id,
            ],
        )?;
        Ok(())
    }

    fn set_status(&self, key: &ConversationKey, status: ConversationStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "UPDATE conversations SET status = ?1, updated_at = ?2
             WHERE primary_channel = ?3 AND conversation_id = ?4",
            params![status.as_str(), now, key.primary_channel, key.conversation_id],
        )?;
        Ok(())
    }

    /// Record intent to send a reply before calling the channel provider.
    /// Idempotent: overwrites any stale prior intent for the same key.
    pub fn record_send_intent(&self, key: &ConversationKey, payload_hash: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO pending_send_intents (primary_channel, conversation_id, payload_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(primary_channel, conversation_id) DO UPDATE SET
                payload_hash = excluded.payload_hash,
                created_at = excluded.created_at",
            params![key.primary_channel, key.conversation_id, payload_hash, now],
        )?;
        Ok(())
    }

    fn clear_send_intent(db: &Connection, key: &ConversationKey) -> rusqlite::Result<()> {
        db.execute(
            "DELETE FROM pending_send_intents WHERE primary_channel = ?1 AND conversation_id = ?2",
            params![key.primary_channel, key.conversation_id],
        )?;
        Ok(())
    }

    /// Atomically append the user and assistant turns, update the token
    /// total, mark the conversation `reply_sent`, and clear any pending send
    /// intent for `key`. Runs inside a single transaction so a crash
    /// mid-commit never leaves a half-appended turn on disk.
    pub fn commit_turn(
        &self,
        key: &ConversationKey,
        user_message: Message,
        assistant_message: Message,
        tokens_delta: u64,
    ) -> Result<ConversationRecord> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut record = row_by_key(&tx, key)?
            .ok_or_else(|| ConversationError::NotFoundById(key.to_string()))?;

        record.messages.push(user_message);
        record.messages.push(assistant_message);
        record.total_tokens += tokens_delta;
        record.conversation_status = ConversationStatus::ReplySent;
        record.updated_at = Utc::now().to_rfc3339();

        let messages_json = serde_json::to_string(&record.messages)?;
        tx.execute(
            "UPDATE conversations SET messages_json = ?1, status = ?2, total_tokens = ?3,
                updated_at = ?4
             WHERE primary_channel = ?5 AND conversation_id = ?6",
            params![
                messages_json,
                record.conversation_status.as_str(),
                record.total_tokens as i64,
                record.updated_at,
                key.primary_channel,
                key.conversation_id,
            ],
        )?;
        Self::clear_send_intent(&tx, key)?;

        tx.commit()?;
        Ok(record)
    }
}

fn row_by_key(db: &Connection, key: &ConversationKey) -> Result<Option<ConversationRecord>> {
    db.query_row(
        "SELECT primary_channel, conversation_id, messages_json, status,
                channel_config_json, ai_config_json, hand_off_to_human,
                total_tokens, created_at, updated_at
         FROM conversations
         WHERE primary_channel = ?1 AND conversation_id = ?2",
        params![key.primary_channel, key.conversation_id],
        row_to_record,
    )
    .optional()
    .map_err(ConversationError::from)
}

fn insert_record(db: &Connection, record: &ConversationRecord) -> Result<()> {
    let messages_json = serde_json::to_string(&record.messages)?;
    let channel_config_json = serde_json::to_string(&record.channel_config)?;
    let ai_config_json = serde_json::to_string(&record.ai_config)?;
    db.execute(
        "INSERT INTO conversations
            (primary_channel, conversation_id, company_identifier, messages_json, status,
             channel_config_json, ai_config_json, hand_off_to_human, total_tokens,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.primary_channel,
            record.conversation_id,
            record.channel_config.company_identifier,
            messages_json,
            record.conversation_status.as_str(),
            channel_config_json,
            ai_config_json,
            record.hand_off_to_human as i64,
            record.total_tokens as i64,
            record.created_at,
            record.updated_at,
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRecord> {
    let messages_json: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let channel_config_json: String = row.get(4)?;
    let ai_config_json: String = row.get(5)?;

    let messages: Vec<Message> = serde_json::from_str(&messages_json).unwrap_or_default();
    let conversation_status = status_str
        .parse()
        .unwrap_or(ConversationStatus::TemplateSent);
    let channel_config = serde_json::from_str(&channel_config_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let ai_config = serde_json::from_str(&ai_config_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ConversationRecord {
        primary_channel: row.get(0)?,
        conversation_id: row.get(1)?,
        messages,
        conversation_status,
        channel_config,
        ai_config,
        hand_off_to_human: row.get::<_, i64>(6)? != 0,
        total_tokens: row.get::<_, i64>(7)? as u64,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
