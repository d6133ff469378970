use std::sync::Mutex;

use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::Result;
use crate::types::QueueMessage;

/// Enqueue side of the delay queue: schedule a trigger to become visible
/// after a delay (used for the per-channel batch-window wakeup and for
/// handoff notifications).
pub trait QueueProducer {
    fn enqueue(&self, queue_name: &str, payload: &str, delay_secs: u64) -> Result<String>;
}

/// Consume side: receive with a visibility timeout, extend it while still
/// processing, and delete on success. Mirrors the SQS-style at-least-once
/// contract the worker loop is built against.
pub trait QueueConsumer {
    fn receive(
        &self,
        queue_name: &str,
        visibility_timeout_secs: u64,
        max_receive_count: u32,
    ) -> Result<Option<QueueMessage>>;

    fn extend_visibility(
        &self,
        queue_name: &str,
        message_id: &str,
        visibility_timeout_secs: u64,
    ) -> Result<()>;

    fn delete(&self, queue_name: &str, message_id: &str) -> Result<()>;
}

/// SQLite-backed delay queue. One table serves every queue name; `receive`
/// filters by `queue_name` the same way a real broker scopes consumers to a
/// topic/queue ARN.
pub struct SqliteQueue {
    db: Mutex<Connection>,
}

impl SqliteQueue {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Number of dead-lettered messages currently parked for `queue_name`,
    /// exposed for the health/readiness surface.
    pub fn dead_letter_count(&self, queue_name: &str) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM dead_letters WHERE queue_name = ?1",
            params![queue_name],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl QueueProducer for SqliteQueue {
    #[instrument(skip(self, payload))]
    fn enqueue(&self, queue_name: &str, payload: &str, delay_secs: u64) -> Result<String> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let visible_at = (now + ChronoDuration::seconds(delay_secs as i64)).to_rfc3339();
        let now_str = now.to_rfc3339();

        db.execute(
            "INSERT INTO queue_messages
                (id, queue_name, payload, visible_at, receive_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            params![id, queue_name, payload, visible_at, now_str],
        )?;
        debug!(message_id = %id, queue_name, delay_secs, "trigger enqueued");
        Ok(id)
    }
}

impl QueueConsumer for SqliteQueue {
    #[instrument(skip(self))]
    fn receive(
        &self,
        queue_name: &str,
        visibility_timeout_secs: u64,
        max_receive_count: u32,
    ) -> Result<Option<QueueMessage>> {
        let db = self.db.lock().unwrap();

        loop {
            let now = Utc::now();
            let now_str = now.to_rfc3339();

            let candidate: Option<(String, String, u32)> = db
                .query_row(
                    "SELECT id, payload, receive_count FROM queue_messages
                     WHERE queue_name = ?1 AND visible_at <= ?2
                     ORDER BY visible_at ASC LIMIT 1",
                    params![queue_name, now_str],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((id, payload, receive_count)) = candidate else {
                return Ok(None);
            };

            let new_count = receive_count + 1;
            if new_count > max_receive_count {
                warn!(
                    message_id = %id,
                    queue_name,
                    receive_count = new_count,
                    "message exceeded max receive count, moving to dead letters"
                );
                db.execute(
                    "INSERT INTO dead_letters (id, queue_name, payload, receive_count, moved_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, queue_name, payload, new_count, now_str],
                )?;
                db.execute("DELETE FROM queue_messages WHERE id = ?1", params![id])?;
                continue;
            }

            let visible_at = (now + ChronoDuration::seconds(visibility_timeout_secs as i64))
                .to_rfc3339();
            db.execute(
                "UPDATE queue_messages SET visible_at = ?1, receive_count = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![visible_at, new_count, now_str, id],
            )?;

            return Ok(Some(QueueMessage {
                id,
                queue_name: queue_name.to_string(),
                payload,
                visible_at,
                receive_count: new_count,
                created_at: now_str.clone(),
                updated_at: now_str,
            }));
        }
    }

    #[instrument(skip(self))]
    fn extend_visibility(
        &self,
        queue_name: &str,
        message_id: &str,
        visibility_timeout_secs: u64,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        let visible_at = (now + ChronoDuration::seconds(visibility_timeout_secs as i64))
            .to_rfc3339();
        let rows = db.execute(
            "UPDATE queue_messages SET visible_at = ?1, updated_at = ?2
             WHERE id = ?3 AND queue_name = ?4",
            params![visible_at, now.to_rfc3339(), message_id, queue_name],
        )?;
        if rows == 0 {
            warn!(message_id, queue_name, "extend_visibility on unknown message (likely already deleted)");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete(&self, queue_name: &str, message_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM queue_messages WHERE id = ?1 AND queue_name = ?2",
            params![message_id, queue_name],
        )?;
        info!(message_id, queue_name, "message deleted");
        Ok(())
    }
}
