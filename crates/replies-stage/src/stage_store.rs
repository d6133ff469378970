use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, instrument};

use replies_core::types::{now_iso8601, Channel};

use crate::error::Result;
use crate::types::StagedFragment;

/// Short-lived, conversation-keyed table of inbound message fragments
/// awaiting a batching decision.
///
/// Wraps a single SQLite connection in a `Mutex`, matching the rest of this
/// codebase's persistence idiom — a single-node deployment doesn't need a
/// connection pool for a hot path this small.
pub struct StageStore {
    db: Mutex<Connection>,
}

impl StageStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Idempotent upsert — a re-delivered webhook with the same
    /// `(conversation_id, message_sid)` overwrites the existing row rather
    /// than producing a duplicate.
    #[instrument(skip(self, fragment), fields(conversation_id = %fragment.conversation_id, message_sid = %fragment.message_sid))]
    pub fn put(&self, fragment: &StagedFragment) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO staged_fragments
                (conversation_id, message_sid, body, primary_channel, channel, received_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(conversation_id, message_sid) DO UPDATE SET
                body = excluded.body,
                primary_channel = excluded.primary_channel,
                channel = excluded.channel,
                received_at = excluded.received_at,
                expires_at = excluded.expires_at",
            params![
                fragment.conversation_id,
                fragment.message_sid,
                fragment.body,
                fragment.primary_channel,
                fragment.channel.as_path_segment(),
                fragment.received_at,
                fragment.expires_at,
            ],
        )?;
        debug!("fragment staged");
        Ok(())
    }

    /// All live (non-expired) fragments for a conversation, oldest first by
    /// `received_at` (tie-break `message_sid`) — the exact order
    /// `BatchMerger` needs, so callers don't have to re-sort.
    #[instrument(skip(self), fields(conversation_id))]
    pub fn query(&self, conversation_id: &str) -> Result<Vec<StagedFragment>> {
        let now = now_iso8601();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT conversation_id, message_sid, body, primary_channel, channel, received_at, expires_at
             FROM staged_fragments
             WHERE conversation_id = ?1 AND expires_at > ?2
             ORDER BY received_at ASC, message_sid ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id, now], row_to_fragment)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Best-effort bulk delete after a successful commit. Residuals (if any
    /// row vanished from the delete list race) are cleared by TTL expiry.
    #[instrument(skip(self, keys))]
    pub fn bulk_delete(&self, conversation_id: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let db = self.db.lock().unwrap();
        let tx = db.unchecked_transaction()?;
        for sid in keys {
            tx.execute(
                "DELETE FROM staged_fragments WHERE conversation_id = ?1 AND message_sid = ?2",
                params![conversation_id, sid],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete every row whose `expires_at` has passed. Run periodically by a
    /// sweep task since SQLite has no native TTL.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = now_iso8601();
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM staged_fragments WHERE expires_at <= ?1",
            params![now],
        )?;
        Ok(n)
    }

    /// Construct a `StagedFragment` with `expires_at` derived from `ttl`.
    pub fn fragment_with_ttl(
        conversation_id: impl Into<String>,
        message_sid: impl Into<String>,
        body: impl Into<String>,
        primary_channel: impl Into<String>,
        channel: Channel,
        received_at: DateTime<Utc>,
        ttl_seconds: u64,
    ) -> StagedFragment {
        StagedFragment {
            conversation_id: conversation_id.into(),
            message_sid: message_sid.into(),
            body: body.into(),
            primary_channel: primary_channel.into(),
            channel,
            received_at: received_at.to_rfc3339(),
            expires_at: (received_at + chrono::Duration::seconds(ttl_seconds as i64)).to_rfc3339(),
        }
    }
}

fn row_to_fragment(row: &rusqlite::Row<'_>) -> rusqlite::Result<StagedFragment> {
    let channel_str: String = row.get(4)?;
    let channel = channel_str.parse().unwrap_or(Channel::WhatsApp);
    Ok(StagedFragment {
        conversation_id: row.get(0)?,
        message_sid: row.get(1)?,
        body: row.get(2)?,
        primary_channel: row.get(3)?,
        channel,
        received_at: row.get(5)?,
        expires_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> StageStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        StageStore::new(conn)
    }

    fn frag(sid: &str, body: &str, received_at: DateTime<Utc>) -> StagedFragment {
        StageStore::fragment_with_ttl("conv-1", sid, body, "+15551234567", Channel::WhatsApp, received_at, 60)
    }

    #[test]
    fn put_then_query_returns_fragment() {
        let store = store();
        let now = Utc::now();
        store.put(&frag("M1", "hello", now)).unwrap();
        let fragments = store.query("conv-1").unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].body, "hello");
    }

    #[test]
    fn duplicate_message_sid_overwrites_in_place() {
        let store = store();
        let now = Utc::now();
        store.put(&frag("M1", "first", now)).unwrap();
        store.put(&frag("M1", "second", now)).unwrap();
        let fragments = store.query("conv-1").unwrap();
        assert_eq!(fragments.len(), 1, "re-delivery must not duplicate");
        assert_eq!(fragments[0].body, "second");
    }

    #[test]
    fn query_orders_by_received_at_then_sid() {
        let store = store();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(2);
        store.put(&frag("M2", "second", t1)).unwrap();
        store.put(&frag("M1", "first", t0)).unwrap();
        let fragments = store.query("conv-1").unwrap();
        assert_eq!(fragments[0].message_sid, "M1");
        assert_eq!(fragments[1].message_sid, "M2");
    }

    #[test]
    fn expired_fragments_are_not_returned() {
        let store = store();
        let past = Utc::now() - chrono::Duration::seconds(120);
        store.put(&frag("M1", "stale", past)).unwrap();
        assert!(store.query("conv-1").unwrap().is_empty());
    }

    #[test]
    fn bulk_delete_removes_only_named_keys() {
        let store = store();
        let now = Utc::now();
        store.put(&frag("M1", "a", now)).unwrap();
        store.put(&frag("M2", "b", now)).unwrap();
        store.bulk_delete("conv-1", &["M1".to_string()]).unwrap();
        let fragments = store.query("conv-1").unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].message_sid, "M2");
    }

    #[test]
    fn sweep_expired_clears_stale_rows() {
        let store = store();
        let past = Utc::now() - chrono::Duration::seconds(120);
        store.put(&frag("M1", "stale", past)).unwrap();
        let n = store.sweep_expired().unwrap();
        assert_eq!(n, 1);
    }
}
