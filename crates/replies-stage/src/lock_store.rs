use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::{debug, instrument};

use replies_core::types::now_iso8601;

use crate::error::Result;

/// The "a delayed wake is already scheduled for this burst" token.
///
/// `try_acquire` is the conditional-insert primitive `IngestCoordinator`
/// uses to enqueue exactly one trigger per burst: the
/// first fragment of a burst acquires the lock and schedules the trigger;
/// every subsequent fragment within the window finds the lock already
/// present and does nothing.
pub struct LockStore {
    db: Mutex<Connection>,
}

impl LockStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Attempt to acquire the lock for `conversation_id`, conditional on no
    /// live (non-expired) lock already existing. Returns `true` if this call
    /// acquired it, `false` if a live lock was already present.
    #[instrument(skip(self))]
    pub fn try_acquire(&self, conversation_id: &str, ttl_seconds: u64) -> Result<bool> {
        let now = now_iso8601();
        let expires_at =
            (chrono::Utc::now() + chrono::Duration::seconds(ttl_seconds as i64)).to_rfc3339();

        let db = self.db.lock().unwrap();
        // Reclaim the slot if the previous lock has already expired — the
        // PRIMARY KEY would otherwise reject the insert even though the
        // lock is logically gone.
        db.execute(
            "DELETE FROM trigger_locks WHERE conversation_id = ?1 AND expires_at <= ?2",
            params![conversation_id, now],
        )?;

        let inserted = db.execute(
            "INSERT OR IGNORE INTO trigger_locks (conversation_id, expires_at) VALUES (?1, ?2)",
            params![conversation_id, expires_at],
        )?;

        let acquired = inserted == 1;
        debug!(acquired, "trigger lock acquisition attempt");
        Ok(acquired)
    }

    /// Idempotent delete — safe to call even if the lock was never acquired
    /// or already expired.
    #[instrument(skip(self))]
    pub fn release(&self, conversation_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM trigger_locks WHERE conversation_id = ?1",
            params![conversation_id],
        )?;
        Ok(())
    }

    /// Delete every row whose `expires_at` has passed.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = now_iso8601();
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM trigger_locks WHERE expires_at <= ?1",
            params![now],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> LockStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        LockStore::new(conn)
    }

    #[test]
    fn first_acquire_succeeds_second_fails() {
        let store = store();
        assert!(store.try_acquire("conv-1", 40).unwrap());
        assert!(!store.try_acquire("conv-1", 40).unwrap());
    }

    #[test]
    fn release_then_acquire_succeeds_again() {
        let store = store();
        assert!(store.try_acquire("conv-1", 40).unwrap());
        store.release("conv-1").unwrap();
        assert!(store.try_acquire("conv-1", 40).unwrap());
    }

    #[test]
    fn expired_lock_can_be_reacquired_without_explicit_release() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        // Seed an already-expired lock directly.
        let past = (chrono::Utc::now() - chrono::Duration::seconds(5)).to_rfc3339();
        conn.execute(
            "INSERT INTO trigger_locks (conversation_id, expires_at) VALUES (?1, ?2)",
            params!["conv-1", past],
        )
        .unwrap();
        let store = LockStore::new(conn);
        assert!(store.try_acquire("conv-1", 40).unwrap());
    }

    #[test]
    fn distinct_conversations_do_not_contend() {
        let store = store();
        assert!(store.try_acquire("conv-1", 40).unwrap());
        assert!(store.try_acquire("conv-2", 40).unwrap());
    }
}
