use rusqlite::{Connection, Result};

/// Initialise the staging tables. Safe to call on every startup (idempotent).
///
/// Table names are fixed here rather than taken from `TableConfig` — SQLite
/// identifiers can't be bound parameters, and a single-process deployment
/// has no need to rename them. A multi-tenant deployment would template
/// these two `CREATE TABLE` statements with the configured names instead.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_staged_fragments_table(conn)?;
    create_trigger_locks_table(conn)?;
    Ok(())
}

fn create_staged_fragments_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS staged_fragments (
            conversation_id  TEXT NOT NULL,
            message_sid      TEXT NOT NULL,
            body             TEXT NOT NULL,
            primary_channel  TEXT NOT NULL,
            channel          TEXT NOT NULL,
            received_at      TEXT NOT NULL,
            expires_at       TEXT NOT NULL,
            PRIMARY KEY (conversation_id, message_sid)
        );
        CREATE INDEX IF NOT EXISTS idx_staged_fragments_conversation
            ON staged_fragments(conversation_id, received_at);
        CREATE INDEX IF NOT EXISTS idx_staged_fragments_expiry
            ON staged_fragments(expires_at);",
    )
}

fn create_trigger_locks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS trigger_locks (
            conversation_id TEXT PRIMARY KEY,
            expires_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_trigger_locks_expiry
            ON trigger_locks(expires_at);",
    )
}
