use rusqlite::{Connection, Result};

/// Initialise the conversations table and its secondary index. Safe to call
/// on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_conversations_table(conn)?;
    create_pending_send_intents_table(conn)?;
    Ok(())
}

fn create_conversations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            primary_channel      TEXT NOT NULL,
            conversation_id      TEXT NOT NULL,
            company_identifier   TEXT NOT NULL,
            messages_json        TEXT NOT NULL,
            status               TEXT NOT NULL,
            channel_config_json  TEXT NOT NULL,
            ai_config_json       TEXT NOT NULL,
            hand_off_to_human    INTEGER NOT NULL DEFAULT 0,
            total_tokens         INTEGER NOT NULL DEFAULT 0,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL,
            PRIMARY KEY (primary_channel, conversation_id)
        );
        -- primary_channel doubles as the user-side identifier, so the
        -- (company_identifier, user_identifier) lookup lands on
        -- (company_identifier, primary_channel) here.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_identifiers
            ON conversations(company_identifier, primary_channel);",
    )
}

/// Pre-send intent records: written just before the outbound send is
/// attempted so a redrive after a commit failure can tell "never sent"
/// apart from "sent, commit lost" in logs.
fn create_pending_send_intents_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pending_send_intents (
            primary_channel  TEXT NOT NULL,
            conversation_id  TEXT NOT NULL,
            payload_hash     TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            PRIMARY KEY (primary_channel, conversation_id)
        );",
    )
}
