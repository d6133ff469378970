use rusqlite::Connection;

use crate::error::Result;

/// Initialise the queue schema in `conn`: the in-flight `queue_messages`
/// table and the `dead_letters` table messages land in once they exceed
/// the configured receive-count ceiling.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS queue_messages (
            id            TEXT    NOT NULL PRIMARY KEY,
            queue_name    TEXT    NOT NULL,
            payload       TEXT    NOT NULL,
            visible_at    TEXT    NOT NULL,
            receive_count INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_queue_messages_poll
            ON queue_messages (queue_name, visible_at);

        CREATE TABLE IF NOT EXISTS dead_letters (
            id            TEXT    NOT NULL PRIMARY KEY,
            queue_name    TEXT    NOT NULL,
            payload       TEXT    NOT NULL,
            receive_count INTEGER NOT NULL,
            moved_at      TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_dead_letters_queue
            ON dead_letters (queue_name, moved_at);
        ",
    )?;
    Ok(())
}
