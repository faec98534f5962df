//! v001 -- Initial schema creation.
//!
//! One row per message. Conversations are derived at query time, so there
//! is no separate table for them.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,      -- UUID v4
    sender_id   TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    content     TEXT,
    file_url    TEXT,
    file_type   TEXT NOT NULL DEFAULT 'text',   -- text | image | video | file
    file_name   TEXT,
    created_at  INTEGER NOT NULL                -- microseconds since Unix epoch
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, created_at);

CREATE INDEX IF NOT EXISTS idx_messages_receiver_pair_ts
    ON messages(receiver_id, sender_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
