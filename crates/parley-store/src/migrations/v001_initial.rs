//! v001 -- Initial schema creation.
//!
//! Creates the `messages` table.  Deletion is a per-party visibility flag
//! (`deleted_for`), never row removal.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    content     TEXT NOT NULL,
    sender      INTEGER NOT NULL,             -- user id
    receiver    INTEGER NOT NULL,             -- user id
    created_at  TEXT NOT NULL,                -- ISO-8601 / RFC-3339
    edited      INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    edited_at   TEXT,                         -- nullable, set on edit
    deleted_for INTEGER                       -- nullable user id; hides the
                                              -- row for that party only
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages(sender, receiver, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
