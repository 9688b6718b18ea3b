//! v001 -- Initial schema creation.
//!
//! Creates `users` and the generic `records` table that backs every
//! collection.  Row bodies are JSON; the columns used for ordering, policy
//! checks and uniqueness are lifted out of the body.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    email      TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL                -- RFC-3339, microseconds
);

-- ----------------------------------------------------------------
-- Records (one row per collection entry)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS records (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,               -- UUID v4, server-assigned
    user_id    TEXT NOT NULL,               -- author, immutable
    created_at TEXT NOT NULL,               -- RFC-3339, microseconds
    body       TEXT NOT NULL,               -- full row as JSON

    UNIQUE (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_records_collection_created
    ON records(collection, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
