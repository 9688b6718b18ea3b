//! v002 -- Object storage metadata.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS objects (
    bucket      TEXT NOT NULL,
    key         TEXT NOT NULL,               -- "<user_id>/<token>.<ext>"
    size        INTEGER NOT NULL,
    blake3_hash TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    PRIMARY KEY (bucket, key)
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
