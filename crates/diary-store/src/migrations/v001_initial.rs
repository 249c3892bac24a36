//! v001 -- Initial schema creation.
//!
//! Creates the two ledger tables: `pending_uploads` and `pending_deletes`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Image uploads not yet confirmed by the object store
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pending_uploads (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_path TEXT NOT NULL,               -- destination key in the object store
    source_uri  TEXT NOT NULL,               -- opaque local content handle
    session_uri TEXT                         -- resumable session, once opened
);

CREATE INDEX IF NOT EXISTS idx_pending_uploads_path ON pending_uploads(remote_path);

-- ----------------------------------------------------------------
-- Image deletes not yet confirmed by the object store
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pending_deletes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_path TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
