use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::PendingDelete;

impl Database {
    /// Record a delete of `remote_path`. Returns the row id.
    pub fn enqueue_delete(&self, remote_path: &str) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO pending_deletes (remote_path) VALUES (?1)",
            params![remote_path],
        )?;
        let id = self.conn().last_insert_rowid();
        tracing::debug!(id, remote_path, "delete enqueued");
        Ok(id)
    }

    /// All pending deletes in insertion order.
    pub fn list_deletes(&self) -> Result<Vec<PendingDelete>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, remote_path FROM pending_deletes ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PendingDelete {
                id: row.get(0)?,
                remote_path: row.get(1)?,
            })
        })?;

        let mut deletes = Vec::new();
        for row in rows {
            deletes.push(row?);
        }
        Ok(deletes)
    }

    pub fn remove_delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM pending_deletes WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}
