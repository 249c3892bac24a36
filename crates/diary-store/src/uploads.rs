use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::PendingUpload;

impl Database {
    /// Record an upload of `source_uri` to `remote_path`. Returns the row id.
    pub fn enqueue_upload(&self, remote_path: &str, source_uri: &str) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO pending_uploads (remote_path, source_uri, session_uri)
             VALUES (?1, ?2, NULL)",
            params![remote_path, source_uri],
        )?;
        let id = self.conn().last_insert_rowid();
        tracing::debug!(id, remote_path, "upload enqueued");
        Ok(id)
    }

    pub fn get_upload(&self, id: i64) -> Result<PendingUpload> {
        self.conn()
            .query_row(
                "SELECT id, remote_path, source_uri, session_uri
                 FROM pending_uploads
                 WHERE id = ?1",
                params![id],
                row_to_upload,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// All pending uploads in insertion order.
    pub fn list_uploads(&self) -> Result<Vec<PendingUpload>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, remote_path, source_uri, session_uri
             FROM pending_uploads
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], row_to_upload)?;

        let mut uploads = Vec::new();
        for row in rows {
            uploads.push(row?);
        }
        Ok(uploads)
    }

    /// Store the resumable session the object store opened for this row.
    pub fn set_upload_session(&self, id: i64, session_uri: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE pending_uploads SET session_uri = ?1 WHERE id = ?2",
            params![session_uri, id],
        )?;
        Ok(affected > 0)
    }

    pub fn clear_upload_session(&self, id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE pending_uploads SET session_uri = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(affected > 0)
    }

    pub fn remove_upload(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM pending_uploads WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Abandon every pending upload targeting `remote_path`.
    pub fn remove_uploads_for_path(&self, remote_path: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM pending_uploads WHERE remote_path = ?1",
            params![remote_path],
        )?;
        Ok(affected)
    }

    /// Abandon every pending upload whose key starts with `prefix`.
    pub fn remove_uploads_with_prefix(&self, prefix: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM pending_uploads WHERE substr(remote_path, 1, length(?1)) = ?1",
            params![prefix],
        )?;
        Ok(affected)
    }
}

fn row_to_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingUpload> {
    Ok(PendingUpload {
        id: row.get(0)?,
        remote_path: row.get(1)?,
        source_uri: row.get(2)?,
        session_uri: row.get(3)?,
    })
}
