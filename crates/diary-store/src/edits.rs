//! Multi-row ledger writes.
//!
//! An entry save produces several uploads and deletes at once; they are
//! committed in a single transaction so a crash never leaves half an edit
//! in the ledger.

use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::{LedgerCounts, UploadRequest};

/// Row ids created by [`Database::record_edit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedEdit {
    pub upload_ids: Vec<i64>,
    pub delete_ids: Vec<i64>,
}

impl RecordedEdit {
    pub fn is_empty(&self) -> bool {
        self.upload_ids.is_empty() && self.delete_ids.is_empty()
    }
}

impl Database {
    /// Enqueue every upload and delete of one edit atomically.
    pub fn record_edit(
        &mut self,
        uploads: &[UploadRequest],
        deletes: &[String],
    ) -> Result<RecordedEdit> {
        let tx = self.conn_mut().transaction()?;
        let mut recorded = RecordedEdit::default();

        {
            let mut insert_upload = tx.prepare(
                "INSERT INTO pending_uploads (remote_path, source_uri, session_uri)
                 VALUES (?1, ?2, NULL)",
            )?;
            for (remote_path, source_uri) in uploads {
                insert_upload.execute(params![remote_path, source_uri])?;
                recorded.upload_ids.push(tx.last_insert_rowid());
            }

            let mut insert_delete =
                tx.prepare("INSERT INTO pending_deletes (remote_path) VALUES (?1)")?;
            for remote_path in deletes {
                insert_delete.execute(params![remote_path])?;
                recorded.delete_ids.push(tx.last_insert_rowid());
            }
        }

        tx.commit()?;

        tracing::debug!(
            uploads = recorded.upload_ids.len(),
            deletes = recorded.delete_ids.len(),
            "edit recorded in ledger"
        );
        Ok(recorded)
    }

    /// Take back rows written by [`Database::record_edit`] whose remote
    /// counterpart never happened.
    pub fn withdraw_edit(&mut self, recorded: &RecordedEdit) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        for id in &recorded.upload_ids {
            tx.execute("DELETE FROM pending_uploads WHERE id = ?1", params![id])?;
        }
        for id in &recorded.delete_ids {
            tx.execute("DELETE FROM pending_deletes WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn pending_counts(&self) -> Result<LedgerCounts> {
        let uploads: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM pending_uploads", [], |row| row.get(0))?;
        let deletes: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM pending_deletes", [], |row| row.get(0))?;
        Ok(LedgerCounts {
            uploads: uploads as usize,
            deletes: deletes as usize,
        })
    }
}
