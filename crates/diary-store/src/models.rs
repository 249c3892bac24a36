//! Ledger rows persisted in the local SQLite database.
//!
//! Both row types carry an auto-incrementing surrogate key; listing in
//! ascending key order is the replay order of reconciliation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PendingUpload
// ---------------------------------------------------------------------------

/// An image upload the object store has not yet confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingUpload {
    /// Local surrogate key, assigned on insert.
    pub id: i64,
    /// Destination key in the object store.
    pub remote_path: String,
    /// Opaque handle to the local image content.
    pub source_uri: String,
    /// Resumable session issued by the object store, once one was opened.
    pub session_uri: Option<String>,
}

// ---------------------------------------------------------------------------
// PendingDelete
// ---------------------------------------------------------------------------

/// An image delete the object store has not yet confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingDelete {
    pub id: i64,
    pub remote_path: String,
}

/// Number of rows waiting in each ledger table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerCounts {
    pub uploads: usize,
    pub deletes: usize,
}

impl LedgerCounts {
    pub fn is_empty(&self) -> bool {
        self.uploads == 0 && self.deletes == 0
    }
}

/// Upload half of an edit: `(remote_path, source_uri)`.
pub type UploadRequest = (String, String);
