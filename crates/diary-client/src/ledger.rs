//! Async handle to the pending-operation ledger.
//!
//! [`diary_store::Database`] is synchronous; every call here is shipped to
//! tokio's blocking pool so ledger I/O never runs on the task that owns UI
//! state.

use std::path::Path;
use std::sync::{Arc, Mutex};

use diary_store::{Database, LedgerCounts, PendingDelete, PendingUpload, RecordedEdit, StoreError};

use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct Ledger {
    db: Arc<Mutex<Database>>,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open (or create) the ledger file at `path`, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::from)?;
        }
        tracing::info!(path = %path.display(), "opening ledger");
        Ok(Self::new(Database::open_at(path)?))
    }

    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> std::result::Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|e| ClientError::Background(format!("Lock poisoned: {e}")))?;
            f(&mut guard).map_err(ClientError::from)
        })
        .await?
    }

    pub async fn enqueue_upload(&self, remote_path: &str, source_uri: &str) -> Result<i64> {
        let (remote_path, source_uri) = (remote_path.to_string(), source_uri.to_string());
        self.call(move |db| db.enqueue_upload(&remote_path, &source_uri))
            .await
    }

    pub async fn enqueue_delete(&self, remote_path: &str) -> Result<i64> {
        let remote_path = remote_path.to_string();
        self.call(move |db| db.enqueue_delete(&remote_path)).await
    }

    pub async fn list_uploads(&self) -> Result<Vec<PendingUpload>> {
        self.call(|db| db.list_uploads()).await
    }

    pub async fn list_deletes(&self) -> Result<Vec<PendingDelete>> {
        self.call(|db| db.list_deletes()).await
    }

    pub async fn remove_upload(&self, id: i64) -> Result<bool> {
        self.call(move |db| db.remove_upload(id)).await
    }

    pub async fn remove_delete(&self, id: i64) -> Result<bool> {
        self.call(move |db| db.remove_delete(id)).await
    }

    pub async fn set_upload_session(&self, id: i64, session: &str) -> Result<bool> {
        let session = session.to_string();
        self.call(move |db| db.set_upload_session(id, &session))
            .await
    }

    pub async fn clear_upload_session(&self, id: i64) -> Result<bool> {
        self.call(move |db| db.clear_upload_session(id)).await
    }

    /// Drop pending uploads for images nobody references any more.
    pub async fn abandon_uploads(&self, remote_paths: Vec<String>) -> Result<usize> {
        self.call(move |db| {
            let mut removed = 0;
            for path in &remote_paths {
                removed += db.remove_uploads_for_path(path)?;
            }
            Ok(removed)
        })
        .await
    }

    pub async fn abandon_uploads_with_prefix(&self, prefix: &str) -> Result<usize> {
        let prefix = prefix.to_string();
        self.call(move |db| db.remove_uploads_with_prefix(&prefix))
            .await
    }

    /// Enqueue one edit's uploads and deletes in a single transaction.
    pub async fn record_edit(
        &self,
        uploads: Vec<(String, String)>,
        deletes: Vec<String>,
    ) -> Result<RecordedEdit> {
        self.call(move |db| db.record_edit(&uploads, &deletes))
            .await
    }

    pub async fn withdraw_edit(&self, recorded: RecordedEdit) -> Result<()> {
        self.call(move |db| db.withdraw_edit(&recorded)).await
    }

    pub async fn counts(&self) -> Result<LedgerCounts> {
        self.call(|db| db.pending_counts()).await
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}
