//! Image sync reconciler.
//!
//! Drains the pending-operation ledger against the remote object store. A
//! pass walks pending uploads, then pending deletes, each in insertion order.
//! Rows whose remote operation succeeds are removed; rows that fail stay in
//! the ledger for the next pass. One failing row never stops the rest of the
//! pass, and nothing here is reported to the UI.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use diary_shared::ObjectError;
use diary_store::{PendingDelete, PendingUpload};

use crate::error::Result;
use crate::ledger::Ledger;
use crate::remote::ObjectStore;

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub uploaded: usize,
    pub uploads_failed: usize,
    pub deleted: usize,
    pub deletes_failed: usize,
}

impl ReconcileReport {
    pub fn failures(&self) -> usize {
        self.uploads_failed + self.deletes_failed
    }
}

/// Retry delays of the background loop: `base`, doubling up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// `base` is floored at one millisecond so a failing row never retries
    /// in a busy loop.
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

struct Inner {
    ledger: Ledger,
    objects: Arc<dyn ObjectStore>,
    // two passes over the same rows would upload twice
    pass_lock: Mutex<()>,
    wake: Notify,
}

#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub fn new(ledger: Ledger, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                objects,
                pass_lock: Mutex::new(()),
                wake: Notify::new(),
            }),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    /// Run one pass over the ledger.
    ///
    /// Only a failure to read the ledger itself is returned as an error;
    /// remote failures are counted in the report.
    pub async fn run_pass(&self) -> Result<ReconcileReport> {
        let _pass = self.inner.pass_lock.lock().await;
        let mut report = ReconcileReport::default();

        let uploads = self.inner.ledger.list_uploads().await?;
        for row in &uploads {
            if self.upload_row(row).await {
                report.uploaded += 1;
            } else {
                report.uploads_failed += 1;
            }
        }

        let deletes = self.inner.ledger.list_deletes().await?;
        for row in &deletes {
            if self.delete_row(row).await {
                report.deleted += 1;
            } else {
                report.deletes_failed += 1;
            }
        }

        if uploads.is_empty() && deletes.is_empty() {
            debug!("ledger empty, nothing to reconcile");
        } else {
            info!(
                uploaded = report.uploaded,
                uploads_failed = report.uploads_failed,
                deleted = report.deleted,
                deletes_failed = report.deletes_failed,
                "reconciliation pass finished"
            );
        }
        Ok(report)
    }

    /// Start a pass in the background.
    ///
    /// Called at startup and after every save or delete. Also wakes the
    /// retry loop, if one is running.
    pub fn trigger(&self) -> JoinHandle<ReconcileReport> {
        self.inner.wake.notify_one();
        let this = self.clone();
        tokio::spawn(async move {
            match this.run_pass().await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "reconciliation pass aborted");
                    ReconcileReport::default()
                }
            }
        })
    }

    /// Keep reconciling in the background until `cancel` fires.
    ///
    /// After a pass with failures the loop sleeps with exponential backoff
    /// and tries again. Once the ledger is empty it sleeps until the next
    /// [`Reconciler::trigger`].
    pub fn spawn_retry_loop(&self, backoff: Backoff, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut delay = backoff.base;
            loop {
                let pass = tokio::select! {
                    _ = cancel.cancelled() => break,
                    pass = this.run_pass() => pass,
                };

                let pending = this.inner.ledger.counts().await;
                let retry_after = match (&pass, &pending) {
                    (Ok(report), Ok(counts)) if report.failures() == 0 => {
                        delay = backoff.base;
                        if counts.is_empty() {
                            None
                        } else {
                            // rows arrived while the pass ran
                            continue;
                        }
                    }
                    _ => {
                        let wait = delay;
                        delay = backoff.next(delay);
                        Some(wait)
                    }
                };

                match retry_after {
                    Some(wait) => {
                        debug!(wait_ms = wait.as_millis() as u64, "reconciliation retry scheduled");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(wait) => {}
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = this.inner.wake.notified() => {}
                        }
                    }
                }
            }
            debug!("reconciliation retry loop stopped");
        })
    }

    async fn upload_row(&self, row: &PendingUpload) -> bool {
        let objects = &self.inner.objects;
        let ledger = &self.inner.ledger;

        let session = match &row.session_uri {
            Some(session) => session.clone(),
            None => match objects.open_session(&row.remote_path).await {
                Ok(session) => {
                    // persisted before any byte moves, so a retry resumes
                    if let Err(e) = ledger.set_upload_session(row.id, &session).await {
                        warn!(id = row.id, error = %e, "could not store upload session");
                        return false;
                    }
                    session
                }
                Err(e) => {
                    warn!(id = row.id, path = %row.remote_path, error = %e, "upload session not opened");
                    return false;
                }
            },
        };

        match objects
            .put_resumable(&row.remote_path, &row.source_uri, &session)
            .await
        {
            Ok(()) => match ledger.remove_upload(row.id).await {
                Ok(_) => {
                    debug!(id = row.id, path = %row.remote_path, "image uploaded");
                    true
                }
                Err(e) => {
                    warn!(id = row.id, error = %e, "uploaded row not removed");
                    false
                }
            },
            Err(ObjectError::SessionExpired) => {
                info!(id = row.id, path = %row.remote_path, "upload session expired, will reopen");
                if let Err(e) = ledger.clear_upload_session(row.id).await {
                    warn!(id = row.id, error = %e, "could not clear upload session");
                }
                false
            }
            Err(e) => {
                warn!(id = row.id, path = %row.remote_path, error = %e, "image upload failed");
                false
            }
        }
    }

    async fn delete_row(&self, row: &PendingDelete) -> bool {
        match self.inner.objects.delete(&row.remote_path).await {
            Ok(()) | Err(ObjectError::NotFound) => {
                match self.inner.ledger.remove_delete(row.id).await {
                    Ok(_) => {
                        debug!(id = row.id, path = %row.remote_path, "image deleted");
                        true
                    }
                    Err(e) => {
                        warn!(id = row.id, error = %e, "deleted row not removed");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(id = row.id, path = %row.remote_path, error = %e, "image delete failed");
                false
            }
        }
    }
}
