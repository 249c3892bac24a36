//! Entry edit orchestration.
//!
//! A [`WriteSession`] owns the in-progress edit of one entry. Saving writes
//! the document first; only once the store accepted it are the image
//! uploads and deletes recorded in the ledger, in one transaction, and a
//! reconciliation pass kicked off. A rejected write therefore never leaves
//! ledger rows behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use diary_shared::paths::image_path;
use diary_shared::{DiaryEntry, EntryId, Mood};

use crate::error::{ClientError, Result};
use crate::gallery::{GalleryImage, GalleryState};
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::remote::{DocumentStore, ObjectStore};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPhase {
    Idle,
    Loaded,
    Editing,
    Saving,
    Saved,
    Deleted,
    Failed(String),
}

/// Result of a successful save.
#[derive(Debug)]
pub struct SaveReceipt {
    pub entry: DiaryEntry,
    /// The reconciliation pass started after the ledger write.
    pub reconcile: JoinHandle<ReconcileReport>,
}

/// Opens write sessions. Cheap to clone.
#[derive(Clone)]
pub struct Editor {
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    session: Session,
    reconciler: Reconciler,
    image_prefix: String,
}

impl Editor {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        session: Session,
        reconciler: Reconciler,
        image_prefix: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            objects,
            session,
            reconciler,
            image_prefix: image_prefix.into(),
        }
    }

    /// Start editing a new entry (`None`) or an existing one.
    ///
    /// Loading an existing entry needs a signed-in user; an entry that no
    /// longer exists fails with [`ClientError::NotFound`].
    pub async fn open(&self, id: Option<EntryId>) -> Result<WriteSession> {
        let mut session = WriteSession {
            editor: self.clone(),
            baseline: None,
            title: String::new(),
            description: String::new(),
            mood: Mood::default(),
            date_override: None,
            gallery: GalleryState::default(),
            phase: EditPhase::Idle,
            last_attach_millis: 0,
        };

        if let Some(id) = id {
            self.session.require_owner()?;
            let entry = self.load(&id).await?;
            session.title = entry.title.clone();
            session.description = entry.description.clone();
            session.mood = entry.mood;
            session.gallery = GalleryState::from_existing(self.resolve_urls(&entry.images).await);
            session.baseline = Some(entry);
            session.phase = EditPhase::Loaded;
        }

        Ok(session)
    }

    async fn load(&self, id: &EntryId) -> Result<DiaryEntry> {
        // first emission only; the subscription ends when the stream drops
        let mut stream = self.documents.query_by_id(id);
        match stream.next().await {
            Some(Ok(entry)) => Ok(entry),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::NotFound),
        }
    }

    async fn resolve_urls(&self, paths: &[String]) -> Vec<(String, Option<String>)> {
        let lookups = paths.iter().map(|path| async move {
            match self.objects.download_url(path).await {
                Ok(url) => (path.clone(), Some(url)),
                Err(e) => {
                    debug!(path = %path, error = %e, "no download url");
                    (path.clone(), None)
                }
            }
        });
        join_all(lookups).await
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("image_prefix", &self.image_prefix)
            .finish_non_exhaustive()
    }
}

/// In-progress edit of a single entry.
#[derive(Debug)]
pub struct WriteSession {
    editor: Editor,
    baseline: Option<DiaryEntry>,
    title: String,
    description: String,
    mood: Mood,
    date_override: Option<DateTime<Utc>>,
    gallery: GalleryState,
    phase: EditPhase,
    last_attach_millis: i64,
}

impl WriteSession {
    pub fn phase(&self) -> &EditPhase {
        &self.phase
    }

    pub fn entry_id(&self) -> Option<&EntryId> {
        self.baseline.as_ref().and_then(|e| e.id.as_ref())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    /// Date the entry will be saved with, if one is known yet.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date_override
            .or_else(|| self.baseline.as_ref().map(|e| e.timestamp))
    }

    pub fn images(&self) -> &[GalleryImage] {
        self.gallery.images()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.phase = EditPhase::Editing;
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.phase = EditPhase::Editing;
    }

    pub fn set_mood(&mut self, mood: Mood) {
        self.mood = mood;
        self.phase = EditPhase::Editing;
    }

    pub fn set_date_override(&mut self, timestamp: DateTime<Utc>) {
        self.date_override = Some(timestamp);
        self.phase = EditPhase::Editing;
    }

    /// Add a locally picked image and return the remote path it will be
    /// uploaded to.
    pub fn attach_image(&mut self, source_uri: &str, extension: &str) -> Result<String> {
        let owner = self.editor.session.require_owner()?;

        let mut millis = Utc::now().timestamp_millis().max(self.last_attach_millis + 1);
        let mut path = image_path(&self.editor.image_prefix, &owner, source_uri, extension, millis);
        while self.gallery.contains(&path) {
            millis += 1;
            path = image_path(&self.editor.image_prefix, &owner, source_uri, extension, millis);
        }
        self.last_attach_millis = millis;

        self.gallery.attach(path.clone(), source_uri.to_string());
        self.phase = EditPhase::Editing;
        Ok(path)
    }

    pub fn remove_image(&mut self, remote_path: &str) -> bool {
        let removed = self.gallery.remove(remote_path);
        if removed {
            self.phase = EditPhase::Editing;
        }
        removed
    }

    /// Persist the entry, then record its image changes and start syncing
    /// them.
    pub async fn save(&mut self) -> Result<SaveReceipt> {
        match self.try_save().await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.phase = EditPhase::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn try_save(&mut self) -> Result<SaveReceipt> {
        let owner = self.editor.session.require_owner()?;
        self.phase = EditPhase::Saving;

        let entry = DiaryEntry {
            id: self.baseline.as_ref().and_then(|e| e.id.clone()),
            owner_id: self
                .baseline
                .as_ref()
                .map(|e| e.owner_id.clone())
                .unwrap_or(owner),
            title: self.title.clone(),
            description: self.description.clone(),
            mood: self.mood,
            timestamp: self.timestamp().unwrap_or_else(Utc::now),
            images: self.gallery.remote_paths(),
        };

        let stored = self.editor.documents.upsert(entry).await?;
        // A retry after a ledger failure must update this document, not add one.
        self.baseline = Some(stored.clone());
        self.date_override = None;

        let uploads = self.gallery.attached();
        let deletes = self.gallery.removed().to_vec();
        let ledger = self.editor.reconciler.ledger();
        if !uploads.is_empty() || !deletes.is_empty() {
            if let Err(e) = ledger.record_edit(uploads.clone(), deletes.clone()).await {
                warn!(
                    entry = ?stored.id,
                    error = %e,
                    "entry saved but image changes were not recorded"
                );
                return Err(e);
            }
        }

        info!(
            entry = ?stored.id,
            uploads = uploads.len(),
            deletes = deletes.len(),
            "entry saved"
        );

        self.gallery.commit();
        self.phase = EditPhase::Saved;

        Ok(SaveReceipt {
            entry: stored,
            reconcile: self.editor.reconciler.trigger(),
        })
    }

    /// Delete the loaded entry together with its images.
    pub async fn delete(&mut self) -> Result<JoinHandle<ReconcileReport>> {
        match self.try_delete().await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.phase = EditPhase::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn try_delete(&mut self) -> Result<JoinHandle<ReconcileReport>> {
        self.editor.session.require_owner()?;
        let (id, images) = match &self.baseline {
            Some(DiaryEntry {
                id: Some(id),
                images,
                ..
            }) => (id.clone(), images.clone()),
            _ => return Err(ClientError::NotFound),
        };

        let ledger = self.editor.reconciler.ledger();
        let recorded = ledger.record_edit(Vec::new(), images.clone()).await?;

        if let Err(e) = self.editor.documents.delete(&id).await {
            if let Err(undo) = ledger.withdraw_edit(recorded).await {
                warn!(entry = %id, error = %undo, "could not withdraw image deletes");
            }
            return Err(e.into());
        }

        match ledger.abandon_uploads(images.clone()).await {
            Ok(n) if n > 0 => debug!(entry = %id, abandoned = n, "dropped pending uploads"),
            Ok(_) => {}
            Err(e) => warn!(entry = %id, error = %e, "could not drop pending uploads"),
        }

        info!(entry = %id, images = images.len(), "entry deleted");
        self.baseline = None;
        self.gallery = GalleryState::default();
        self.phase = EditPhase::Deleted;

        Ok(self.editor.reconciler.trigger())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryDocumentStore, MemoryObjectStore, StaticIdentity};
    use crate::gallery::ImageKind;
    use crate::ledger::Ledger;
    use chrono::TimeZone;
    use diary_shared::OwnerId;
    use diary_store::Database;

    struct Fixture {
        editor: Editor,
        docs: Arc<MemoryDocumentStore>,
        objects: Arc<MemoryObjectStore>,
        ledger: Ledger,
    }

    fn fixture_with(identity: StaticIdentity) -> Fixture {
        fixture_on(identity, Ledger::new(Database::open_in_memory().unwrap()))
    }

    fn fixture_on(identity: StaticIdentity, ledger: Ledger) -> Fixture {
        let docs = Arc::new(MemoryDocumentStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let reconciler = Reconciler::new(ledger.clone(), objects.clone());
        let session = Session::new(Arc::new(identity), docs.clone());
        let editor = Editor::new(docs.clone(), objects.clone(), session, reconciler, "images");
        Fixture {
            editor,
            docs,
            objects,
            ledger,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StaticIdentity::signed_in("u1"))
    }

    async fn saved_entry(f: &Fixture, images: &[&str]) -> EntryId {
        let mut entry = DiaryEntry::new(
            &OwnerId("u1".into()),
            Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 0).unwrap(),
        );
        entry.title = "Seaside".into();
        entry.mood = Mood::Calm;
        entry.images = images.iter().map(|s| s.to_string()).collect();
        for path in images {
            f.objects.insert(path, "content://old");
        }
        f.docs.upsert(entry).await.unwrap().id.unwrap()
    }

    #[tokio::test]
    async fn test_new_entry_saves_and_uploads() {
        let f = fixture();
        let mut session = f.editor.open(None).await.unwrap();
        assert_eq!(session.phase(), &EditPhase::Idle);

        session.set_title("Hiking");
        session.set_mood(Mood::Happy);
        let p1 = session.attach_image("content://media/1", "jpg").unwrap();
        let p2 = session.attach_image("content://media/2", "jpg").unwrap();

        let receipt = session.save().await.unwrap();
        assert_eq!(session.phase(), &EditPhase::Saved);
        assert_eq!(receipt.entry.images, [p1.clone(), p2.clone()]);
        assert_eq!(receipt.entry.owner_id, OwnerId("u1".into()));

        let report = receipt.reconcile.await.unwrap();
        assert_eq!(report.uploaded, 2);
        assert!(f.objects.contains(&p1));
        assert!(f.ledger.counts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_upsert_leaves_no_ledger_rows() {
        let f = fixture();
        f.docs.reject_writes(true);
        let mut session = f.editor.open(None).await.unwrap();
        session.attach_image("content://media/1", "jpg").unwrap();
        session.attach_image("content://media/2", "jpg").unwrap();

        let err = session.save().await.unwrap_err();
        assert!(matches!(err, ClientError::RemoteWrite(_)));
        assert!(matches!(session.phase(), EditPhase::Failed(_)));
        assert!(f.ledger.counts().await.unwrap().is_empty());
        assert!(f.docs.is_empty());
    }

    #[tokio::test]
    async fn test_edit_diff_is_recorded() {
        let f = fixture();
        let id = saved_entry(&f, &["images/u1/p1.jpg", "images/u1/p2.jpg"]).await;
        f.objects.set_online(false);

        let mut session = f.editor.open(Some(id.clone())).await.unwrap();
        assert_eq!(session.phase(), &EditPhase::Loaded);
        assert_eq!(session.title(), "Seaside");

        assert!(session.remove_image("images/u1/p1.jpg"));
        let p3 = session.attach_image("content://media/3", "png").unwrap();
        let receipt = session.save().await.unwrap();
        receipt.reconcile.await.unwrap();

        let uploads = f.ledger.list_uploads().await.unwrap();
        let deletes = f.ledger.list_deletes().await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].remote_path, p3);
        assert_eq!(uploads[0].source_uri, "content://media/3");
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].remote_path, "images/u1/p1.jpg");

        let stored = f.docs.get(&id).unwrap();
        assert_eq!(stored.images, ["images/u1/p2.jpg".to_string(), p3]);
        assert_eq!(stored.mood, Mood::Calm);
    }

    #[tokio::test]
    async fn test_open_missing_entry_is_already_deleted() {
        let f = fixture();
        let err = f.editor.open(Some(EntryId::new())).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound));
        assert_eq!(err.to_string(), "Diary entry already deleted");
        assert_eq!(f.docs.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_save_requires_sign_in() {
        let f = fixture_with(StaticIdentity::new());
        let mut session = f.editor.open(None).await.unwrap();
        session.set_title("Nobody");

        assert!(matches!(
            session.attach_image("content://media/1", "jpg"),
            Err(ClientError::Unauthenticated)
        ));
        assert!(matches!(
            session.save().await,
            Err(ClientError::Unauthenticated)
        ));
        assert!(f.docs.is_empty());
        assert!(f.ledger.counts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_existing_requires_sign_in() {
        let f = fixture_with(StaticIdentity::new());
        let id = saved_entry(&f, &[]).await;

        let err = f.editor.open(Some(id)).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));
        assert_eq!(f.docs.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_save_retry_after_ledger_failure_updates_same_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let f = fixture_on(StaticIdentity::signed_in("u1"), Ledger::open(&path).unwrap());
        f.objects.set_online(false);
        let side = Database::open_at(&path).unwrap();

        let mut session = f.editor.open(None).await.unwrap();
        session.set_title("Harbour");
        let attached = session.attach_image("content://media/4", "jpg").unwrap();

        side.conn()
            .execute_batch("ALTER TABLE pending_uploads RENAME TO pending_uploads_parked")
            .unwrap();
        let err = session.save().await.unwrap_err();
        assert!(matches!(err, ClientError::Store(_)));
        assert!(matches!(session.phase(), EditPhase::Failed(_)));
        assert_eq!(f.docs.len(), 1);

        side.conn()
            .execute_batch("ALTER TABLE pending_uploads_parked RENAME TO pending_uploads")
            .unwrap();
        let receipt = session.save().await.unwrap();
        receipt.reconcile.await.unwrap();

        assert_eq!(f.docs.len(), 1);
        let stored = f.docs.get(receipt.entry.id.as_ref().unwrap()).unwrap();
        assert_eq!(stored.images, [attached.clone()]);
        let uploads = f.ledger.list_uploads().await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].remote_path, attached);
    }

    #[tokio::test]
    async fn test_unresolved_download_url_keeps_path() {
        let f = fixture();
        let id = saved_entry(&f, &["images/u1/p1.jpg"]).await;
        f.objects.fail_path("images/u1/p1.jpg");

        let session = f.editor.open(Some(id)).await.unwrap();
        assert_eq!(
            session.images(),
            [GalleryImage {
                remote_path: "images/u1/p1.jpg".into(),
                kind: ImageKind::Existing { download_url: None },
            }]
        );
    }

    #[tokio::test]
    async fn test_attached_paths_are_unique() {
        let f = fixture();
        let mut session = f.editor.open(None).await.unwrap();
        let a = session.attach_image("content://media/7", "jpg").unwrap();
        let b = session.attach_image("content://media/7", "jpg").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("images/u1/7-"));
    }

    #[tokio::test]
    async fn test_saved_entry_becomes_baseline() {
        let f = fixture();
        let mut session = f.editor.open(None).await.unwrap();
        session.set_title("Draft");
        let first = session.save().await.unwrap().entry;

        session.set_description("more words");
        let second = session.save().await.unwrap().entry;

        assert_eq!(first.id, second.id);
        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(f.docs.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_enqueues_image_deletes() {
        let f = fixture();
        let id = saved_entry(&f, &["images/u1/p1.jpg"]).await;
        // upload from an earlier save still pending
        f.ledger
            .enqueue_upload("images/u1/p1.jpg", "content://old")
            .await
            .unwrap();
        f.objects.set_online(false);

        let mut session = f.editor.open(Some(id.clone())).await.unwrap();
        session.delete().await.unwrap().await.unwrap();

        assert_eq!(session.phase(), &EditPhase::Deleted);
        assert!(f.docs.get(&id).is_none());
        assert!(f.ledger.list_uploads().await.unwrap().is_empty());
        let deletes = f.ledger.list_deletes().await.unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].remote_path, "images/u1/p1.jpg");
    }

    #[tokio::test]
    async fn test_failed_delete_withdraws_rows() {
        let f = fixture();
        let id = saved_entry(&f, &["images/u1/p1.jpg", "images/u1/p2.jpg"]).await;
        let mut session = f.editor.open(Some(id.clone())).await.unwrap();

        f.docs.set_online(false);
        let err = session.delete().await.unwrap_err();
        assert!(matches!(err, ClientError::RemoteWrite(_)));
        assert!(f.ledger.counts().await.unwrap().is_empty());
        assert!(f.docs.get(&id).is_some());
    }
}
