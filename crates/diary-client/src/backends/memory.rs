//! In-process implementations of the remote collaborators.
//!
//! Used for development and tests: they behave like the managed services
//! (live queries, resumable sessions, idempotent deletes) and expose
//! switches to simulate outages.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;
use uuid::Uuid;

use diary_shared::{AuthError, DiaryEntry, DocumentError, EntryId, ObjectError, OwnerId};

use crate::remote::{
    DocumentStore, EntryStream, IdentityProvider, ObjectStore, SingleEntryStream, UserSession,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DocState {
    entries: HashMap<EntryId, DiaryEntry>,
    configured_for: Option<OwnerId>,
    online: bool,
    reject_writes: bool,
}

/// Document store with live queries.
///
/// Every mutation bumps a version counter; each live stream re-reads its
/// query whenever the version changes.
pub struct MemoryDocumentStore {
    state: Arc<Mutex<DocState>>,
    version: watch::Sender<u64>,
    subscriptions: Arc<AtomicUsize>,
}

struct SubscriptionGuard(Arc<AtomicUsize>);

impl SubscriptionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(DocState {
                online: true,
                ..Default::default()
            })),
            version,
            subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of live query streams currently alive.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        lock(&self.state).online = online;
    }

    /// Make every write fail with [`DocumentError::Rejected`].
    pub fn reject_writes(&self, reject: bool) {
        lock(&self.state).reject_writes = reject;
    }

    pub fn configured_for(&self) -> Option<OwnerId> {
        lock(&self.state).configured_for.clone()
    }

    pub fn get(&self, id: &EntryId) -> Option<DiaryEntry> {
        lock(&self.state).entries.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    fn check_writable(state: &DocState) -> Result<(), DocumentError> {
        if !state.online {
            return Err(DocumentError::Unavailable("document store offline".into()));
        }
        if state.reject_writes {
            return Err(DocumentError::Rejected("write rejected by store".into()));
        }
        Ok(())
    }

    fn live<T, F>(&self, snapshot: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: Fn(&DocState) -> T + Send + Sync + 'static,
    {
        let snapshot = Arc::new(snapshot);
        let rx = self.version.subscribe();
        let guard = SubscriptionGuard::new(self.subscriptions.clone());
        let state = self.state.clone();

        stream::unfold((rx, guard, true), move |(mut rx, guard, first)| {
            let state = state.clone();
            let snapshot = snapshot.clone();
            async move {
                if first {
                    let _ = rx.borrow_and_update();
                } else if rx.changed().await.is_err() {
                    return None;
                }
                let item = snapshot(&lock(&state));
                Some((item, (rx, guard, false)))
            }
        })
        .boxed()
    }

    fn owner_entries(
        state: &DocState,
        owner: &OwnerId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Vec<DiaryEntry> {
        let mut entries: Vec<DiaryEntry> = state
            .entries
            .values()
            .filter(|e| e.owner_id == *owner)
            .filter(|e| match range {
                Some((start, end)) => e.timestamp >= start && e.timestamp < end,
                None => true,
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn configure(&self, owner: &OwnerId) -> Result<(), DocumentError> {
        lock(&self.state).configured_for = Some(owner.clone());
        Ok(())
    }

    fn query_all(&self, owner: &OwnerId) -> EntryStream {
        let owner = owner.clone();
        self.live(move |state: &DocState| Ok(Self::owner_entries(state, &owner, None)))
    }

    fn query_by_date_range(
        &self,
        owner: &OwnerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EntryStream {
        let owner = owner.clone();
        self.live(move |state: &DocState| {
            Ok(Self::owner_entries(state, &owner, Some((start, end))))
        })
    }

    fn query_by_id(&self, id: &EntryId) -> SingleEntryStream {
        let id = id.clone();
        self.live(move |state: &DocState| {
            state.entries.get(&id).cloned().ok_or(DocumentError::NotFound)
        })
    }

    async fn upsert(&self, mut entry: DiaryEntry) -> Result<DiaryEntry, DocumentError> {
        let stored = {
            let mut state = lock(&self.state);
            Self::check_writable(&state)?;

            match entry.id.clone() {
                Some(id) => {
                    let existing = state.entries.get_mut(&id).ok_or(DocumentError::NotFound)?;
                    existing.title = entry.title;
                    existing.description = entry.description;
                    existing.mood = entry.mood;
                    existing.timestamp = entry.timestamp;
                    existing.images = entry.images;
                    existing.clone()
                }
                None => {
                    let id = EntryId::new();
                    entry.id = Some(id.clone());
                    state.entries.insert(id, entry.clone());
                    entry
                }
            }
        };
        self.bump();
        Ok(stored)
    }

    async fn delete(&self, id: &EntryId) -> Result<DiaryEntry, DocumentError> {
        let removed = {
            let mut state = lock(&self.state);
            Self::check_writable(&state)?;
            state.entries.remove(id).ok_or(DocumentError::NotFound)?
        };
        self.bump();
        Ok(removed)
    }

    async fn delete_all_for_owner(&self, owner: &OwnerId) -> Result<(), DocumentError> {
        {
            let mut state = lock(&self.state);
            Self::check_writable(&state)?;
            state.entries.retain(|_, e| e.owner_id != *owner);
        }
        self.bump();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// A remote call seen by [`MemoryObjectStore`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectCall {
    OpenSession(String),
    Put(String),
    Delete(String),
    DownloadUrl(String),
    List(String),
}

struct ObjectState {
    // path -> source it was uploaded from
    objects: BTreeMap<String, String>,
    // session token -> path
    sessions: HashMap<String, String>,
    online: bool,
    failing: HashSet<String>,
    fail_transfers: bool,
    calls: Vec<ObjectCall>,
}

pub struct MemoryObjectStore {
    state: Mutex<ObjectState>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ObjectState {
                objects: BTreeMap::new(),
                sessions: HashMap::new(),
                online: true,
                failing: HashSet::new(),
                fail_transfers: false,
                calls: Vec::new(),
            }),
        }
    }

    /// Put an object in place without going through a session.
    pub fn insert(&self, path: &str, source_uri: &str) {
        lock(&self.state)
            .objects
            .insert(path.to_string(), source_uri.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.state).objects.contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        lock(&self.state).objects.keys().cloned().collect()
    }

    pub fn set_online(&self, online: bool) {
        lock(&self.state).online = online;
    }

    /// Fail every operation on `path` until [`MemoryObjectStore::unfail_path`].
    pub fn fail_path(&self, path: &str) {
        lock(&self.state).failing.insert(path.to_string());
    }

    pub fn unfail_path(&self, path: &str) {
        lock(&self.state).failing.remove(path);
    }

    /// Interrupt every transfer after its session was opened.
    pub fn fail_transfers(&self, fail: bool) {
        lock(&self.state).fail_transfers = fail;
    }

    pub fn calls(&self) -> Vec<ObjectCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    fn begin(&self, call: ObjectCall, path: &str) -> Result<MutexGuard<'_, ObjectState>, ObjectError> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        if !state.online {
            return Err(ObjectError::Unavailable("object store offline".into()));
        }
        if state.failing.contains(path) {
            return Err(ObjectError::Transfer(format!("injected failure for {path}")));
        }
        Ok(state)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn open_session(&self, path: &str) -> Result<String, ObjectError> {
        let mut state = self.begin(ObjectCall::OpenSession(path.to_string()), path)?;
        let token = Uuid::new_v4().to_string();
        state.sessions.insert(token.clone(), path.to_string());
        Ok(token)
    }

    async fn put_resumable(
        &self,
        path: &str,
        source_uri: &str,
        session: &str,
    ) -> Result<(), ObjectError> {
        let mut state = self.begin(ObjectCall::Put(path.to_string()), path)?;
        if state.sessions.get(session).map(String::as_str) != Some(path) {
            return Err(ObjectError::SessionExpired);
        }
        if state.fail_transfers {
            return Err(ObjectError::Transfer("connection reset mid-transfer".into()));
        }
        state.sessions.remove(session);
        state.objects.insert(path.to_string(), source_uri.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), ObjectError> {
        let mut state = self.begin(ObjectCall::Delete(path.to_string()), path)?;
        match state.objects.remove(path) {
            Some(_) => Ok(()),
            None => Err(ObjectError::NotFound),
        }
    }

    async fn download_url(&self, path: &str) -> Result<String, ObjectError> {
        let state = self.begin(ObjectCall::DownloadUrl(path.to_string()), path)?;
        if state.objects.contains_key(path) {
            Ok(format!("memory://{path}"))
        } else {
            Err(ObjectError::NotFound)
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectError> {
        let state = self.begin(ObjectCall::List(prefix.to_string()), prefix)?;
        Ok(state
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identity provider with a fixed table of accepted ID tokens.
pub struct StaticIdentity {
    accounts: HashMap<String, OwnerId>,
    current: Mutex<Option<UserSession>>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            current: Mutex::new(None),
        }
    }

    /// Accept `id_token` as proof of `user_id`.
    pub fn with_account(mut self, id_token: &str, user_id: &str) -> Self {
        self.accounts
            .insert(id_token.to_string(), OwnerId(user_id.to_string()));
        self
    }

    /// Start already signed in as `user_id`.
    pub fn signed_in(user_id: &str) -> Self {
        let identity = Self::new();
        *lock(&identity.current) = Some(UserSession {
            user_id: OwnerId(user_id.to_string()),
            logged_in: true,
        });
        identity
    }
}

impl Default for StaticIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn sign_in(&self, id_token: &str) -> Result<UserSession, AuthError> {
        let user_id = self
            .accounts
            .get(id_token)
            .cloned()
            .ok_or(AuthError::InvalidToken)?;
        let session = UserSession {
            user_id,
            logged_in: true,
        };
        *lock(&self.current) = Some(session.clone());
        Ok(session)
    }

    fn current_user(&self) -> Option<UserSession> {
        lock(&self.current).clone()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *lock(&self.current) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(owner: &str, title: &str) -> DiaryEntry {
        let mut e = DiaryEntry::new(
            &OwnerId(owner.into()),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        );
        e.title = title.into();
        e
    }

    #[tokio::test]
    async fn test_live_query_emits_on_change() {
        let docs = MemoryDocumentStore::new();
        let owner = OwnerId("u1".into());
        let mut stream = docs.query_all(&owner);

        assert!(stream.next().await.unwrap().unwrap().is_empty());

        docs.upsert(entry("u1", "first")).await.unwrap();
        let entries = stream.next().await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "first");
    }

    #[tokio::test]
    async fn test_dropping_stream_ends_subscription() {
        let docs = MemoryDocumentStore::new();
        let stream = docs.query_all(&OwnerId("u1".into()));
        assert_eq!(docs.active_subscriptions(), 1);
        drop(stream);
        assert_eq!(docs.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_update_of_missing_entry_is_not_found() {
        let docs = MemoryDocumentStore::new();
        let mut e = entry("u1", "ghost");
        e.id = Some(EntryId::new());
        assert_eq!(docs.upsert(e).await, Err(DocumentError::NotFound));
    }

    #[tokio::test]
    async fn test_object_delete_is_idempotent() {
        let objects = MemoryObjectStore::new();
        objects.insert("images/u/a.jpg", "content://a");
        assert!(objects.delete("images/u/a.jpg").await.is_ok());
        assert_eq!(
            objects.delete("images/u/a.jpg").await,
            Err(ObjectError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_static_identity() {
        let identity = StaticIdentity::new().with_account("token-1", "u1");
        assert!(identity.current_user().is_none());
        assert_eq!(identity.sign_in("nope").await, Err(AuthError::InvalidToken));

        let session = identity.sign_in("token-1").await.unwrap();
        assert_eq!(session.user_id, OwnerId("u1".into()));
        identity.sign_out().await.unwrap();
        assert!(identity.current_user().is_none());
    }
}
