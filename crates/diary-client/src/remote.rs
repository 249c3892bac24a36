//! Seams to the managed services the client depends on.
//!
//! The document store, the object store and the identity provider are
//! external systems. The client only talks to them through these traits;
//! concrete clients are constructed by the embedding application and passed
//! in at the composition root.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use diary_shared::{AuthError, DiaryEntry, DocumentError, EntryId, ObjectError, OwnerId};

/// Live query result: a new full result set every time it changes.
pub type EntryStream = BoxStream<'static, Result<Vec<DiaryEntry>, DocumentError>>;

/// Live query over a single entry.
pub type SingleEntryStream = BoxStream<'static, Result<DiaryEntry, DocumentError>>;

/// Remote document store holding diary entries.
///
/// Live streams keep a subscription open against the store for as long as
/// they are alive; dropping the stream ends the subscription.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Scope the store to the given user's documents.
    async fn configure(&self, owner: &OwnerId) -> Result<(), DocumentError>;

    /// Every entry of `owner`, newest first.
    fn query_all(&self, owner: &OwnerId) -> EntryStream;

    /// Entries of `owner` with `start <= timestamp < end`, newest first.
    fn query_by_date_range(
        &self,
        owner: &OwnerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EntryStream;

    fn query_by_id(&self, id: &EntryId) -> SingleEntryStream;

    /// Create the entry when it has no id, otherwise update it by id.
    async fn upsert(&self, entry: DiaryEntry) -> Result<DiaryEntry, DocumentError>;

    async fn delete(&self, id: &EntryId) -> Result<DiaryEntry, DocumentError>;

    async fn delete_all_for_owner(&self, owner: &OwnerId) -> Result<(), DocumentError>;
}

/// Remote object store holding diary images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a resumable upload session for `path` and return its token.
    async fn open_session(&self, path: &str) -> Result<String, ObjectError>;

    /// Transfer `source_uri` to `path` through `session`, resuming after
    /// whatever the session already received.
    async fn put_resumable(
        &self,
        path: &str,
        source_uri: &str,
        session: &str,
    ) -> Result<(), ObjectError>;

    /// Remove `path`. Returns [`ObjectError::NotFound`] when it was already gone.
    async fn delete(&self, path: &str) -> Result<(), ObjectError>;

    async fn download_url(&self, path: &str) -> Result<String, ObjectError>;

    /// Keys of every object under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectError>;
}

/// A signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: OwnerId,
    pub logged_in: bool,
}

/// Federated identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a federated ID token for a session.
    async fn sign_in(&self, id_token: &str) -> Result<UserSession, AuthError>;

    fn current_user(&self) -> Option<UserSession>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Device connectivity as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkStatus {
    Available,
    #[default]
    Unavailable,
    Losing,
    Lost,
}
