use thiserror::Error;

/// Failures reported by the remote document store.
///
/// Cloneable so it can travel inside a [`RequestState`](crate::types::RequestState)
/// through `watch` channels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("User not logged in")]
    Unauthenticated,

    #[error("Diary entry not found")]
    NotFound,

    #[error("Document write rejected: {0}")]
    Rejected(String),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by the remote object store.
///
/// These are transient asset failures: the client absorbs them into the
/// pending-operation ledger and retries on the next reconciliation pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    #[error("Object not found")]
    NotFound,

    #[error("Upload session expired")]
    SessionExpired,

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Object store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Identity token rejected")]
    InvalidToken,

    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// A mood name outside the fixed catalogue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown mood: {0}")]
pub struct UnknownMood(pub String);
