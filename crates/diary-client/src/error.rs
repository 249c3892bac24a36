use thiserror::Error;

use diary_shared::{AuthError, DocumentError};
use diary_store::StoreError;

/// Errors surfaced to the UI layer by client operations.
///
/// Object-store failures have no variant here: they are absorbed into the
/// ledger and retried by the reconciler.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("User not logged in")]
    Unauthenticated,

    #[error("Diary entry already deleted")]
    NotFound,

    #[error("Remote write failed: {0}")]
    RemoteWrite(String),

    #[error("No Internet Connection")]
    NoConnectivity,

    #[error("Sign-in failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Ledger error: {0}")]
    Store(#[from] StoreError),

    #[error("Background task failed: {0}")]
    Background(String),
}

impl From<DocumentError> for ClientError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Unauthenticated => ClientError::Unauthenticated,
            DocumentError::NotFound => ClientError::NotFound,
            DocumentError::Rejected(msg) | DocumentError::Unavailable(msg) => {
                ClientError::RemoteWrite(msg)
            }
        }
    }
}

impl From<tokio::task::JoinError> for ClientError {
    fn from(e: tokio::task::JoinError) -> Self {
        ClientError::Background(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
