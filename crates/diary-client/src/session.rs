//! Sign-in state and the screen the app starts on.

use std::sync::Arc;

use tracing::info;

use diary_shared::OwnerId;

use crate::error::{ClientError, Result};
use crate::remote::{DocumentStore, IdentityProvider, UserSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDestination {
    Home,
    Authentication,
}

#[derive(Clone)]
pub struct Session {
    identity: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
}

impl Session {
    pub fn new(identity: Arc<dyn IdentityProvider>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            identity,
            documents,
        }
    }

    /// Exchange a federated ID token for a session and scope the document
    /// store to the signed-in user.
    pub async fn sign_in(&self, id_token: &str) -> Result<UserSession> {
        let user = self.identity.sign_in(id_token).await?;
        self.documents.configure(&user.user_id).await?;
        info!(user = %user.user_id, "signed in");
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.identity.sign_out().await?;
        info!("signed out");
        Ok(())
    }

    pub fn current_user(&self) -> Option<UserSession> {
        self.identity.current_user().filter(|u| u.logged_in)
    }

    pub(crate) fn require_owner(&self) -> Result<OwnerId> {
        self.current_user()
            .map(|u| u.user_id)
            .ok_or(ClientError::Unauthenticated)
    }

    pub fn start_destination(&self) -> StartDestination {
        if self.current_user().is_some() {
            StartDestination::Home
        } else {
            StartDestination::Authentication
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.current_user())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryDocumentStore, StaticIdentity};
    use diary_shared::AuthError;

    #[tokio::test]
    async fn test_sign_in_configures_documents() {
        let docs = Arc::new(MemoryDocumentStore::new());
        let identity = Arc::new(StaticIdentity::new().with_account("google-token", "u1"));
        let session = Session::new(identity, docs.clone());

        assert_eq!(session.start_destination(), StartDestination::Authentication);

        let user = session.sign_in("google-token").await.unwrap();
        assert_eq!(user.user_id, OwnerId("u1".into()));
        assert_eq!(docs.configured_for(), Some(OwnerId("u1".into())));
        assert_eq!(session.start_destination(), StartDestination::Home);

        session.sign_out().await.unwrap();
        assert_eq!(session.start_destination(), StartDestination::Authentication);
    }

    #[tokio::test]
    async fn test_invalid_token_leaves_store_unconfigured() {
        let docs = Arc::new(MemoryDocumentStore::new());
        let session = Session::new(Arc::new(StaticIdentity::new()), docs.clone());

        let err = session.sign_in("bogus").await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthError::InvalidToken)));
        assert_eq!(docs.configured_for(), None);
        assert!(matches!(
            session.require_owner(),
            Err(ClientError::Unauthenticated)
        ));
    }
}
