//! Application composition root.
//!
//! [`DiaryApp`] wires the ledger, the reconciler and the UI-facing
//! orchestrators to the collaborators the embedding application hands in.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::home::HomeFeed;
use crate::ledger::Ledger;
use crate::reconciler::{Backoff, Reconciler};
use crate::remote::{DocumentStore, IdentityProvider, NetworkStatus, ObjectStore};
use crate::session::{Session, StartDestination};
use crate::write::Editor;

/// Remote services and platform signals the app runs against.
pub struct Collaborators {
    pub documents: Arc<dyn DocumentStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub network: watch::Receiver<NetworkStatus>,
}

pub struct DiaryApp {
    config: ClientConfig,
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    network: watch::Receiver<NetworkStatus>,
    session: Session,
    reconciler: Reconciler,
}

impl DiaryApp {
    /// Open the ledger at `config.db_path` and build the app around it.
    pub fn new(config: ClientConfig, collaborators: Collaborators) -> Result<Self> {
        let ledger = Ledger::open(&config.db_path)?;
        Ok(Self::with_ledger(config, ledger, collaborators))
    }

    pub fn with_ledger(config: ClientConfig, ledger: Ledger, collaborators: Collaborators) -> Self {
        let Collaborators {
            documents,
            objects,
            identity,
            network,
        } = collaborators;

        Self {
            session: Session::new(identity, documents.clone()),
            reconciler: Reconciler::new(ledger, objects.clone()),
            config,
            documents,
            objects,
            network,
        }
    }

    /// Bring the app up.
    ///
    /// Scopes the document store to the signed-in user, if any, and starts
    /// draining whatever the ledger still holds from earlier runs.
    pub async fn start(&self) -> Result<StartDestination> {
        if let Some(user) = self.session.current_user() {
            self.documents.configure(&user.user_id).await?;
        }

        let pending = self.reconciler.ledger().counts().await?;
        info!(
            uploads = pending.uploads,
            deletes = pending.deletes,
            "starting diary client"
        );
        self.reconciler.trigger();

        Ok(self.session.start_destination())
    }

    /// Keep retrying failed ledger rows with the configured backoff until
    /// `cancel` fires.
    pub fn spawn_retry_loop(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);
        self.reconciler.spawn_retry_loop(backoff, cancel)
    }

    pub fn editor(&self) -> Editor {
        Editor::new(
            self.documents.clone(),
            self.objects.clone(),
            self.session.clone(),
            self.reconciler.clone(),
            self.config.image_prefix.clone(),
        )
    }

    pub fn home_feed(&self) -> HomeFeed {
        HomeFeed::new(
            self.documents.clone(),
            self.objects.clone(),
            self.session.clone(),
            self.reconciler.clone(),
            self.network.clone(),
            self.config.image_prefix.clone(),
            self.config.utc_offset,
        )
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
