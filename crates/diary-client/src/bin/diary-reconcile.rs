//! # diary-reconcile
//!
//! Runs one reconciliation pass over the local ledger against a
//! filesystem object store, then exits. Useful to drain a ledger left
//! behind by a crashed client, or to inspect what is still pending.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use diary_client::backends::FsObjectStore;
use diary_client::{init_tracing, ClientConfig, Ledger, Reconciler};
use diary_shared::constants::APP_NAME;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting {} reconciler v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let ledger = Ledger::open(&config.db_path)
        .with_context(|| format!("opening ledger at {}", config.db_path.display()))?;
    let objects = FsObjectStore::new(config.object_root.clone())
        .await
        .with_context(|| format!("opening object root {}", config.object_root.display()))?;

    let reconciler = Reconciler::new(ledger, Arc::new(objects));
    let report = reconciler.run_pass().await?;
    let pending = reconciler.ledger().counts().await?;

    info!(
        uploaded = report.uploaded,
        deleted = report.deleted,
        failures = report.failures(),
        pending_uploads = pending.uploads,
        pending_deletes = pending.deletes,
        "Reconciliation finished"
    );

    Ok(())
}
