pub mod backends;
pub mod config;
pub mod error;
pub mod gallery;
pub mod home;
pub mod ledger;
pub mod reconciler;
pub mod remote;
pub mod session;
pub mod state;
pub mod write;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use home::HomeFeed;
pub use ledger::Ledger;
pub use reconciler::{Backoff, ReconcileReport, Reconciler};
pub use session::{Session, StartDestination};
pub use state::{Collaborators, DiaryApp};
pub use write::{EditPhase, Editor, SaveReceipt, WriteSession};

/// Install the global tracing subscriber (respects `RUST_LOG`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("diary_client=debug,diary_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
