/// Application name
pub const APP_NAME: &str = "Diary";

/// Root folder of every user's images in the object store
pub const DEFAULT_IMAGE_PREFIX: &str = "images";

/// File name of the pending-operation ledger inside the data directory
pub const LEDGER_FILE_NAME: &str = "ledger.db";

/// Reconciliation retry backoff, first delay in milliseconds
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;

/// Reconciliation retry backoff ceiling in milliseconds (5 minutes)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Extension used when an attached image has none
pub const FALLBACK_IMAGE_EXTENSION: &str = "jpg";
