//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Local};

use diary_shared::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_IMAGE_PREFIX, LEDGER_FILE_NAME,
};
use diary_store::Database;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path of the pending-operation ledger.
    /// Env: `DIARY_DB_PATH`
    /// Default: platform data dir, `ledger.db`
    pub db_path: PathBuf,

    /// Object-store folder holding every user's images.
    /// Env: `DIARY_IMAGE_PREFIX`
    /// Default: `images`
    pub image_prefix: String,

    /// Offset used to decide which calendar day an entry belongs to.
    /// Env: `DIARY_UTC_OFFSET_MINUTES`
    /// Default: the machine's current local offset.
    pub utc_offset: FixedOffset,

    /// First retry delay of the background reconciliation loop.
    /// Env: `DIARY_RECONCILE_BACKOFF_BASE_MS`
    /// Default: 2 s
    pub backoff_base: Duration,

    /// Retry delay ceiling of the background reconciliation loop.
    /// Env: `DIARY_RECONCILE_BACKOFF_MAX_MS`
    /// Default: 5 min
    pub backoff_max: Duration,

    /// Root directory of the filesystem object store (reconcile binary).
    /// Env: `DIARY_OBJECT_ROOT`
    /// Default: `./objects`
    pub object_root: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: Database::default_path()
                .unwrap_or_else(|_| PathBuf::from(LEDGER_FILE_NAME)),
            image_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            utc_offset: *Local::now().offset(),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            object_root: PathBuf::from("./objects"),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = get("DIARY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(prefix) = get("DIARY_IMAGE_PREFIX") {
            let prefix = prefix.trim().trim_matches('/');
            if prefix.is_empty() {
                tracing::warn!("Empty DIARY_IMAGE_PREFIX, using default");
            } else {
                config.image_prefix = prefix.to_string();
            }
        }

        if let Some(val) = get("DIARY_UTC_OFFSET_MINUTES") {
            match parse_offset_minutes(&val) {
                Some(offset) => config.utc_offset = offset,
                None => tracing::warn!(
                    value = %val,
                    "Invalid DIARY_UTC_OFFSET_MINUTES, using local offset"
                ),
            }
        }

        if let Some(val) = get("DIARY_RECONCILE_BACKOFF_BASE_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.backoff_base = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid DIARY_RECONCILE_BACKOFF_BASE_MS, using default"),
            }
        }

        if let Some(val) = get("DIARY_RECONCILE_BACKOFF_MAX_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.backoff_max = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid DIARY_RECONCILE_BACKOFF_MAX_MS, using default"),
            }
        }

        if config.backoff_max < config.backoff_base {
            config.backoff_max = config.backoff_base;
        }

        if let Some(path) = get("DIARY_OBJECT_ROOT") {
            config.object_root = PathBuf::from(path);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_offset_minutes(val: &str) -> Option<FixedOffset> {
    let minutes: i32 = val.trim().parse().ok()?;
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}
