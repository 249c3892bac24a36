//! # diary-store
//!
//! Durable ledger of image operations the remote object store has not yet
//! confirmed, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the two ledger
//! tables. Every write commits before it returns, so a row enqueued before a
//! remote call is still there after a crash.

pub mod database;
pub mod deletes;
pub mod edits;
pub mod migrations;
pub mod models;
pub mod uploads;

mod error;

pub use database::Database;
pub use edits::RecordedEdit;
pub use error::StoreError;
pub use models::*;
