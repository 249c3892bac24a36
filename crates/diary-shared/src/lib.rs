//! # diary-shared
//!
//! Domain types shared by the diary store and client crates: diary entries,
//! moods, the day-grouped feed, remote error types and image path rules.

pub mod constants;
pub mod error;
pub mod paths;
pub mod types;

pub use error::{AuthError, DocumentError, ObjectError, UnknownMood};
pub use types::{
    group_by_day, DayGroup, DiaryEntry, DiaryFeed, EntryId, Mood, OwnerId, RequestState,
};
