use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DocumentError, UnknownMood};

// Owner identity = the identity provider's user id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Remote document key, opaque to the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Angry,
    Bored,
    Calm,
    Depressed,
    Disappointed,
    Awful,
    Humorous,
    Lonely,
    Mysterious,
    Romantic,
    Shameful,
    Surprised,
    Suspicious,
    Tense,
}

impl Mood {
    pub const ALL: [Mood; 16] = [
        Mood::Neutral,
        Mood::Happy,
        Mood::Angry,
        Mood::Bored,
        Mood::Calm,
        Mood::Depressed,
        Mood::Disappointed,
        Mood::Awful,
        Mood::Humorous,
        Mood::Lonely,
        Mood::Mysterious,
        Mood::Romantic,
        Mood::Shameful,
        Mood::Surprised,
        Mood::Suspicious,
        Mood::Tense,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Mood::Neutral => "Neutral",
            Mood::Happy => "Happy",
            Mood::Angry => "Angry",
            Mood::Bored => "Bored",
            Mood::Calm => "Calm",
            Mood::Depressed => "Depressed",
            Mood::Disappointed => "Disappointed",
            Mood::Awful => "Awful",
            Mood::Humorous => "Humorous",
            Mood::Lonely => "Lonely",
            Mood::Mysterious => "Mysterious",
            Mood::Romantic => "Romantic",
            Mood::Shameful => "Shameful",
            Mood::Surprised => "Surprised",
            Mood::Suspicious => "Suspicious",
            Mood::Tense => "Tense",
        }
    }
}

impl FromStr for Mood {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Mood::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownMood(wanted.to_string()))
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A dated diary record as stored by the remote document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiaryEntry {
    /// Remote document key. `None` until the entry is first persisted.
    pub id: Option<EntryId>,
    pub owner_id: OwnerId,
    pub title: String,
    pub description: String,
    pub mood: Mood,
    pub timestamp: DateTime<Utc>,
    /// Remote object keys of the attached images, in gallery order.
    pub images: Vec<String>,
}

impl DiaryEntry {
    pub fn new(owner: &OwnerId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            owner_id: owner.clone(),
            title: String::new(),
            description: String::new(),
            mood: Mood::Neutral,
            timestamp,
            images: Vec::new(),
        }
    }
}

/// Loading state observed by the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestState<T> {
    #[default]
    Idle,
    Loading,
    Success(T),
    Error(DocumentError),
}

impl<T> RequestState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Loading)
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            RequestState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DocumentError> {
        match self {
            RequestState::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// All entries written on one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub entries: Vec<DiaryEntry>,
}

pub type DiaryFeed = RequestState<Vec<DayGroup>>;

/// Group entries by their calendar date in `offset`.
///
/// Days come out newest first, and entries inside a day newest first,
/// regardless of the order the store delivered them in.
pub fn group_by_day(mut entries: Vec<DiaryEntry>, offset: &FixedOffset) -> Vec<DayGroup> {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut groups: Vec<DayGroup> = Vec::new();
    for entry in entries {
        let date = entry.timestamp.with_timezone(offset).date_naive();
        match groups.last_mut() {
            Some(group) if group.date == date => group.entries.push(entry),
            _ => groups.push(DayGroup {
                date,
                entries: vec![entry],
            }),
        }
    }
    groups
}
