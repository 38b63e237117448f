//! Card and time-entry records.

use super::{CardId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a card.
///
/// `Active` exists for storage compatibility only. No transition assigns it;
/// whether a card is being timed is tracked by `Card::is_active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Todo,
    Done,
    Active,
}

impl CardStatus {
    /// Integer code persisted in `cards.status`.
    pub fn code(self) -> i64 {
        match self {
            Self::Todo => 0,
            Self::Done => 1,
            Self::Active => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Todo),
            1 => Some(Self::Done),
            2 => Some(Self::Active),
            _ => None,
        }
    }

    /// Whether `UpdateCardStatus` may move a card into this status.
    pub fn is_assignable(self) -> bool {
        matches!(self, Self::Todo | Self::Done)
    }
}

/// A trackable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub estimated_mins: i64,
    /// Sum of closed time-entry durations, in whole minutes.
    pub tracked_mins: i64,
    pub is_active: bool,
    pub status: CardStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a new card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCard {
    pub project_id: ProjectId,
    pub title: String,
    pub estimated_mins: i64,
}

/// Editable, non-status card fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardUpdate {
    pub title: String,
    pub description: Option<String>,
    pub estimated_mins: i64,
}

/// One contiguous timing interval of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: i64,
    pub card_id: CardId,
    pub start_time: DateTime<Utc>,
    /// Equal to `start_time` while the entry is open.
    pub end_time: DateTime<Utc>,
    pub duration_mins: i64,
}

impl TimeEntry {
    pub fn is_open(&self) -> bool {
        self.end_time == self.start_time
    }
}

/// Whole minutes between `start` and `end`, truncated; never negative.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(0)
}
