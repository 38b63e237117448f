//! Domain events emitted by the card lifecycle engine.
//!
//! # Invariants
//! - Events are immutable values created after their transaction commits.
//! - Events live only for the current process; nothing is persisted.

mod bus;

pub use bus::{EventBus, EventHandler};

use crate::model::{CardId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Subscription key on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    CardStarted,
    CardStopped,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CardStarted => "card:started",
            Self::CardStopped => "card:stopped",
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A card began timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStarted {
    pub card_id: CardId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
}

/// A card stopped timing; `elapsed_minutes` was credited to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStopped {
    pub card_id: CardId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub elapsed_minutes: i64,
    pub stopped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    CardStarted(CardStarted),
    CardStopped(CardStopped),
}

impl DomainEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::CardStarted(_) => Topic::CardStarted,
            Self::CardStopped(_) => Topic::CardStopped,
        }
    }

    pub fn card_id(&self) -> CardId {
        match self {
            Self::CardStarted(event) => event.card_id,
            Self::CardStopped(event) => event.card_id,
        }
    }
}

impl From<CardStarted> for DomainEvent {
    fn from(value: CardStarted) -> Self {
        Self::CardStarted(value)
    }
}

impl From<CardStopped> for DomainEvent {
    fn from(value: CardStopped) -> Self {
        Self::CardStopped(value)
    }
}
