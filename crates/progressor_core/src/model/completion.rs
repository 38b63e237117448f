//! Completion reward records.

use super::{CardId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flat experience granted for finishing any card.
pub const BASE_EXP: i64 = 10;
/// Tracked minutes that earn one bonus experience point.
pub const MINUTES_PER_BONUS_EXP: i64 = 5;

/// Experience breakdown for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub base_exp: i64,
    pub time_bonus_exp: i64,
    /// Reserved; always zero for now.
    pub streak_bonus_exp: i64,
}

impl Reward {
    /// Reward for a card completed with `tracked_mins` on the clock.
    pub fn for_tracked_minutes(tracked_mins: i64) -> Self {
        Self {
            base_exp: BASE_EXP,
            time_bonus_exp: tracked_mins.max(0) / MINUTES_PER_BONUS_EXP,
            streak_bonus_exp: 0,
        }
    }

    pub fn total_exp(&self) -> i64 {
        self.base_exp + self.time_bonus_exp + self.streak_bonus_exp
    }
}

/// Reward row, unique per (card, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub id: i64,
    pub card_id: CardId,
    pub user_id: UserId,
    pub base_exp: i64,
    pub time_bonus_exp: i64,
    pub streak_bonus_exp: i64,
    pub total_exp: i64,
    pub completed_at: DateTime<Utc>,
}
