//! Skills and accrued per-skill progress.

use super::{SkillId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cumulative tracked minutes for one (user, skill) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillProgress {
    pub user_id: UserId,
    pub skill_id: SkillId,
    pub total_minutes_tracked: i64,
    pub last_updated: DateTime<Utc>,
}
