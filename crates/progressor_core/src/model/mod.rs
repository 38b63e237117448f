//! Domain model for cards, time entries, rewards and skills.
//!
//! # Invariants
//! - Active-ness is carried only by `Card::is_active`, never by `CardStatus`.
//! - `CardStatus::Done` implies `Card::completed_at` is set.
//! - A `TimeEntry` is open while its end equals its start.

pub mod card;
pub mod completion;
pub mod project;
pub mod setting;
pub mod skill;

/// Identifier of a card row.
pub type CardId = i64;
/// Identifier of a project (card collection).
pub type ProjectId = i64;
/// Identifier of the tracking user.
pub type UserId = i64;
/// Identifier of a skill row.
pub type SkillId = i64;

/// Single-user deployments track everything under this user.
pub const DEFAULT_USER_ID: UserId = 1;
/// Project seeded by the first migration.
pub const INBOX_PROJECT_ID: ProjectId = 1;
