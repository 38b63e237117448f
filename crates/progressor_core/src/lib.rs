//! Core domain logic for Progressor, a single-user card time tracker.
//!
//! At most one card is timed at any instant. Stopping a card credits whole
//! elapsed minutes, feeds skill progress and silences the idle timer, all
//! through in-process domain events.

pub mod clock;
pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{default_data_dir, ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, Store};
pub use events::{CardStarted, CardStopped, DomainEvent, EventBus, Topic};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::card::{Card, CardStatus, CardUpdate, TimeEntry};
pub use model::completion::{Reward, TaskCompletion};
pub use model::{CardId, ProjectId, SkillId, UserId, DEFAULT_USER_ID, INBOX_PROJECT_ID};
pub use repo::RepoError;
pub use service::card_service::{CardService, CardStopper};
pub use service::focus_timer::{
    FocusTimer, FocusTimerConfig, IdleAction, IdleNotifier, IdlePrompt, LogNotifier, TimerStatus,
};
pub use service::{ServiceError, ServiceResult};
pub use session::{Session, SessionOptions};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
