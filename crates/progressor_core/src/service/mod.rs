//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own every transaction boundary; repositories never commit.
//! - React to domain events through bus subscriptions.
//!
//! # Invariants
//! - Card, time-entry and completion rows are mutated only by `CardService`.
//! - Event consumers log their failures and never surface them to publishers.

pub mod card_service;
mod error;
pub mod focus_timer;
pub mod progress_service;
pub mod project_service;
pub mod recovery;
pub mod setting_service;
pub mod skill_service;

pub use error::{ServiceError, ServiceResult};
