//! Key/value runtime settings.

use serde::{Deserialize, Serialize};

/// Idle-timeout override for the focus timer, in whole minutes.
pub const ACTIVE_CARD_TIMEOUT_KEY: &str = "active_card_timeout";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    /// Human-readable label.
    pub display: String,
}
