//! Startup/shutdown normalisation of the single-active invariant.

use super::card_service::CardService;
use super::focus_timer::FocusTimer;
use super::ServiceResult;
use crate::model::CardId;
use log::info;
use std::sync::Arc;

/// Stops any card a previous process left timing. Stateless and idempotent.
pub struct RecoverySweep {
    cards: Arc<CardService>,
    timer: Option<Arc<FocusTimer>>,
}

impl RecoverySweep {
    pub fn new(cards: Arc<CardService>, timer: Option<Arc<FocusTimer>>) -> Self {
        Self { cards, timer }
    }

    /// Returns the id of the card that was stopped, if any.
    pub fn on_startup(&self) -> ServiceResult<Option<CardId>> {
        info!("event=recovery_sweep module=recovery status=start phase=startup");
        self.cards.cleanup()
    }

    /// Shuts the focus timer down, then stops the active card.
    pub fn on_shutdown(&self) -> ServiceResult<Option<CardId>> {
        info!("event=recovery_sweep module=recovery status=start phase=shutdown");
        if let Some(timer) = &self.timer {
            timer.shutdown();
        }
        self.cards.cleanup()
    }
}
