//! Card lifecycle engine.
//!
//! # Responsibility
//! - Drive the per-card timing state machine (`Todo ⇄ timing → Todo | Done`).
//! - Keep time-entry bookkeeping and completion rewards transactional.
//! - Publish `CardStarted`/`CardStopped` only after their transaction commits.
//!
//! # Invariants
//! - At most one card store-wide has `is_active = true`.
//! - An active card has exactly one open time entry; an inactive card has none.
//! - Starting a card while another is active stops the other inside the same
//!   transaction, and its `CardStopped` is published before the `CardStarted`.
//! - A (card, user) pair is rewarded at most once.

use super::project_service::ProjectValidator;
use super::{ServiceError, ServiceResult};
use crate::clock::{Clock, SystemClock};
use crate::db::Store;
use crate::events::{CardStarted, CardStopped, EventBus, Topic};
use crate::model::card::{elapsed_minutes, Card, CardStatus, CardUpdate, NewCard, TimeEntry};
use crate::model::completion::Reward;
use crate::model::{CardId, ProjectId, UserId, DEFAULT_USER_ID};
use crate::repo::card_repo::{CardRepository, SqliteCardRepository};
use crate::repo::completion_repo::{SqliteTaskCompletionRepository, TaskCompletionRepository};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::Connection;
use std::sync::Arc;

/// Anything that can force a card to stop timing.
pub trait CardStopper: Send + Sync {
    fn stop_card(&self, project_id: ProjectId, card_id: CardId) -> ServiceResult<()>;
}

/// Transactional card lifecycle service.
pub struct CardService {
    store: Arc<Store>,
    projects: Arc<dyn ProjectValidator>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    user_id: UserId,
}

impl CardService {
    pub fn new(store: Arc<Store>, projects: Arc<dyn ProjectValidator>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            projects,
            bus,
            clock: Arc::new(SystemClock),
            user_id: DEFAULT_USER_ID,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Lists the project's cards in `status`, oldest first.
    pub fn get_all(&self, project_id: ProjectId, status: CardStatus) -> ServiceResult<Vec<Card>> {
        self.validate_project(project_id)?;
        self.store
            .read(|conn| SqliteCardRepository::new(conn).list_cards(project_id, status))
            .map_err(Into::into)
    }

    pub fn get_card_by_id(&self, project_id: ProjectId, card_id: CardId) -> ServiceResult<Card> {
        self.validate_project(project_id)?;
        self.store.read(|conn| load_card(conn, project_id, card_id))
    }

    /// Returns the open time entry of an active card.
    ///
    /// Fails with `NotFound` when the card is not being timed.
    pub fn get_active_time_entry(
        &self,
        project_id: ProjectId,
        card_id: CardId,
    ) -> ServiceResult<TimeEntry> {
        self.validate_project(project_id)?;
        self.store.read(|conn| -> ServiceResult<TimeEntry> {
            let card = load_card(conn, project_id, card_id)?;
            if !card.is_active {
                return Err(time_entry_not_found(card_id));
            }
            SqliteCardRepository::new(conn)
                .get_open_time_entry(card_id)?
                .ok_or_else(|| time_entry_not_found(card_id))
        })
    }

    /// Store-wide lookup of the card currently being timed.
    pub fn get_active_card(&self) -> ServiceResult<Option<Card>> {
        self.store
            .read(|conn| SqliteCardRepository::new(conn).get_active_card())
            .map_err(Into::into)
    }

    pub fn list_time_entries(
        &self,
        project_id: ProjectId,
        card_id: CardId,
    ) -> ServiceResult<Vec<TimeEntry>> {
        self.validate_project(project_id)?;
        self.store.read(|conn| -> ServiceResult<Vec<TimeEntry>> {
            load_card(conn, project_id, card_id)?;
            SqliteCardRepository::new(conn)
                .list_time_entries(card_id)
                .map_err(Into::into)
        })
    }

    /// Creates a `Todo` card with nothing tracked.
    pub fn add_card(
        &self,
        project_id: ProjectId,
        title: &str,
        estimated_mins: u32,
    ) -> ServiceResult<CardId> {
        if title.trim().is_empty() {
            return Err(ServiceError::TitleRequired);
        }
        self.validate_project(project_id)?;

        let card = NewCard {
            project_id,
            title: title.to_string(),
            estimated_mins: i64::from(estimated_mins),
        };
        let now = self.clock.now();
        let card_id = self
            .store
            .execute(|tx| SqliteCardRepository::new(tx).create_card(&card, now))?;

        info!("event=card_add module=card_service status=ok project_id={project_id} card_id={card_id}");
        Ok(card_id)
    }

    pub fn delete_card(&self, project_id: ProjectId, card_id: CardId) -> ServiceResult<()> {
        self.validate_project(project_id)?;
        self.store
            .execute(|tx| SqliteCardRepository::new(tx).delete_card(project_id, card_id))?;
        info!("event=card_delete module=card_service status=ok project_id={project_id} card_id={card_id}");
        Ok(())
    }

    /// Rewrites title, description and estimate; status, tracked time and the
    /// active flag are left untouched.
    pub fn update_card(
        &self,
        project_id: ProjectId,
        card_id: CardId,
        update: &CardUpdate,
    ) -> ServiceResult<()> {
        self.validate_project(project_id)?;
        if update.title.trim().is_empty() {
            return Err(ServiceError::InvalidUpdate("card title must not be empty"));
        }
        if update.estimated_mins < 0 {
            return Err(ServiceError::InvalidUpdate("estimate must not be negative"));
        }

        let now = self.clock.now();
        self.store.execute(|tx| -> ServiceResult<()> {
            let mut card = load_card(tx, project_id, card_id)?;
            card.title = update.title.clone();
            card.description = update
                .description
                .as_ref()
                .filter(|description| !description.is_empty())
                .cloned();
            card.estimated_mins = update.estimated_mins;
            SqliteCardRepository::new(tx).update_card(&card, now)?;
            Ok(())
        })
    }

    /// Moves a card to `Todo` or `Done`.
    ///
    /// `Done` stamps the completion time and rewards the (card, user) pair the
    /// first time only; later `Done` transitions leave the reward untouched.
    pub fn update_card_status(
        &self,
        project_id: ProjectId,
        card_id: CardId,
        status: CardStatus,
    ) -> ServiceResult<()> {
        self.validate_project(project_id)?;
        if !status.is_assignable() {
            return Err(ServiceError::InvalidStatus(status));
        }

        let now = self.clock.now();
        let user_id = self.user_id;
        let rewarded = self.store.execute(|tx| -> ServiceResult<Option<i64>> {
            let mut card = load_card(tx, project_id, card_id)?;
            card.status = status;
            card.completed_at = match status {
                CardStatus::Done => Some(now),
                _ => None,
            };
            SqliteCardRepository::new(tx).update_card(&card, now)?;

            if status != CardStatus::Done {
                return Ok(None);
            }
            let completions = SqliteTaskCompletionRepository::new(tx);
            if completions.get_task_completion(card_id, user_id)?.is_some() {
                return Ok(None);
            }
            let reward = Reward::for_tracked_minutes(card.tracked_mins);
            let completion = completions.create_task_completion(card_id, user_id, &reward, now)?;
            Ok(Some(completion.total_exp))
        })?;

        match rewarded {
            Some(total_exp) => info!(
                "event=card_status module=card_service status=ok card_id={card_id} new_status={status:?} reward_total_exp={total_exp}"
            ),
            None => info!(
                "event=card_status module=card_service status=ok card_id={card_id} new_status={status:?} reward=none"
            ),
        }
        Ok(())
    }

    /// Starts timing `card_id`, stopping any other active card first.
    pub fn start_card(&self, project_id: ProjectId, card_id: CardId) -> ServiceResult<()> {
        self.validate_project(project_id)?;

        let (stopped, started) = self.store.execute(|tx| -> ServiceResult<_> {
            let card = load_card(tx, project_id, card_id)?;
            if card.is_active {
                return Err(ServiceError::AlreadyActive(card_id));
            }

            let stopped = match SqliteCardRepository::new(tx).get_active_card()? {
                Some(active) => Some(self.stop_in_tx(tx, &active)?),
                None => None,
            };
            let started = self.start_in_tx(tx, &card)?;
            Ok((stopped, started))
        })?;

        if let Some(stopped) = stopped {
            info!(
                "event=card_stop module=card_service status=ok card_id={} elapsed_mins={} reason=superseded",
                stopped.card_id, stopped.elapsed_minutes
            );
            self.bus.publish(Topic::CardStopped, stopped.into());
        }
        info!("event=card_start module=card_service status=ok project_id={project_id} card_id={card_id}");
        self.bus.publish(Topic::CardStarted, started.into());
        Ok(())
    }

    /// Stops timing `card_id` and credits the elapsed whole minutes.
    pub fn stop_card(&self, project_id: ProjectId, card_id: CardId) -> ServiceResult<()> {
        self.validate_project(project_id)?;

        let stopped = self.store.execute(|tx| -> ServiceResult<CardStopped> {
            let card = load_card(tx, project_id, card_id)?;
            self.stop_in_tx(tx, &card)
        })?;

        info!(
            "event=card_stop module=card_service status=ok card_id={card_id} elapsed_mins={}",
            stopped.elapsed_minutes
        );
        self.bus.publish(Topic::CardStopped, stopped.into());
        Ok(())
    }

    /// Stops whichever card was left active, if any.
    ///
    /// Returns the id of the card that was stopped. The open entry is credited
    /// up to now even though nobody may have been working on it.
    pub fn cleanup(&self) -> ServiceResult<Option<CardId>> {
        info!("event=card_cleanup module=card_service status=start");
        let Some(active) = self.get_active_card()? else {
            info!("event=card_cleanup module=card_service status=ok stopped=none");
            return Ok(None);
        };

        self.stop_card(active.project_id, active.id)?;
        info!(
            "event=card_cleanup module=card_service status=ok stopped_card_id={}",
            active.id
        );
        Ok(Some(active.id))
    }

    fn validate_project(&self, project_id: ProjectId) -> ServiceResult<()> {
        if self.projects.is_valid_project(project_id)? {
            return Ok(());
        }
        warn!("event=project_validate module=card_service status=error project_id={project_id} error_code=invalid_project");
        Err(ServiceError::InvalidProject(project_id))
    }

    fn stop_in_tx(&self, conn: &Connection, card: &Card) -> ServiceResult<CardStopped> {
        if !card.is_active {
            return Err(ServiceError::AlreadyStopped(card.id));
        }

        let repo = SqliteCardRepository::new(conn);
        let entry = repo
            .get_open_time_entry(card.id)?
            .ok_or_else(|| time_entry_not_found(card.id))?;

        let now = self.monotonic_now(entry.start_time);
        let elapsed = elapsed_minutes(entry.start_time, now);
        repo.close_time_entry(entry.id, now, elapsed)?;
        repo.set_card_active(card.id, false, card.tracked_mins + elapsed, now)?;
        debug!(
            "event=time_entry_close module=card_service status=ok card_id={} entry_id={} duration_mins={elapsed}",
            card.id, entry.id
        );

        Ok(CardStopped {
            card_id: card.id,
            project_id: card.project_id,
            user_id: self.user_id,
            elapsed_minutes: elapsed,
            stopped_at: now,
        })
    }

    fn start_in_tx(&self, conn: &Connection, card: &Card) -> ServiceResult<CardStarted> {
        let repo = SqliteCardRepository::new(conn);
        let now = self.clock.now();
        repo.set_card_active(card.id, true, card.tracked_mins, now)?;
        let entry_id = repo.create_time_entry(card.id, now)?;
        debug!(
            "event=time_entry_open module=card_service status=ok card_id={} entry_id={entry_id}",
            card.id
        );

        Ok(CardStarted {
            card_id: card.id,
            project_id: card.project_id,
            user_id: self.user_id,
            started_at: now,
        })
    }

    /// Current time, never earlier than `floor` (a clock stepping backwards
    /// must not produce an entry ending before it started).
    fn monotonic_now(&self, floor: DateTime<Utc>) -> DateTime<Utc> {
        self.clock.now().max(floor)
    }
}

impl CardStopper for CardService {
    fn stop_card(&self, project_id: ProjectId, card_id: CardId) -> ServiceResult<()> {
        CardService::stop_card(self, project_id, card_id)
    }
}

fn load_card(conn: &Connection, project_id: ProjectId, card_id: CardId) -> ServiceResult<Card> {
    SqliteCardRepository::new(conn)
        .get_card(project_id, card_id)?
        .ok_or(ServiceError::NotFound {
            entity: "card",
            id: card_id,
        })
}

fn time_entry_not_found(card_id: CardId) -> ServiceError {
    ServiceError::NotFound {
        entity: "active time entry",
        id: card_id,
    }
}
