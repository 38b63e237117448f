//! Skill use-case service and skill-progress accrual.
//!
//! # Responsibility
//! - CRUD over one user's skills.
//! - Credit tracked minutes of stopped cards to the skills of their project.
//!
//! # Invariants
//! - Accrual runs only from bus deliveries; its failures are logged and
//!   never reach the card operation that published the event.
//! - All progress upserts for one `CardStopped` commit together or not at all.

use super::project_service::SkillCatalog;
use super::{ServiceError, ServiceResult};
use crate::clock::{Clock, SystemClock};
use crate::db::Store;
use crate::events::{CardStopped, DomainEvent, EventBus, Topic};
use crate::model::skill::{Skill, SkillProgress};
use crate::model::{SkillId, UserId, DEFAULT_USER_ID};
use crate::repo::skill_repo::{SkillRepository, SqliteSkillRepository};
use log::{debug, error, info};
use std::sync::{Arc, Weak};

pub struct SkillService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    user_id: UserId,
}

impl SkillService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
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

    /// Creates a skill owned by the service's user.
    pub fn create_skill(&self, name: &str, description: Option<&str>) -> ServiceResult<Skill> {
        let name = require_name(name)?;
        let description = description.filter(|value| !value.trim().is_empty());
        let now = self.clock.now();
        let user_id = self.user_id;
        let skill = self.store.execute(|tx| {
            SqliteSkillRepository::new(tx).create_skill(user_id, name, description, now)
        })?;
        info!(
            "event=skill_create module=skill_service status=ok skill_id={}",
            skill.id
        );
        Ok(skill)
    }

    pub fn get_skill_by_id(&self, skill_id: SkillId) -> ServiceResult<Skill> {
        self.store
            .read(|conn| SqliteSkillRepository::new(conn).get_skill(skill_id))?
            .ok_or(ServiceError::NotFound {
                entity: "skill",
                id: skill_id,
            })
    }

    pub fn get_skills_by_user(&self) -> ServiceResult<Vec<Skill>> {
        self.store
            .read(|conn| SqliteSkillRepository::new(conn).list_skills_by_user(self.user_id))
            .map_err(Into::into)
    }

    pub fn update_skill(
        &self,
        skill_id: SkillId,
        name: &str,
        description: Option<&str>,
    ) -> ServiceResult<()> {
        let name = require_name(name)?;
        let description = description.filter(|value| !value.trim().is_empty());
        self.store
            .execute(|tx| SqliteSkillRepository::new(tx).update_skill(skill_id, name, description))
            .map_err(Into::into)
    }

    /// Deletes the skill; its project links and progress rows cascade.
    pub fn delete_skill(&self, skill_id: SkillId) -> ServiceResult<()> {
        self.store
            .execute(|tx| SqliteSkillRepository::new(tx).delete_skill(skill_id))?;
        info!("event=skill_delete module=skill_service status=ok skill_id={skill_id}");
        Ok(())
    }

    /// `None` until some tracked time was credited to the skill.
    pub fn get_user_skill_progress(&self, skill_id: SkillId) -> ServiceResult<Option<SkillProgress>> {
        self.store
            .read(|conn| {
                SqliteSkillRepository::new(conn).get_skill_progress(self.user_id, skill_id)
            })
            .map_err(Into::into)
    }
}

fn require_name(name: &str) -> ServiceResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidUpdate("skill name must not be blank"));
    }
    Ok(name)
}

/// `card:stopped` subscriber that accumulates minutes per (user, skill).
pub struct SkillProgressAccrual {
    store: Arc<Store>,
    catalog: Arc<dyn SkillCatalog>,
    clock: Arc<dyn Clock>,
}

impl SkillProgressAccrual {
    pub fn new(store: Arc<Store>, catalog: Arc<dyn SkillCatalog>) -> Self {
        Self {
            store,
            catalog,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribes to `card:stopped`. The bus holds only a weak reference.
    pub fn register_event_handlers(self: &Arc<Self>, bus: &EventBus) {
        let accrual: Weak<Self> = Arc::downgrade(self);
        bus.subscribe(Topic::CardStopped, move |event| {
            if let Some(accrual) = accrual.upgrade() {
                accrual.handle_event(event);
            }
        });
    }

    /// Credits `event.elapsed_minutes` to every skill linked to the event's
    /// project, in one transaction.
    ///
    /// Returns the number of skills credited.
    pub fn accrue(&self, event: &CardStopped) -> ServiceResult<usize> {
        let skills = self.catalog.skills_for_project(event.project_id)?;
        if skills.is_empty() {
            return Ok(0);
        }

        let now = self.clock.now();
        self.store.execute(|tx| -> ServiceResult<usize> {
            let repo = SqliteSkillRepository::new(tx);
            for skill in &skills {
                repo.upsert_skill_progress(event.user_id, skill.id, event.elapsed_minutes, now)?;
            }
            Ok(skills.len())
        })
    }

    fn handle_event(&self, event: &DomainEvent) {
        let DomainEvent::CardStopped(stopped) = event else {
            return;
        };

        match self.accrue(stopped) {
            Ok(0) => debug!(
                "event=skill_accrue module=skill_service status=skip card_id={} reason=no_skills",
                stopped.card_id
            ),
            Ok(count) => info!(
                "event=skill_accrue module=skill_service status=ok card_id={} project_id={} skills={count} minutes={}",
                stopped.card_id, stopped.project_id, stopped.elapsed_minutes
            ),
            Err(err) => error!(
                "event=skill_accrue module=skill_service status=error card_id={} project_id={} error={err}",
                stopped.card_id, stopped.project_id
            ),
        }
    }
}
