//! Project use-case service.
//!
//! # Responsibility
//! - Answer "is this a valid card collection" for the lifecycle engine.
//! - Maintain project ↔ skill links consumed by skill accrual.

use super::{ServiceError, ServiceResult};
use crate::clock::{Clock, SystemClock};
use crate::db::Store;
use crate::model::project::Project;
use crate::model::skill::Skill;
use crate::model::{ProjectId, SkillId};
use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use log::warn;
use std::sync::Arc;

/// Validates collection references before any card operation.
pub trait ProjectValidator: Send + Sync {
    fn is_valid_project(&self, project_id: ProjectId) -> ServiceResult<bool>;
}

/// Resolves the skills a project's tracked time counts towards.
pub trait SkillCatalog: Send + Sync {
    fn skills_for_project(&self, project_id: ProjectId) -> ServiceResult<Vec<Skill>>;
}

pub struct ProjectService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl ProjectService {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn list_projects(&self) -> ServiceResult<Vec<Project>> {
        self.store
            .read(|conn| SqliteProjectRepository::new(conn).list_projects())
            .map_err(Into::into)
    }

    /// Creates a project; blank names are rejected.
    pub fn create_project(&self, name: &str) -> ServiceResult<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidUpdate("project name must not be blank"));
        }
        let now = self.clock.now();
        self.store
            .execute(|tx| SqliteProjectRepository::new(tx).create_project(name, now))
            .map_err(Into::into)
    }

    pub fn add_project_skill(&self, project_id: ProjectId, skill_id: SkillId) -> ServiceResult<()> {
        self.ensure_valid(project_id)?;
        self.store
            .execute(|tx| SqliteProjectRepository::new(tx).add_project_skill(project_id, skill_id))
            .map_err(|err| {
                warn!(
                    "event=project_skill_add module=project_service status=error project_id={project_id} skill_id={skill_id} error={err}"
                );
                err.into()
            })
    }

    pub fn remove_project_skill(
        &self,
        project_id: ProjectId,
        skill_id: SkillId,
    ) -> ServiceResult<()> {
        self.ensure_valid(project_id)?;
        self.store
            .execute(|tx| {
                SqliteProjectRepository::new(tx).remove_project_skill(project_id, skill_id)
            })
            .map_err(Into::into)
    }

    pub fn get_skills_for_project(&self, project_id: ProjectId) -> ServiceResult<Vec<Skill>> {
        self.store
            .read(|conn| SqliteProjectRepository::new(conn).list_skills_for_project(project_id))
            .map_err(Into::into)
    }

    fn ensure_valid(&self, project_id: ProjectId) -> ServiceResult<()> {
        if self.is_valid_project(project_id)? {
            Ok(())
        } else {
            Err(ServiceError::InvalidProject(project_id))
        }
    }
}

impl ProjectValidator for ProjectService {
    fn is_valid_project(&self, project_id: ProjectId) -> ServiceResult<bool> {
        self.store
            .read(|conn| SqliteProjectRepository::new(conn).project_exists(project_id))
            .map_err(Into::into)
    }
}

impl SkillCatalog for ProjectService {
    fn skills_for_project(&self, project_id: ProjectId) -> ServiceResult<Vec<Skill>> {
        self.get_skills_for_project(project_id)
    }
}
