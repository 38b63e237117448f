//! Project repository, including the project ↔ skill links.

use super::skill_repo::parse_skill_row;
use super::{from_epoch_ms, to_epoch_ms, RepoError, RepoResult};
use crate::model::project::Project;
use crate::model::skill::Skill;
use crate::model::{ProjectId, SkillId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

pub trait ProjectRepository {
    fn project_exists(&self, project_id: ProjectId) -> RepoResult<bool>;
    fn list_projects(&self) -> RepoResult<Vec<Project>>;
    fn create_project(&self, name: &str, now: DateTime<Utc>) -> RepoResult<Project>;
    /// Linking an already-linked pair is a no-op.
    fn add_project_skill(&self, project_id: ProjectId, skill_id: SkillId) -> RepoResult<()>;
    fn remove_project_skill(&self, project_id: ProjectId, skill_id: SkillId) -> RepoResult<()>;
    fn list_skills_for_project(&self, project_id: ProjectId) -> RepoResult<Vec<Skill>>;
}

pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn project_exists(&self, project_id: ProjectId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1);",
            [project_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_projects(&self) -> RepoResult<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM projects ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(Project {
                id: row.get("id")?,
                name: row.get("name")?,
                created_at: from_epoch_ms(row.get("created_at")?, "projects.created_at")?,
            });
        }
        Ok(projects)
    }

    fn create_project(&self, name: &str, now: DateTime<Utc>) -> RepoResult<Project> {
        self.conn.execute(
            "INSERT INTO projects (name, created_at) VALUES (?1, ?2);",
            params![name, to_epoch_ms(now)],
        )?;
        Ok(Project {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            created_at: now,
        })
    }

    fn add_project_skill(&self, project_id: ProjectId, skill_id: SkillId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO project_skills (project_id, skill_id) VALUES (?1, ?2);",
            params![project_id, skill_id],
        )?;
        Ok(())
    }

    fn remove_project_skill(&self, project_id: ProjectId, skill_id: SkillId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM project_skills WHERE project_id = ?1 AND skill_id = ?2;",
            params![project_id, skill_id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "project skill",
                id: skill_id,
            });
        }
        Ok(())
    }

    fn list_skills_for_project(&self, project_id: ProjectId) -> RepoResult<Vec<Skill>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.user_id, s.name, s.description, s.created_at
             FROM skills s
             JOIN project_skills ps ON ps.skill_id = s.id
             WHERE ps.project_id = ?1
             ORDER BY s.id ASC;",
        )?;
        let mut rows = stmt.query([project_id])?;
        let mut skills = Vec::new();
        while let Some(row) = rows.next()? {
            skills.push(parse_skill_row(row)?);
        }
        Ok(skills)
    }
}
