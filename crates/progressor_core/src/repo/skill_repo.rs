//! Skill and skill-progress repository.

use super::{from_epoch_ms, to_epoch_ms, RepoError, RepoResult};
use crate::model::skill::{Skill, SkillProgress};
use crate::model::{SkillId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SKILL_SELECT_SQL: &str = "SELECT id, user_id, name, description, created_at FROM skills";

pub trait SkillRepository {
    fn create_skill(
        &self,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepoResult<Skill>;
    fn get_skill(&self, skill_id: SkillId) -> RepoResult<Option<Skill>>;
    fn list_skills_by_user(&self, user_id: UserId) -> RepoResult<Vec<Skill>>;
    fn update_skill(&self, skill_id: SkillId, name: &str, description: Option<&str>)
        -> RepoResult<()>;
    fn delete_skill(&self, skill_id: SkillId) -> RepoResult<()>;
    fn get_skill_progress(
        &self,
        user_id: UserId,
        skill_id: SkillId,
    ) -> RepoResult<Option<SkillProgress>>;
    /// Creates the row on first contact, otherwise adds `minutes`.
    fn upsert_skill_progress(
        &self,
        user_id: UserId,
        skill_id: SkillId,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<()>;
}

pub struct SqliteSkillRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSkillRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SkillRepository for SqliteSkillRepository<'_> {
    fn create_skill(
        &self,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepoResult<Skill> {
        self.conn.execute(
            "INSERT INTO skills (user_id, name, description, created_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![user_id, name, description, to_epoch_ms(now)],
        )?;
        Ok(Skill {
            id: self.conn.last_insert_rowid(),
            user_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
        })
    }

    fn get_skill(&self, skill_id: SkillId) -> RepoResult<Option<Skill>> {
        self.conn
            .query_row(
                &format!("{SKILL_SELECT_SQL} WHERE id = ?1;"),
                [skill_id],
                |row| Ok(parse_skill_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_skills_by_user(&self, user_id: UserId) -> RepoResult<Vec<Skill>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SKILL_SELECT_SQL} WHERE user_id = ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([user_id])?;
        let mut skills = Vec::new();
        while let Some(row) = rows.next()? {
            skills.push(parse_skill_row(row)?);
        }
        Ok(skills)
    }

    fn update_skill(
        &self,
        skill_id: SkillId,
        name: &str,
        description: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE skills SET name = ?1, description = ?2 WHERE id = ?3;",
            params![name, description, skill_id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "skill",
                id: skill_id,
            });
        }
        Ok(())
    }

    fn delete_skill(&self, skill_id: SkillId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM skills WHERE id = ?1;", [skill_id])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "skill",
                id: skill_id,
            });
        }
        Ok(())
    }

    fn get_skill_progress(
        &self,
        user_id: UserId,
        skill_id: SkillId,
    ) -> RepoResult<Option<SkillProgress>> {
        self.conn
            .query_row(
                "SELECT user_id, skill_id, total_minutes_tracked, last_updated
                 FROM skill_progress
                 WHERE user_id = ?1 AND skill_id = ?2;",
                params![user_id, skill_id],
                |row| Ok(parse_progress_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn upsert_skill_progress(
        &self,
        user_id: UserId,
        skill_id: SkillId,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO skill_progress (user_id, skill_id, total_minutes_tracked, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, skill_id) DO UPDATE SET
                total_minutes_tracked = total_minutes_tracked + excluded.total_minutes_tracked,
                last_updated = excluded.last_updated;",
            params![user_id, skill_id, minutes, to_epoch_ms(now)],
        )?;
        Ok(())
    }
}

pub(crate) fn parse_skill_row(row: &Row<'_>) -> RepoResult<Skill> {
    Ok(Skill {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: from_epoch_ms(row.get("created_at")?, "skills.created_at")?,
    })
}

fn parse_progress_row(row: &Row<'_>) -> RepoResult<SkillProgress> {
    Ok(SkillProgress {
        user_id: row.get("user_id")?,
        skill_id: row.get("skill_id")?,
        total_minutes_tracked: row.get("total_minutes_tracked")?,
        last_updated: from_epoch_ms(row.get("last_updated")?, "skill_progress.last_updated")?,
    })
}
