//! Task-completion (reward) repository.

use super::{from_epoch_ms, to_epoch_ms, RepoResult};
use crate::model::completion::{Reward, TaskCompletion};
use crate::model::{CardId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COMPLETION_SELECT_SQL: &str = "SELECT
    id,
    card_id,
    user_id,
    base_exp,
    time_bonus_exp,
    streak_bonus_exp,
    total_exp,
    completed_at
FROM task_completions";

pub trait TaskCompletionRepository {
    fn get_task_completion(
        &self,
        card_id: CardId,
        user_id: UserId,
    ) -> RepoResult<Option<TaskCompletion>>;
    fn create_task_completion(
        &self,
        card_id: CardId,
        user_id: UserId,
        reward: &Reward,
        completed_at: DateTime<Utc>,
    ) -> RepoResult<TaskCompletion>;
    fn list_task_completions_by_user(&self, user_id: UserId) -> RepoResult<Vec<TaskCompletion>>;
    fn total_user_exp(&self, user_id: UserId) -> RepoResult<i64>;
}

pub struct SqliteTaskCompletionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskCompletionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskCompletionRepository for SqliteTaskCompletionRepository<'_> {
    fn get_task_completion(
        &self,
        card_id: CardId,
        user_id: UserId,
    ) -> RepoResult<Option<TaskCompletion>> {
        self.conn
            .query_row(
                &format!("{COMPLETION_SELECT_SQL} WHERE card_id = ?1 AND user_id = ?2;"),
                params![card_id, user_id],
                |row| Ok(parse_completion_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn create_task_completion(
        &self,
        card_id: CardId,
        user_id: UserId,
        reward: &Reward,
        completed_at: DateTime<Utc>,
    ) -> RepoResult<TaskCompletion> {
        self.conn.execute(
            "INSERT INTO task_completions (
                card_id,
                user_id,
                base_exp,
                time_bonus_exp,
                streak_bonus_exp,
                total_exp,
                completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                card_id,
                user_id,
                reward.base_exp,
                reward.time_bonus_exp,
                reward.streak_bonus_exp,
                reward.total_exp(),
                to_epoch_ms(completed_at),
            ],
        )?;

        Ok(TaskCompletion {
            id: self.conn.last_insert_rowid(),
            card_id,
            user_id,
            base_exp: reward.base_exp,
            time_bonus_exp: reward.time_bonus_exp,
            streak_bonus_exp: reward.streak_bonus_exp,
            total_exp: reward.total_exp(),
            completed_at,
        })
    }

    fn list_task_completions_by_user(&self, user_id: UserId) -> RepoResult<Vec<TaskCompletion>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COMPLETION_SELECT_SQL} WHERE user_id = ?1 ORDER BY completed_at DESC, id DESC;"
        ))?;
        let mut rows = stmt.query([user_id])?;
        let mut completions = Vec::new();
        while let Some(row) = rows.next()? {
            completions.push(parse_completion_row(row)?);
        }
        Ok(completions)
    }

    fn total_user_exp(&self, user_id: UserId) -> RepoResult<i64> {
        let total = self.conn.query_row(
            "SELECT COALESCE(SUM(total_exp), 0) FROM task_completions WHERE user_id = ?1;",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

fn parse_completion_row(row: &Row<'_>) -> RepoResult<TaskCompletion> {
    Ok(TaskCompletion {
        id: row.get("id")?,
        card_id: row.get("card_id")?,
        user_id: row.get("user_id")?,
        base_exp: row.get("base_exp")?,
        time_bonus_exp: row.get("time_bonus_exp")?,
        streak_bonus_exp: row.get("streak_bonus_exp")?,
        total_exp: row.get("total_exp")?,
        completed_at: from_epoch_ms(row.get("completed_at")?, "task_completions.completed_at")?,
    })
}
