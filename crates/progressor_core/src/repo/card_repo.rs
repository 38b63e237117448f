//! Card and time-entry repository.
//!
//! # Invariants
//! - `set_card_active(.., true, ..)` fails with a constraint error when another
//!   card is already active (partial unique index).
//! - An open time entry has `end_time = start_time`.

use super::{from_epoch_ms, parse_bool, to_epoch_ms, RepoError, RepoResult};
use crate::model::card::{Card, CardStatus, NewCard, TimeEntry};
use crate::model::{CardId, ProjectId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CARD_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    title,
    description,
    estimated_mins,
    tracked_mins,
    is_active,
    status,
    completed_at,
    created_at,
    updated_at
FROM cards";

const TIME_ENTRY_SELECT_SQL: &str = "SELECT
    id,
    card_id,
    start_time,
    end_time,
    duration_mins
FROM time_entries";

/// Data access for cards and their time entries.
pub trait CardRepository {
    fn create_card(&self, card: &NewCard, now: DateTime<Utc>) -> RepoResult<CardId>;
    fn get_card(&self, project_id: ProjectId, card_id: CardId) -> RepoResult<Option<Card>>;
    /// Store-wide lookup of the card currently being timed.
    fn get_active_card(&self) -> RepoResult<Option<Card>>;
    fn list_cards(&self, project_id: ProjectId, status: CardStatus) -> RepoResult<Vec<Card>>;
    /// Rewrites title, description, estimate, status and completion time.
    fn update_card(&self, card: &Card, now: DateTime<Utc>) -> RepoResult<()>;
    fn set_card_active(
        &self,
        card_id: CardId,
        is_active: bool,
        tracked_mins: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<()>;
    fn delete_card(&self, project_id: ProjectId, card_id: CardId) -> RepoResult<()>;
    /// Opens an entry with `end_time = start_time`.
    fn create_time_entry(&self, card_id: CardId, start: DateTime<Utc>) -> RepoResult<i64>;
    fn get_open_time_entry(&self, card_id: CardId) -> RepoResult<Option<TimeEntry>>;
    fn close_time_entry(
        &self,
        entry_id: i64,
        end: DateTime<Utc>,
        duration_mins: i64,
    ) -> RepoResult<()>;
    fn list_time_entries(&self, card_id: CardId) -> RepoResult<Vec<TimeEntry>>;
}

/// SQLite-backed card repository.
pub struct SqliteCardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCardRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CardRepository for SqliteCardRepository<'_> {
    fn create_card(&self, card: &NewCard, now: DateTime<Utc>) -> RepoResult<CardId> {
        let now_ms = to_epoch_ms(now);
        self.conn.execute(
            "INSERT INTO cards (
                project_id,
                title,
                estimated_mins,
                tracked_mins,
                is_active,
                status,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, 0, 0, ?4, ?5, ?5);",
            params![
                card.project_id,
                card.title.as_str(),
                card.estimated_mins,
                CardStatus::Todo.code(),
                now_ms,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_card(&self, project_id: ProjectId, card_id: CardId) -> RepoResult<Option<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CARD_SELECT_SQL} WHERE id = ?1 AND project_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![card_id, project_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_card_row(row)?)),
            None => Ok(None),
        }
    }

    fn get_active_card(&self) -> RepoResult<Option<Card>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CARD_SELECT_SQL} WHERE is_active = 1 LIMIT 1;"))?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_card_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_cards(&self, project_id: ProjectId, status: CardStatus) -> RepoResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CARD_SELECT_SQL}
             WHERE project_id = ?1 AND status = ?2
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![project_id, status.code()])?;
        let mut cards = Vec::new();
        while let Some(row) = rows.next()? {
            cards.push(parse_card_row(row)?);
        }
        Ok(cards)
    }

    fn update_card(&self, card: &Card, now: DateTime<Utc>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET
                title = ?1,
                description = ?2,
                estimated_mins = ?3,
                status = ?4,
                completed_at = ?5,
                updated_at = ?6
             WHERE id = ?7;",
            params![
                card.title.as_str(),
                card.description.as_deref(),
                card.estimated_mins,
                card.status.code(),
                card.completed_at.map(to_epoch_ms),
                to_epoch_ms(now),
                card.id,
            ],
        )?;
        ensure_changed(changed, "card", card.id)
    }

    fn set_card_active(
        &self,
        card_id: CardId,
        is_active: bool,
        tracked_mins: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET is_active = ?1, tracked_mins = ?2, updated_at = ?3
             WHERE id = ?4;",
            params![i64::from(is_active), tracked_mins, to_epoch_ms(now), card_id],
        )?;
        ensure_changed(changed, "card", card_id)
    }

    fn delete_card(&self, project_id: ProjectId, card_id: CardId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM cards WHERE id = ?1 AND project_id = ?2;",
            params![card_id, project_id],
        )?;
        ensure_changed(changed, "card", card_id)
    }

    fn create_time_entry(&self, card_id: CardId, start: DateTime<Utc>) -> RepoResult<i64> {
        let start_ms = to_epoch_ms(start);
        self.conn.execute(
            "INSERT INTO time_entries (card_id, start_time, end_time, duration_mins)
             VALUES (?1, ?2, ?2, 0);",
            params![card_id, start_ms],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_open_time_entry(&self, card_id: CardId) -> RepoResult<Option<TimeEntry>> {
        self.conn
            .query_row(
                &format!(
                    "{TIME_ENTRY_SELECT_SQL}
                     WHERE card_id = ?1 AND end_time = start_time
                     ORDER BY start_time DESC, id DESC
                     LIMIT 1;"
                ),
                [card_id],
                |row| Ok(parse_time_entry_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn close_time_entry(
        &self,
        entry_id: i64,
        end: DateTime<Utc>,
        duration_mins: i64,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE time_entries SET end_time = ?1, duration_mins = ?2 WHERE id = ?3;",
            params![to_epoch_ms(end), duration_mins, entry_id],
        )?;
        ensure_changed(changed, "time entry", entry_id)
    }

    fn list_time_entries(&self, card_id: CardId) -> RepoResult<Vec<TimeEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TIME_ENTRY_SELECT_SQL} WHERE card_id = ?1 ORDER BY start_time ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([card_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_time_entry_row(row)?);
        }
        Ok(entries)
    }
}

fn ensure_changed(changed: usize, entity: &'static str, id: i64) -> RepoResult<()> {
    if changed == 0 {
        return Err(RepoError::NotFound { entity, id });
    }
    Ok(())
}

fn parse_card_row(row: &Row<'_>) -> RepoResult<Card> {
    let status_code: i64 = row.get("status")?;
    let status = CardStatus::from_code(status_code).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid card status `{status_code}` in cards.status"))
    })?;

    let completed_at = match row.get::<_, Option<i64>>("completed_at")? {
        Some(value) => Some(from_epoch_ms(value, "cards.completed_at")?),
        None => None,
    };

    Ok(Card {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        estimated_mins: row.get("estimated_mins")?,
        tracked_mins: row.get("tracked_mins")?,
        is_active: parse_bool(row.get("is_active")?, "cards.is_active")?,
        status,
        completed_at,
        created_at: from_epoch_ms(row.get("created_at")?, "cards.created_at")?,
        updated_at: from_epoch_ms(row.get("updated_at")?, "cards.updated_at")?,
    })
}

fn parse_time_entry_row(row: &Row<'_>) -> RepoResult<TimeEntry> {
    Ok(TimeEntry {
        id: row.get("id")?,
        card_id: row.get("card_id")?,
        start_time: from_epoch_ms(row.get("start_time")?, "time_entries.start_time")?,
        end_time: from_epoch_ms(row.get("end_time")?, "time_entries.end_time")?,
        duration_mins: row.get("duration_mins")?,
    })
}
