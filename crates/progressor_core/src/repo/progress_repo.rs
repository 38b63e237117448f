//! Aggregations over closed time entries.

use super::{to_epoch_ms, RepoError, RepoResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Minutes tracked on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub day: NaiveDate,
    pub minutes: i64,
}

pub trait ProgressRepository {
    /// Sum of entry durations that started at or after `since`.
    fn total_minutes_since(&self, since: DateTime<Utc>) -> RepoResult<i64>;
    /// Per-day totals for entries that started at or after `since`, oldest first.
    fn daily_total_minutes(&self, since: DateTime<Utc>) -> RepoResult<Vec<DailyTotal>>;
}

pub struct SqliteProgressRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProgressRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ProgressRepository for SqliteProgressRepository<'_> {
    fn total_minutes_since(&self, since: DateTime<Utc>) -> RepoResult<i64> {
        let total = self.conn.query_row(
            "SELECT COALESCE(SUM(duration_mins), 0)
             FROM time_entries
             WHERE start_time >= ?1;",
            [to_epoch_ms(since)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    fn daily_total_minutes(&self, since: DateTime<Utc>) -> RepoResult<Vec<DailyTotal>> {
        let mut stmt = self.conn.prepare(
            "SELECT date(start_time / 1000, 'unixepoch') AS day, SUM(duration_mins) AS minutes
             FROM time_entries
             WHERE start_time >= ?1
             GROUP BY day
             ORDER BY day ASC;",
        )?;
        let mut rows = stmt.query([to_epoch_ms(since)])?;
        let mut totals = Vec::new();
        while let Some(row) = rows.next()? {
            let day_text: String = row.get("day")?;
            let day = NaiveDate::parse_from_str(&day_text, "%Y-%m-%d").map_err(|_| {
                RepoError::InvalidData(format!("invalid day `{day_text}` in time entry aggregate"))
            })?;
            totals.push(DailyTotal {
                day,
                minutes: row.get("minutes")?,
            });
        }
        Ok(totals)
    }
}
