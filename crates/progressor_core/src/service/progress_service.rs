//! Tracked-time statistics and experience totals.

use super::ServiceResult;
use crate::db::Store;
use crate::model::completion::TaskCompletion;
use crate::model::{UserId, DEFAULT_USER_ID};
use crate::repo::completion_repo::{SqliteTaskCompletionRepository, TaskCompletionRepository};
use crate::repo::progress_repo::{DailyTotal, ProgressRepository, SqliteProgressRepository};
use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hours tracked in the current calendar periods, each rounded up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStatsResult {
    pub week_hours: i64,
    pub month_hours: i64,
    pub year_hours: i64,
}

pub struct ProgressService {
    store: Arc<Store>,
    user_id: UserId,
}

impl ProgressService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            user_id: DEFAULT_USER_ID,
        }
    }

    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    /// Hours tracked since Monday, the first of the month and January 1st
    /// (UTC) relative to `now`.
    pub fn get_stats(&self, now: DateTime<Utc>) -> ServiceResult<GetStatsResult> {
        let today = now.date_naive();
        let week_start = today
            .checked_sub_days(Days::new(u64::from(today.weekday().num_days_from_monday())))
            .unwrap_or(today);
        let month_start = today.with_day(1).unwrap_or(today);
        let year_start = today.with_ordinal(1).unwrap_or(today);

        let (week, month, year) = self.store.read(|conn| -> ServiceResult<_> {
            let repo = SqliteProgressRepository::new(conn);
            Ok((
                repo.total_minutes_since(start_of_day(week_start))?,
                repo.total_minutes_since(start_of_day(month_start))?,
                repo.total_minutes_since(start_of_day(year_start))?,
            ))
        })?;

        Ok(GetStatsResult {
            week_hours: minutes_to_hours_ceil(week),
            month_hours: minutes_to_hours_ceil(month),
            year_hours: minutes_to_hours_ceil(year),
        })
    }

    /// Per-day minute totals for the last `days` days including today.
    pub fn daily_total_minutes(&self, days: u32, now: DateTime<Utc>) -> ServiceResult<Vec<DailyTotal>> {
        let today = now.date_naive();
        let first_day = today
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .unwrap_or(today);
        self.store
            .read(|conn| SqliteProgressRepository::new(conn).daily_total_minutes(start_of_day(first_day)))
            .map_err(Into::into)
    }

    pub fn total_user_exp(&self) -> ServiceResult<i64> {
        self.store
            .read(|conn| SqliteTaskCompletionRepository::new(conn).total_user_exp(self.user_id))
            .map_err(Into::into)
    }

    pub fn list_task_completions(&self) -> ServiceResult<Vec<TaskCompletion>> {
        self.store
            .read(|conn| {
                SqliteTaskCompletionRepository::new(conn).list_task_completions_by_user(self.user_id)
            })
            .map_err(Into::into)
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

fn minutes_to_hours_ceil(minutes: i64) -> i64 {
    (minutes.max(0) + 59) / 60
}
