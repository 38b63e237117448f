//! Key/value settings repository.

use super::RepoResult;
use crate::model::setting::Setting;
use rusqlite::{params, Connection, OptionalExtension};

pub trait SettingRepository {
    fn get_setting(&self, key: &str) -> RepoResult<Option<Setting>>;
    fn set_setting(&self, key: &str, value: &str, display: &str) -> RepoResult<()>;
    fn list_settings(&self) -> RepoResult<Vec<Setting>>;
}

pub struct SqliteSettingRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SettingRepository for SqliteSettingRepository<'_> {
    fn get_setting(&self, key: &str) -> RepoResult<Option<Setting>> {
        let setting = self
            .conn
            .query_row(
                "SELECT key, value, display FROM settings WHERE key = ?1;",
                [key],
                |row| {
                    Ok(Setting {
                        key: row.get("key")?,
                        value: row.get("value")?,
                        display: row.get("display")?,
                    })
                },
            )
            .optional()?;
        Ok(setting)
    }

    fn set_setting(&self, key: &str, value: &str, display: &str) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value, display, updated_at)
             VALUES (?1, ?2, ?3, strftime('%s', 'now') * 1000)
             ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                display = CASE WHEN excluded.display = '' THEN settings.display ELSE excluded.display END,
                updated_at = excluded.updated_at;",
            params![key, value, display],
        )?;
        Ok(())
    }

    fn list_settings(&self) -> RepoResult<Vec<Setting>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, display FROM settings ORDER BY key ASC;")?;
        let settings = stmt
            .query_map([], |row| {
                Ok(Setting {
                    key: row.get("key")?,
                    value: row.get("value")?,
                    display: row.get("display")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(settings)
    }
}
