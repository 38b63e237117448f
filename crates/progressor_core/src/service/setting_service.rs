//! Runtime settings backed by the `settings` table.

use super::ServiceResult;
use crate::db::Store;
use crate::model::setting::Setting;
use crate::repo::setting_repo::{SettingRepository, SqliteSettingRepository};
use std::sync::Arc;

/// Read access to named settings.
pub trait SettingsProvider: Send + Sync {
    /// Returns `None` when the key was never set.
    fn get_setting(&self, key: &str) -> ServiceResult<Option<String>>;
}

pub struct SettingService {
    store: Arc<Store>,
}

impl SettingService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Stores `value` under `key`. An empty `display` keeps the existing label.
    pub fn set_setting(&self, key: &str, value: &str, display: &str) -> ServiceResult<()> {
        self.store
            .execute(|tx| SqliteSettingRepository::new(tx).set_setting(key, value, display))
            .map_err(Into::into)
    }

    pub fn list_settings(&self) -> ServiceResult<Vec<Setting>> {
        self.store
            .read(|conn| SqliteSettingRepository::new(conn).list_settings())
            .map_err(Into::into)
    }
}

impl SettingsProvider for SettingService {
    fn get_setting(&self, key: &str) -> ServiceResult<Option<String>> {
        let setting = self
            .store
            .read(|conn| SqliteSettingRepository::new(conn).get_setting(key))?;
        Ok(setting.map(|setting| setting.value))
    }
}
