//! Typed access to runtime settings with configured defaults.

use crate::config::{ExchangeConfig, StaffConfig};
use crate::domain::{SettingValue, keys};
use crate::storage::{OrderStore, StorageError};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Settings reads a key from the store and falls back to the configured
/// default when the key is absent or holds a different variant.
pub struct Settings {
    store: Arc<dyn OrderStore>,
    defaults: ExchangeConfig,
    staff: StaffConfig,
}

impl Settings {
    pub fn new(store: Arc<dyn OrderStore>, defaults: ExchangeConfig, staff: StaffConfig) -> Self {
        Self {
            store,
            defaults,
            staff,
        }
    }

    /// Static configuration the defaults come from.
    pub fn defaults(&self) -> &ExchangeConfig {
        &self.defaults
    }

    pub fn staff(&self) -> &StaffConfig {
        &self.staff
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool, StorageError> {
        Ok(self
            .typed(key, SettingValue::as_bool)
            .await?
            .unwrap_or(default))
    }

    pub async fn get_number(&self, key: &str, default: Decimal) -> Result<Decimal, StorageError> {
        Ok(self
            .typed(key, SettingValue::as_number)
            .await?
            .unwrap_or(default))
    }

    pub async fn get_text(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.typed(key, |v| v.as_text().map(str::to_string)).await
    }

    pub async fn get_list(&self, key: &str) -> Result<Vec<i64>, StorageError> {
        Ok(self
            .typed(key, |v| v.as_list().map(<[i64]>::to_vec))
            .await?
            .unwrap_or_default())
    }

    pub async fn set(&self, key: &str, value: SettingValue) -> Result<(), StorageError> {
        self.store.set_setting(key, &value).await?;
        info!(key, kind = value.kind(), "Setting updated");
        Ok(())
    }

    pub async fn admin_percentage(&self) -> Result<Decimal, StorageError> {
        self.get_number(keys::ADMIN_PERCENTAGE, self.defaults.admin_percentage)
            .await
    }

    pub async fn min_amount(&self) -> Result<Decimal, StorageError> {
        self.get_number(keys::MIN_AMOUNT, self.defaults.min_amount)
            .await
    }

    pub async fn max_amount(&self) -> Result<Decimal, StorageError> {
        self.get_number(keys::MAX_AMOUNT, self.defaults.max_amount)
            .await
    }

    pub async fn captcha_enabled(&self) -> Result<bool, StorageError> {
        self.get_bool(keys::CAPTCHA_ENABLED, self.defaults.captcha_enabled)
            .await
    }

    pub async fn welcome_message(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .get_text(keys::WELCOME_MESSAGE)
            .await?
            .or_else(|| self.defaults.welcome_message.clone()))
    }

    /// Owner account or a user listed in `admin_users`.
    pub async fn is_admin(&self, user_id: i64) -> Result<bool, StorageError> {
        if self.is_owner(user_id) {
            return Ok(true);
        }
        Ok(self.get_list(keys::ADMIN_USERS).await?.contains(&user_id))
    }

    /// Admins are operators too.
    pub async fn is_operator(&self, user_id: i64) -> Result<bool, StorageError> {
        if self.is_owner(user_id) {
            return Ok(true);
        }
        Ok(self.get_list(keys::ADMIN_USERS).await?.contains(&user_id)
            || self.get_list(keys::OPERATOR_USERS).await?.contains(&user_id))
    }

    /// Staff member acting inside one of the service chats.
    pub async fn is_staff_in_chat(&self, user_id: i64, chat_id: i64) -> Result<bool, StorageError> {
        if self.is_owner(user_id) {
            return Ok(true);
        }

        let service_chat = chat_id != 0
            && (chat_id == self.staff.admin_chat_id
                || chat_id == self.staff.operator_chat_id
                || self.get_list(keys::ADMIN_CHATS).await?.contains(&chat_id));

        if !service_chat {
            return Ok(false);
        }
        self.is_operator(user_id).await
    }

    /// Adds an id to one of the list settings. Returns false if it was already there.
    pub async fn grant(&self, key: &str, id: i64) -> Result<bool, StorageError> {
        let mut ids = self.get_list(key).await?;
        if ids.contains(&id) {
            return Ok(false);
        }
        ids.push(id);
        self.set(key, SettingValue::List(ids)).await?;
        Ok(true)
    }

    /// Removes an id from one of the list settings. Returns false if it was absent.
    pub async fn revoke(&self, key: &str, id: i64) -> Result<bool, StorageError> {
        let mut ids = self.get_list(key).await?;
        let before = ids.len();
        ids.retain(|existing| *existing != id);
        if ids.len() == before {
            return Ok(false);
        }
        self.set(key, SettingValue::List(ids)).await?;
        Ok(true)
    }

    fn is_owner(&self, user_id: i64) -> bool {
        self.staff.admin_user_id != 0 && user_id == self.staff.admin_user_id
    }

    async fn typed<T>(
        &self,
        key: &str,
        accessor: impl Fn(&SettingValue) -> Option<T>,
    ) -> Result<Option<T>, StorageError> {
        let Some(value) = self.store.get_setting(key).await? else {
            return Ok(None);
        };

        let typed = accessor(&value);
        if typed.is_none() {
            warn!(key, kind = value.kind(), "Setting has unexpected type, using default");
        }
        Ok(typed)
    }
}
