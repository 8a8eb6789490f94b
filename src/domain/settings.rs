//! Runtime-adjustable settings values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Well-known settings keys.
pub mod keys {
    pub const ADMIN_PERCENTAGE: &str = "admin_percentage";
    pub const CAPTCHA_ENABLED: &str = "captcha_enabled";
    pub const MIN_AMOUNT: &str = "min_amount";
    pub const MAX_AMOUNT: &str = "max_amount";
    pub const WELCOME_MESSAGE: &str = "welcome_message";
    pub const ADMIN_USERS: &str = "admin_users";
    pub const OPERATOR_USERS: &str = "operator_users";
    pub const ADMIN_CHATS: &str = "admin_chats";
}

/// A settings value. Stored as tagged JSON so the variant survives a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SettingValue {
    Bool(bool),
    Number(Decimal),
    Text(String),
    List(Vec<i64>),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            SettingValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[i64]> {
        match self {
            SettingValue::List(v) => Some(v),
            _ => None,
        }
    }

    /// Variant name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "bool",
            SettingValue::Number(_) => "number",
            SettingValue::Text(_) => "text",
            SettingValue::List(_) => "list",
        }
    }
}
