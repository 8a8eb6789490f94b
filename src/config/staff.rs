//! Statically configured staff identifiers.

use serde::Deserialize;

/// Owner and service chats. Additional admins and operators live in the
/// settings store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaffConfig {
    /// Owner account, always an admin.
    #[serde(default)]
    pub admin_user_id: i64,
    /// Admin chat.
    #[serde(default)]
    pub admin_chat_id: i64,
    /// Chat where operators receive order notifications.
    #[serde(default)]
    pub operator_chat_id: i64,
}
