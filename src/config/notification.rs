//! Notification configuration.

use serde::Deserialize;

/// Notification settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// Telegram bot notifications.
    pub telegram: Option<TelegramConfig>,
}

/// Telegram notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Whether Telegram notifications are active.
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (loaded from TELEGRAM_BOT_TOKEN env var).
    #[serde(skip)]
    pub bot_token: String,
    /// Notify operators about orders that were paid by the client.
    #[serde(default = "default_true")]
    pub notify_operators: bool,
    /// Notify clients about status changes of their orders.
    #[serde(default = "default_true")]
    pub notify_clients: bool,
}

fn default_true() -> bool {
    true
}
