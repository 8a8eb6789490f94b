//! Operator and client notifications.

mod notifier;
mod telegram;

pub use notifier::*;
pub use telegram::TelegramNotifier;
