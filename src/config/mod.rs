//! Configuration loading and validation for the exchange desk.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for sensitive credentials.

mod app;
mod duration;
mod error;
mod exchange;
mod notification;
mod processor;
mod rates;
mod staff;
mod storage;
mod webhook;

pub use app::AppConfig;
pub use error::ConfigError;
pub use exchange::{ExchangeConfig, ExpirySweepConfig};
pub use notification::{NotificationConfig, TelegramConfig};
pub use processor::{ProcessorConfig, ProcessorMode};
pub use rates::RatesConfig;
pub use staff::StaffConfig;
pub use storage::StorageConfig;
pub use webhook::WebhookConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::{env, fs};

/// Root configuration structure for the exchange desk.
///
/// Required sections: app.
/// Every other section falls back to its defaults when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Fees, limits and order expiry.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Payment processor client.
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// BTC/RUB price source.
    #[serde(default)]
    pub rates: RatesConfig,
    /// Order database.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Inbound processor callbacks.
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Owner and service chat identifiers.
    #[serde(default)]
    pub staff: StaffConfig,
    /// Outbound notifications (optional).
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `PROCESSOR_API_ID`, `PROCESSOR_SECRET_KEY`, `PROCESSOR_PAYMENT_KEY`
    /// - `WEBHOOK_SECRET`
    /// - `TELEGRAM_BOT_TOKEN`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        // A missing .env is fine, a broken one is not.
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(e.into());
        }

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        self.processor.api_id = env::var("PROCESSOR_API_ID").unwrap_or_default();
        self.processor.secret_key = env::var("PROCESSOR_SECRET_KEY").unwrap_or_default();
        self.processor.payment_key = env::var("PROCESSOR_PAYMENT_KEY").unwrap_or_default();

        self.webhook.secret = env::var("WEBHOOK_SECRET").unwrap_or_default();

        if let Some(ref mut telegram) = self.notification.telegram {
            if telegram.enabled {
                telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        let exchange = &self.exchange;

        if exchange.processing_percentage < Decimal::ZERO || exchange.admin_percentage < Decimal::ZERO
        {
            return Err(ConfigError::Validation(
                "exchange percentages must not be negative".into(),
            ));
        }

        if exchange.min_amount <= Decimal::ZERO || exchange.min_amount > exchange.max_amount {
            return Err(ConfigError::Validation(format!(
                "exchange limits are invalid: min_amount {} / max_amount {}",
                exchange.min_amount, exchange.max_amount
            )));
        }

        if exchange.mismatch_tolerance < Decimal::ZERO {
            return Err(ConfigError::Validation(
                "exchange.mismatch_tolerance must not be negative".into(),
            ));
        }

        if exchange.expiry_sweep.enabled && exchange.expiry_sweep.interval.is_zero() {
            return Err(ConfigError::Validation(
                "exchange.expiry_sweep.interval must be positive".into(),
            ));
        }

        let is_production = self.app.is_production();

        if is_production
            && self.processor.mode == ProcessorMode::Live
            && (self.processor.api_id.is_empty()
                || self.processor.secret_key.is_empty()
                || self.processor.payment_key.is_empty())
        {
            return Err(ConfigError::Validation(
                "processor: API credentials not found (set PROCESSOR_API_ID, PROCESSOR_SECRET_KEY and PROCESSOR_PAYMENT_KEY env vars)".into(),
            ));
        }

        if is_production && self.webhook.secret.is_empty() {
            return Err(ConfigError::Validation(
                "webhook: signing secret not found (set WEBHOOK_SECRET env var)".into(),
            ));
        }

        if !self.webhook.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "webhook.path must start with '/': {}",
                self.webhook.path
            )));
        }

        if self.webhook.socket_addr().is_none() {
            return Err(ConfigError::Validation(format!(
                "webhook: invalid bind address {}:{}",
                self.webhook.host, self.webhook.port
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
