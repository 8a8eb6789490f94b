//! Exchange desk configuration: fees, limits and order expiry.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Static defaults for the exchange desk.
///
/// Values marked as settings-backed (admin percentage, limits, captcha,
/// welcome message) are only defaults: the settings store overrides them
/// at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Processor commission in percent, applied to the base amount.
    #[serde(default = "default_processing_percentage")]
    pub processing_percentage: Decimal,
    /// Service commission in percent (settings-backed).
    #[serde(default = "default_admin_percentage")]
    pub admin_percentage: Decimal,
    /// Minimum order amount in fiat (settings-backed).
    #[serde(default = "default_min_amount")]
    pub min_amount: Decimal,
    /// Maximum order amount in fiat (settings-backed).
    #[serde(default = "default_max_amount")]
    pub max_amount: Decimal,
    /// Upper bound for sell orders denominated in BTC.
    #[serde(default = "default_max_crypto_amount")]
    pub max_crypto_amount: Decimal,
    /// Allowed difference between the paid and the expected amount.
    #[serde(default = "default_mismatch_tolerance")]
    pub mismatch_tolerance: Decimal,
    /// How long a waiting order stays valid.
    #[serde(default = "default_order_ttl", with = "duration")]
    pub order_ttl: Duration,
    /// Background cancellation of expired orders.
    #[serde(default)]
    pub expiry_sweep: ExpirySweepConfig,
    /// CAPTCHA for new users (settings-backed).
    #[serde(default = "default_true")]
    pub captcha_enabled: bool,
    /// Greeting shown in the main menu (settings-backed).
    #[serde(default)]
    pub welcome_message: Option<String>,
}

/// Expired order sweeper settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpirySweepConfig {
    /// Whether expired waiting orders are cancelled automatically.
    #[serde(default)]
    pub enabled: bool,
    /// Interval between sweeps (default: 1m).
    #[serde(default = "default_sweep_interval", with = "duration")]
    pub interval: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            processing_percentage: default_processing_percentage(),
            admin_percentage: default_admin_percentage(),
            min_amount: default_min_amount(),
            max_amount: default_max_amount(),
            max_crypto_amount: default_max_crypto_amount(),
            mismatch_tolerance: default_mismatch_tolerance(),
            order_ttl: default_order_ttl(),
            expiry_sweep: ExpirySweepConfig::default(),
            captcha_enabled: true,
            welcome_message: None,
        }
    }
}

impl Default for ExpirySweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_sweep_interval(),
        }
    }
}

fn default_processing_percentage() -> Decimal {
    dec!(10)
}

fn default_admin_percentage() -> Decimal {
    dec!(5)
}

fn default_min_amount() -> Decimal {
    dec!(1000)
}

fn default_max_amount() -> Decimal {
    dec!(500000)
}

fn default_max_crypto_amount() -> Decimal {
    dec!(10)
}

fn default_mismatch_tolerance() -> Decimal {
    Decimal::ONE
}

fn default_order_ttl() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
}
