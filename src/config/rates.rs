//! Rate provider configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// BTC/RUB price source settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RatesConfig {
    /// Price index endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// Request timeout.
    #[serde(default = "default_timeout", with = "duration")]
    pub timeout: Duration,
    /// Rate used when the price index is unavailable.
    #[serde(default = "default_fallback_rate")]
    pub fallback_rate: Decimal,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout: default_timeout(),
            fallback_rate: default_fallback_rate(),
        }
    }
}

fn default_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=rub".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_fallback_rate() -> Decimal {
    dec!(2800000)
}
