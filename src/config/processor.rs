//! Payment processor configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Which processor implementation to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorMode {
    /// Real HTTP calls to the processor API.
    Live,
    /// Synthetic responses, no network.
    Mock,
}

/// Payment processor settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Live or mock implementation.
    #[serde(default = "default_mode")]
    pub mode: ProcessorMode,
    /// Base URL of the processor API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for a single request attempt.
    #[serde(default = "default_timeout", with = "duration")]
    pub timeout: Duration,
    /// Retries after a transport failure (business errors are never retried).
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// API id (loaded from PROCESSOR_API_ID env var).
    #[serde(skip)]
    pub api_id: String,
    /// Secret key for order calls (loaded from PROCESSOR_SECRET_KEY env var).
    #[serde(skip)]
    pub secret_key: String,
    /// Payment key for balance and payout calls (loaded from PROCESSOR_PAYMENT_KEY env var).
    #[serde(skip)]
    pub payment_key: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            base_url: default_base_url(),
            timeout: default_timeout(),
            retries: default_retries(),
            api_id: String::new(),
            secret_key: String::new(),
            payment_key: String::new(),
        }
    }
}

fn default_mode() -> ProcessorMode {
    ProcessorMode::Mock
}

fn default_base_url() -> String {
    "https://onlypays.net".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retries() -> u32 {
    1
}
