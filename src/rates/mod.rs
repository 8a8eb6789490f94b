//! BTC/RUB rate sources.

use crate::config::RatesConfig;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Reasons a price index response was not used.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Payload(String),
}

/// RateProvider returns fiat per 1 BTC.
///
/// Implementations never fail: a degraded source returns a fallback rate,
/// so callers cannot assume the value is fresh.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn get_rate(&self) -> Decimal;
}

/// Rate taken from the CoinGecko simple price endpoint.
pub struct CoinGeckoRates {
    http_client: HttpClient,
    url: String,
    fallback_rate: Decimal,
}

impl CoinGeckoRates {
    pub fn new(config: &RatesConfig) -> Result<Self, RateError> {
        let http_client = HttpClient::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http_client,
            url: config.url.clone(),
            fallback_rate: config.fallback_rate,
        })
    }

    async fn fetch(&self) -> Result<Decimal, RateError> {
        let response = self.http_client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        parse_rate(&body)
    }
}

#[async_trait]
impl RateProvider for CoinGeckoRates {
    async fn get_rate(&self) -> Decimal {
        match self.fetch().await {
            Ok(rate) => {
                debug!(rate = %rate, "BTC rate fetched");
                rate
            }
            Err(e) => {
                warn!(error = %e, fallback = %self.fallback_rate, "Failed to fetch BTC rate, using fallback");
                self.fallback_rate
            }
        }
    }
}

/// Constant rate.
pub struct FixedRate(pub Decimal);

#[async_trait]
impl RateProvider for FixedRate {
    async fn get_rate(&self) -> Decimal {
        self.0
    }
}

/// Extracts `bitcoin.rub` from a simple price payload.
fn parse_rate(body: &Value) -> Result<Decimal, RateError> {
    let raw = body
        .get("bitcoin")
        .and_then(|coin| coin.get("rub"))
        .ok_or_else(|| RateError::Payload("missing bitcoin.rub".to_string()))?;

    let rate = match raw {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .map_err(|e| RateError::Payload(e.to_string()))?
        }
        Value::String(s) => {
            Decimal::from_str(s).map_err(|e| RateError::Payload(e.to_string()))?
        }
        other => return Err(RateError::Payload(format!("unexpected rate value {}", other))),
    };

    if rate <= Decimal::ZERO {
        return Err(RateError::Payload(format!("non-positive rate {}", rate)));
    }

    Ok(rate)
}

#[cfg(test)]
mod tests;
