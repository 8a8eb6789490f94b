//! Payment processor integration: live HTTP client and a mock.

mod live;
mod mock;

pub use live::LiveProcessor;
pub use mock::MockProcessor;

use crate::config::{ProcessorConfig, ProcessorMode};
use crate::domain::PaymentType;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Processor errors.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Network failure or timeout. The request may be retried.
    #[error("transport error: {0}")]
    Transport(String),

    /// The processor rejected the request.
    #[error("processor error: {0}")]
    Business(String),

    /// The response could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for processor operations.
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Order accepted by the processor with the requisites the client pays to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedOrder {
    pub processor_order_id: String,
    pub payment_type: PaymentType,
    /// Card number or phone number.
    pub requisite: String,
    pub owner_name: String,
    pub bank_name: String,
}

impl CreatedOrder {
    /// Payment instructions shown to the client and stored with the order.
    pub fn requisites_text(&self) -> String {
        let label = match self.payment_type {
            PaymentType::Card => "💳 Карта",
            PaymentType::Sbp => "📱 Телефон",
        };
        format!(
            "{}: {}\n👤 Получатель: {}\n🏛 Банк: {}",
            label, self.requisite, self.owner_name, self.bank_name
        )
    }
}

/// Order status as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorOrderStatus {
    Waiting,
    Finished,
    Cancelled,
    Other(String),
}

impl ProcessorOrderStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "waiting" => ProcessorOrderStatus::Waiting,
            "finished" => ProcessorOrderStatus::Finished,
            "cancelled" | "canceled" => ProcessorOrderStatus::Cancelled,
            other => ProcessorOrderStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusReport {
    pub status: ProcessorOrderStatus,
    pub received_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelResult {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balance {
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub payout_id: String,
    pub status: String,
}

/// PaymentProcessor collects fiat from clients and sends payouts.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates a payment order for `amount` and returns the requisites.
    /// `external_ref` is our order id, echoed back in webhooks as `personal_id`.
    async fn create_order(
        &self,
        amount: Decimal,
        payment_type: PaymentType,
        external_ref: &str,
        is_test: bool,
    ) -> Result<CreatedOrder>;

    async fn get_order_status(&self, processor_order_id: &str) -> Result<OrderStatusReport>;

    async fn cancel_order(&self, processor_order_id: &str) -> Result<CancelResult>;

    async fn get_balance(&self) -> Result<Balance>;

    /// Sends `amount` to a card or phone.
    async fn create_payout(
        &self,
        kind: PaymentType,
        amount: Decimal,
        requisite: &str,
        bank: &str,
        external_ref: &str,
    ) -> Result<Payout>;

    /// Returns the payout status string (`processing`, `completed`, `failed`).
    async fn get_payout_status(&self, payout_id: &str) -> Result<String>;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// Builds the processor selected by configuration.
pub fn from_config(config: &ProcessorConfig) -> Result<Arc<dyn PaymentProcessor>> {
    let processor: Arc<dyn PaymentProcessor> = match config.mode {
        ProcessorMode::Live => Arc::new(LiveProcessor::new(config)?),
        ProcessorMode::Mock => Arc::new(MockProcessor::new()),
    };

    info!(processor = processor.name(), "Payment processor initialized");
    Ok(processor)
}

/// Reads a decimal that may be encoded as a JSON number or string.
pub(crate) fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Reads an identifier that may be encoded as a JSON number or string.
pub(crate) fn id_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
