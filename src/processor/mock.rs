//! Offline processor returning synthetic responses.

use super::{
    Balance, CancelResult, CreatedOrder, OrderStatusReport, PaymentProcessor, Payout,
    ProcessorError, ProcessorOrderStatus, Result,
};
use crate::domain::PaymentType;
use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

const PAYOUT_STATUSES: [&str; 3] = ["processing", "completed", "failed"];

/// MockProcessor answers with responses shaped like the live API.
///
/// Created orders are remembered so that a `finished` status echoes the
/// amount that was requested.
pub struct MockProcessor {
    finish_probability: f64,
    orders: Mutex<HashMap<String, Decimal>>,
}

impl MockProcessor {
    /// Status checks report `finished` half of the time.
    pub fn new() -> Self {
        Self::with_finish_probability(0.5)
    }

    pub fn with_finish_probability(probability: f64) -> Self {
        Self {
            finish_probability: probability.clamp(0.0, 1.0),
            orders: Mutex::new(HashMap::new()),
        }
    }

    fn random_id() -> String {
        let mut rng = rand::thread_rng();
        (0..8)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    fn orders(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Decimal>>> {
        self.orders
            .lock()
            .map_err(|_| ProcessorError::Transport("mock state poisoned".to_string()))
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_order(
        &self,
        amount: Decimal,
        payment_type: PaymentType,
        external_ref: &str,
        _is_test: bool,
    ) -> Result<CreatedOrder> {
        let id = Self::random_id();
        self.orders()?.insert(id.clone(), amount);

        debug!(id = %id, personal_id = external_ref, amount = %amount, "Mock order created");

        let order = match payment_type {
            PaymentType::Card => CreatedOrder {
                processor_order_id: id,
                payment_type,
                requisite: "1234 5678 9012 3456".to_string(),
                owner_name: "IVAN PETROV".to_string(),
                bank_name: "Сбербанк".to_string(),
            },
            PaymentType::Sbp => CreatedOrder {
                processor_order_id: id,
                payment_type,
                requisite: "+79001234567".to_string(),
                owner_name: "Иван Петров".to_string(),
                bank_name: "Сбербанк".to_string(),
            },
        };

        Ok(order)
    }

    async fn get_order_status(&self, processor_order_id: &str) -> Result<OrderStatusReport> {
        let finished = rand::thread_rng().gen_bool(self.finish_probability);

        if !finished {
            return Ok(OrderStatusReport {
                status: ProcessorOrderStatus::Waiting,
                received_amount: None,
            });
        }

        // Unknown ids report no amount rather than a zero payment.
        let received_amount = self.orders()?.get(processor_order_id).copied();
        Ok(OrderStatusReport {
            status: ProcessorOrderStatus::Finished,
            received_amount,
        })
    }

    async fn cancel_order(&self, processor_order_id: &str) -> Result<CancelResult> {
        self.orders()?.remove(processor_order_id);
        Ok(CancelResult { cancelled: true })
    }

    async fn get_balance(&self) -> Result<Balance> {
        Ok(Balance {
            balance: dec!(150000.50),
        })
    }

    async fn create_payout(
        &self,
        kind: PaymentType,
        amount: Decimal,
        _requisite: &str,
        _bank: &str,
        external_ref: &str,
    ) -> Result<Payout> {
        let payout_id = Self::random_id();
        debug!(payout_id = %payout_id, kind = %kind, amount = %amount, personal_id = external_ref, "Mock payout created");

        Ok(Payout {
            payout_id,
            status: "processing".to_string(),
        })
    }

    async fn get_payout_status(&self, _payout_id: &str) -> Result<String> {
        let status = PAYOUT_STATUSES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("processing");
        Ok(status.to_string())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
