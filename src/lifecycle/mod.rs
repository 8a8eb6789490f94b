//! Order lifecycle controller.
//!
//! Drives an order from quote to settlement. The controller keeps no state
//! of its own: every transition is a conditional update in the store, so a
//! webhook and a status poll racing on the same order apply it once and only
//! the winner emits notifications.

mod error;

pub use error::LifecycleError;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::domain::{
    Direction, Order, OrderStatus, OrderUpdate, PaymentType, Quote, validate_destination,
};
use crate::notification::{CancelReason, Event, Notifier};
use crate::processor::{Balance, PaymentProcessor, Payout, ProcessorError, ProcessorOrderStatus};
use crate::rates::RateProvider;
use crate::settings::Settings;
use crate::storage::OrderStore;

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Payment notification from the processor, already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookUpdate {
    /// Our order id as echoed by the processor.
    pub personal_id: String,
    /// Processor order id, when present.
    pub processor_id: Option<String>,
    pub status: String,
    pub received_amount: Option<Decimal>,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// The order moved to a new status.
    Applied(OrderStatus),
    /// Duplicate, late or irrelevant delivery; nothing changed.
    Ignored(OrderStatus),
}

/// Controller orchestrates order transitions.
pub struct Controller {
    store: Arc<dyn OrderStore>,
    processor: Arc<dyn PaymentProcessor>,
    rates: Arc<dyn RateProvider>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<Settings>,
}

impl Controller {
    pub fn new(
        store: Arc<dyn OrderStore>,
        processor: Arc<dyn PaymentProcessor>,
        rates: Arc<dyn RateProvider>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store,
            processor,
            rates,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(order_id.to_string()))
    }

    pub async fn user_orders(&self, user_id: i64, limit: i64) -> Result<Vec<Order>> {
        Ok(self.store.get_user_orders(user_id, limit).await?)
    }

    /// Prices an amount at the current rate.
    ///
    /// Buy amounts are fiat and must lie within the configured limits. Sell
    /// amounts are BTC and must be positive and not above the crypto limit.
    pub async fn quote(&self, direction: Direction, amount: Decimal) -> Result<Quote> {
        match direction {
            Direction::Buy => {
                let min = self.settings.min_amount().await?;
                let max = self.settings.max_amount().await?;
                if amount < min || amount > max {
                    return Err(LifecycleError::InvalidAmount { amount, min, max });
                }
            }
            Direction::Sell => {
                let max = self.settings.defaults().max_crypto_amount;
                if amount <= Decimal::ZERO || amount > max {
                    return Err(LifecycleError::InvalidAmount {
                        amount,
                        min: Decimal::ZERO,
                        max,
                    });
                }
            }
        }

        let rate = self.rates.get_rate().await;
        let admin_percentage = self.settings.admin_percentage().await?;
        let processing_percentage = self.settings.defaults().processing_percentage;

        let quote = Quote::calculate(
            direction,
            amount,
            rate,
            processing_percentage,
            admin_percentage,
        )?;

        debug!(
            direction = %direction,
            amount = %amount,
            rate = %rate,
            total = %quote.fees.total,
            "Quote calculated"
        );
        Ok(quote)
    }

    /// Persists the order and places it with the processor.
    ///
    /// If the processor call fails the order stays in `created` without an
    /// external id and the processor error is returned.
    pub async fn create(
        &self,
        user_id: i64,
        quote: &Quote,
        payment_type: PaymentType,
        destination: &str,
    ) -> Result<Order> {
        let destination = validate_destination(quote.direction, destination)?;
        let order = self
            .store
            .create_order(&quote.to_new_order(user_id, payment_type, destination))
            .await?;

        let created = match self
            .processor
            .create_order(
                order.total_amount,
                payment_type,
                &order.id.to_string(),
                false,
            )
            .await
        {
            Ok(created) => created,
            Err(e) => {
                warn!(order_id = order.id, error = %e, "Processor did not accept order");
                return Err(e.into());
            }
        };

        let bound = self
            .store
            .bind_processor(
                order.id,
                &created.processor_order_id,
                &created.requisites_text(),
            )
            .await?;

        if !bound {
            let current = self.get_order(order.id).await?;
            if let Err(e) = self
                .processor
                .cancel_order(&created.processor_order_id)
                .await
            {
                warn!(order_id = order.id, error = %e, "Failed to release processor order");
            }
            return Err(LifecycleError::Conflict {
                id: order.id,
                current: current.status,
                action: "bind processor order",
            });
        }

        info!(
            order_id = order.id,
            external_id = %created.processor_order_id,
            user_id,
            total = %order.total_amount,
            "Order placed"
        );

        self.get_order(order.id).await
    }

    /// Asks the processor about a waiting order and applies the answer.
    ///
    /// Orders that are not waiting are returned unchanged. A processor
    /// failure leaves the order untouched.
    pub async fn poll_status(&self, order_id: i64) -> Result<Order> {
        let order = self.get_order(order_id).await?;

        let external_id = match (&order.status, &order.external_id) {
            (OrderStatus::Waiting, Some(external_id)) => external_id.clone(),
            _ => return Ok(order),
        };

        let report = self.processor.get_order_status(&external_id).await?;

        self.apply_processor_status(&order, &report.status, report.received_amount)
            .await?;

        self.get_order(order_id).await
    }

    /// Applies a processor callback. Safe to call repeatedly with the same payload.
    pub async fn webhook_update(&self, update: &WebhookUpdate) -> Result<WebhookOutcome> {
        let order = self.resolve_webhook_order(&update.personal_id).await?;

        if let (Some(processor_id), Some(external_id)) = (&update.processor_id, &order.external_id)
            && processor_id != external_id
        {
            warn!(
                order_id = order.id,
                external_id = %external_id,
                processor_id = %processor_id,
                "Webhook processor id does not match order"
            );
            return Err(LifecycleError::NotFound(update.personal_id.clone()));
        }

        let status = ProcessorOrderStatus::parse(&update.status);
        let applied = self
            .apply_processor_status(&order, &status, update.received_amount)
            .await?;

        let current = self.get_order(order.id).await?.status;

        info!(
            order_id = order.id,
            status = %update.status,
            applied,
            current = %current,
            "Webhook processed"
        );

        Ok(if applied {
            WebhookOutcome::Applied(current)
        } else {
            WebhookOutcome::Ignored(current)
        })
    }

    /// Raises the problem flag without touching the status.
    pub async fn mark_problematic(&self, order_id: i64, note: Option<String>) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if order.status.is_terminal() {
            return Err(LifecycleError::Conflict {
                id: order_id,
                current: order.status,
                action: "flag as problematic",
            });
        }

        self.store
            .update_order(
                order_id,
                &OrderUpdate {
                    is_problematic: Some(true),
                    operator_notes: note,
                    ..Default::default()
                },
            )
            .await?;

        warn!(order_id, "Order flagged as problematic");
        self.get_order(order_id).await
    }

    /// Operator sent the asset: `paid_by_client` or `problem` become `completed`
    /// and the owner's totals grow by the order total.
    pub async fn operator_confirm_sent(&self, order_id: i64) -> Result<Order> {
        let order = self.get_order(order_id).await?;

        if !self.store.complete_order(order_id).await? {
            let current = self.get_order(order_id).await?;
            return Err(LifecycleError::Conflict {
                id: order_id,
                current: current.status,
                action: "complete",
            });
        }

        let completed = self.get_order(order_id).await?;
        self.notifier.send_async(Event::order_completed(&completed));

        info!(
            order_id,
            user_id = order.user_id,
            total = %order.total_amount,
            "Order completed"
        );
        Ok(completed)
    }

    /// Operator did not receive the payment.
    ///
    /// A `waiting` order goes through the same processor-first cancellation
    /// as a client cancel. Paid or problem orders are cancelled locally.
    pub async fn operator_reject(&self, order_id: i64) -> Result<Order> {
        let order = self.get_order(order_id).await?;

        if order.status == OrderStatus::Waiting {
            let cancelled = self
                .cancel_with_reason(order, CancelReason::PaymentNotReceived)
                .await?;
            info!(order_id, "Order rejected by operator");
            return Ok(cancelled);
        }

        let sources: Vec<OrderStatus> = OrderStatus::sources_of(OrderStatus::Cancelled)
            .into_iter()
            .filter(|s| !s.is_unpaid())
            .collect();

        let applied = self
            .store
            .transition_status(order_id, &sources, OrderStatus::Cancelled)
            .await?;

        if !applied {
            let current = self.get_order(order_id).await?;
            return Err(LifecycleError::Conflict {
                id: order_id,
                current: current.status,
                action: "reject",
            });
        }

        let cancelled = self.get_order(order_id).await?;
        self.notifier.send_async(Event::order_cancelled(
            &cancelled,
            CancelReason::PaymentNotReceived,
        ));

        info!(order_id, "Order rejected by operator");
        Ok(cancelled)
    }

    /// Cancels an order the client has not paid yet.
    ///
    /// A bound order is cancelled at the processor first. If that fails the
    /// order stays `waiting`, is flagged for operators and the error is returned.
    pub async fn cancel(&self, order_id: i64) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        self.cancel_with_reason(order, CancelReason::ClientRequest)
            .await
    }

    /// Overwrites the operator notes.
    pub async fn set_operator_notes(&self, order_id: i64, notes: &str) -> Result<Order> {
        let updated = self
            .store
            .update_order(
                order_id,
                &OrderUpdate {
                    operator_notes: Some(notes.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        if !updated {
            return Err(LifecycleError::NotFound(order_id.to_string()));
        }
        self.get_order(order_id).await
    }

    /// Moves a `waiting` or `paid_by_client` order to `problem` for manual handling.
    pub async fn operator_escalate(&self, order_id: i64, note: &str) -> Result<Order> {
        self.get_order(order_id).await?;

        if !self.store.escalate_order(order_id).await? {
            let current = self.get_order(order_id).await?;
            return Err(LifecycleError::Conflict {
                id: order_id,
                current: current.status,
                action: "escalate",
            });
        }

        if !note.is_empty() {
            self.store
                .update_order(
                    order_id,
                    &OrderUpdate {
                        operator_notes: Some(note.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let escalated = self.get_order(order_id).await?;
        self.notifier
            .send_async(Event::order_problem(&escalated, note));

        warn!(order_id, note, "Order escalated");
        Ok(escalated)
    }

    /// Cancels waiting orders created more than the order TTL before `now`.
    /// Returns how many were cancelled.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let ttl = chrono::Duration::from_std(self.settings.defaults().order_ttl)
            .map_err(|_| LifecycleError::Unsupported("order TTL is out of range"))?;

        let stale = self
            .store
            .list_orders_created_before(OrderStatus::Waiting, now - ttl)
            .await?;

        let mut expired = 0;
        for order in stale {
            let order_id = order.id;
            match self.cancel_with_reason(order, CancelReason::Expired).await {
                Ok(_) => expired += 1,
                Err(e) => warn!(order_id, error = %e, "Failed to expire order"),
            }
        }

        if expired > 0 {
            info!(expired, "Expired orders cancelled");
        }
        Ok(expired)
    }

    pub async fn processor_balance(&self) -> Result<Balance> {
        Ok(self.processor.get_balance().await?)
    }

    /// Pays the base fiat amount of a paid sell order to the client's requisite.
    pub async fn send_payout(&self, order_id: i64, bank: &str) -> Result<Payout> {
        let order = self.get_order(order_id).await?;

        if order.direction != Direction::Sell {
            return Err(LifecycleError::Unsupported(
                "payouts are only made for sell orders",
            ));
        }
        if !OrderStatus::sources_of(OrderStatus::Completed).contains(&order.status) {
            return Err(LifecycleError::Conflict {
                id: order_id,
                current: order.status,
                action: "pay out",
            });
        }

        let payout = self
            .processor
            .create_payout(
                order.payment_type,
                order.amount_fiat,
                &order.destination,
                bank,
                &order.id.to_string(),
            )
            .await?;

        self.store
            .update_order(
                order_id,
                &OrderUpdate {
                    operator_notes: Some(format!(
                        "Выплата {}: {}",
                        payout.payout_id, payout.status
                    )),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            order_id,
            payout_id = %payout.payout_id,
            amount = %order.amount_fiat,
            "Payout created"
        );
        Ok(payout)
    }

    pub async fn payout_status(&self, payout_id: &str) -> Result<String> {
        Ok(self.processor.get_payout_status(payout_id).await?)
    }

    /// Webhooks carry our id as `personal_id`; fall back to the processor id
    /// for non-numeric values.
    async fn resolve_webhook_order(&self, personal_id: &str) -> Result<Order> {
        let found = match personal_id.trim().parse::<i64>() {
            Ok(id) => self.store.get_order(id).await?,
            Err(_) => self.store.get_order_by_external_id(personal_id).await?,
        };
        found.ok_or_else(|| LifecycleError::NotFound(personal_id.to_string()))
    }

    /// Returns true if this call changed the order status.
    async fn apply_processor_status(
        &self,
        order: &Order,
        status: &ProcessorOrderStatus,
        received_amount: Option<Decimal>,
    ) -> Result<bool> {
        match status {
            ProcessorOrderStatus::Finished => self.mark_paid(order, received_amount).await,
            ProcessorOrderStatus::Cancelled => {
                let applied = self
                    .store
                    .transition_status(
                        order.id,
                        &OrderStatus::unpaid_sources_of_cancel(),
                        OrderStatus::Cancelled,
                    )
                    .await?;

                if applied {
                    let cancelled = self.get_order(order.id).await?;
                    self.notifier
                        .send_async(Event::order_cancelled(&cancelled, CancelReason::Processor));
                    info!(order_id = order.id, "Order cancelled by processor");
                }
                Ok(applied)
            }
            ProcessorOrderStatus::Waiting | ProcessorOrderStatus::Other(_) => Ok(false),
        }
    }

    async fn mark_paid(&self, order: &Order, received_amount: Option<Decimal>) -> Result<bool> {
        let tolerance = self.settings.defaults().mismatch_tolerance;
        let problematic = received_amount
            .map(|received| order.is_amount_mismatch(received, tolerance))
            .unwrap_or(false);

        if !self
            .store
            .record_payment(order.id, received_amount, problematic)
            .await?
        {
            debug!(order_id = order.id, status = %order.status, "Payment already recorded or order not waiting");
            return Ok(false);
        }

        if problematic {
            warn!(
                order_id = order.id,
                expected = %order.total_amount,
                received = ?received_amount,
                "Received amount does not match order total"
            );
        }

        let paid = self.get_order(order.id).await?;
        self.notifier
            .send_async(Event::payment_received_client(&paid));
        self.notifier
            .send_async(Event::payment_received_operators(&paid));

        info!(order_id = order.id, problematic, "Client payment received");
        Ok(true)
    }

    async fn cancel_with_reason(&self, order: Order, reason: CancelReason) -> Result<Order> {
        if !order.status.is_unpaid() {
            return Err(LifecycleError::Conflict {
                id: order.id,
                current: order.status,
                action: "cancel",
            });
        }

        if order.status == OrderStatus::Waiting
            && let Some(ref external_id) = order.external_id
        {
            let failure = match self.processor.cancel_order(external_id).await {
                Ok(result) if result.cancelled => None,
                Ok(_) => Some(ProcessorError::Business(
                    "processor refused to cancel the order".to_string(),
                )),
                Err(e) => Some(e),
            };

            if let Some(e) = failure {
                let note = format!("Не удалось отменить заявку в платежной системе: {}", e);
                self.store
                    .update_order(
                        order.id,
                        &OrderUpdate {
                            is_problematic: Some(true),
                            operator_notes: Some(note.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;

                let flagged = self.get_order(order.id).await?;
                self.notifier.send_async(Event::order_problem(&flagged, note));

                warn!(order_id = order.id, error = %e, "Processor cancellation failed");
                return Err(e.into());
            }
        }

        let applied = self
            .store
            .transition_status(
                order.id,
                &OrderStatus::unpaid_sources_of_cancel(),
                OrderStatus::Cancelled,
            )
            .await?;

        if !applied {
            let current = self.get_order(order.id).await?;
            if order.external_id.is_some() {
                // Cancelled at the processor, but the order moved on meanwhile.
                self.notifier.send_async(Event::order_problem(
                    &current,
                    "Заявка отменена в платежной системе, но ее статус уже изменился",
                ));
            }
            return Err(LifecycleError::Conflict {
                id: order.id,
                current: current.status,
                action: "cancel",
            });
        }

        let cancelled = self.get_order(order.id).await?;
        self.notifier
            .send_async(Event::order_cancelled(&cancelled, reason));

        info!(order_id = order.id, reason = ?reason, "Order cancelled");
        Ok(cancelled)
    }
}

#[cfg(test)]
pub(crate) mod testing;
