//! Test doubles for the lifecycle controller.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use super::Controller;
use crate::config::{ExchangeConfig, StaffConfig};
use crate::domain::{Direction, Order, PaymentType};
use crate::notification::{Event, EventType, NotificationError, Notifier, Recipient};
use crate::processor::{
    Balance, CancelResult, CreatedOrder, OrderStatusReport, PaymentProcessor, Payout,
    ProcessorError, ProcessorOrderStatus, Result,
};
use crate::rates::FixedRate;
use crate::settings::Settings;
use crate::storage::{OrderStore, SqliteStorage, SqliteStorageConfig};

pub(crate) const RATE: Decimal = dec!(2800000);
pub(crate) const BUY_ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

/// Scripted processor that counts calls.
pub(crate) struct FakeProcessor {
    pub next_id: Mutex<String>,
    pub fail_create: AtomicBool,
    pub fail_status: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub status: Mutex<OrderStatusReport>,
    pub last_amount: Mutex<Option<Decimal>>,
    pub last_payout: Mutex<Option<(Decimal, String)>>,
    pub create_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new("P-1".to_string()),
            fail_create: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
            fail_cancel: AtomicBool::new(false),
            status: Mutex::new(OrderStatusReport {
                status: ProcessorOrderStatus::Waiting,
                received_amount: None,
            }),
            last_amount: Mutex::new(None),
            last_payout: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        }
    }

    pub fn report(&self, status: ProcessorOrderStatus, received_amount: Option<Decimal>) {
        *self.status.lock().unwrap() = OrderStatusReport {
            status,
            received_amount,
        };
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_order(
        &self,
        amount: Decimal,
        payment_type: PaymentType,
        _external_ref: &str,
        _is_test: bool,
    ) -> Result<CreatedOrder> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_amount.lock().unwrap() = Some(amount);

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProcessorError::Transport("connection refused".to_string()));
        }

        Ok(CreatedOrder {
            processor_order_id: self.next_id.lock().unwrap().clone(),
            payment_type,
            requisite: "2200 0000 0000 0000".to_string(),
            owner_name: "IVAN PETROV".to_string(),
            bank_name: "Сбербанк".to_string(),
        })
    }

    async fn get_order_status(&self, _processor_order_id: &str) -> Result<OrderStatusReport> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(ProcessorError::Transport("timeout".to_string()));
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn cancel_order(&self, _processor_order_id: &str) -> Result<CancelResult> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(ProcessorError::Business("order is locked".to_string()));
        }
        Ok(CancelResult { cancelled: true })
    }

    async fn get_balance(&self) -> Result<Balance> {
        Ok(Balance {
            balance: dec!(1000),
        })
    }

    async fn create_payout(
        &self,
        _kind: PaymentType,
        amount: Decimal,
        requisite: &str,
        _bank: &str,
        _external_ref: &str,
    ) -> Result<Payout> {
        *self.last_payout.lock().unwrap() = Some((amount, requisite.to_string()));
        Ok(Payout {
            payout_id: "PO-9".to_string(),
            status: "processing".to_string(),
        })
    }

    async fn get_payout_status(&self, _payout_id: &str) -> Result<String> {
        Ok("completed".to_string())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Notifier that keeps every event.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn count(&self, event_type: EventType, recipient: Recipient) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type && e.recipient == recipient)
            .count()
    }

    pub fn total(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, event: &Event) -> std::result::Result<(), NotificationError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn send_async(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn is_enabled(&self, _recipient: Recipient) -> bool {
        true
    }

    async fn close(&self) -> std::result::Result<(), NotificationError> {
        Ok(())
    }
}

/// Controller wired to a temporary database and the doubles above.
pub(crate) struct Harness {
    pub controller: Arc<Controller>,
    pub store: Arc<dyn OrderStore>,
    pub processor: Arc<FakeProcessor>,
    pub notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");
        let store: Arc<dyn OrderStore> = Arc::new(
            SqliteStorage::new(SqliteStorageConfig {
                path: path.to_string_lossy().into_owned(),
                max_connections: 1,
            })
            .await
            .unwrap(),
        );

        let processor = Arc::new(FakeProcessor::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let settings = Arc::new(Settings::new(
            store.clone(),
            ExchangeConfig::default(),
            StaffConfig::default(),
        ));

        let controller = Arc::new(Controller::new(
            store.clone(),
            processor.clone(),
            Arc::new(FixedRate(RATE)),
            notifier.clone(),
            settings,
        ));

        Self {
            controller,
            store,
            processor,
            notifier,
            _dir: dir,
        }
    }

    /// Places a buy order for `amount` RUB; it ends up `waiting`.
    pub async fn waiting_buy(&self, user_id: i64, amount: Decimal) -> Order {
        let quote = self
            .controller
            .quote(Direction::Buy, amount)
            .await
            .unwrap();
        self.controller
            .create(user_id, &quote, PaymentType::Card, BUY_ADDRESS)
            .await
            .unwrap()
    }
}
