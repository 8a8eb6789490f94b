//! Storage interfaces and implementations for orders, users and settings.

mod sqlite;

pub use sqlite::{SqliteStorage, SqliteStorageConfig};

use crate::domain::{
    NewOrder, NewUser, Order, OrderStatus, OrderUpdate, SettingValue, Statistics, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// OrderStore is the only shared state of the service.
///
/// Status changes go through the conditional methods (`transition_status`,
/// `bind_processor`, `record_payment`, `complete_order`, `escalate_order`):
/// each updates the row only if its current status is one of the expected
/// ones and reports whether it did. Concurrent callers therefore apply a
/// transition at most once.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order in `created` status.
    async fn create_order(&self, order: &NewOrder) -> Result<Order, StorageError>;

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StorageError>;

    async fn get_order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Order>, StorageError>;

    /// Unconditional partial update. Returns false if the order does not exist.
    async fn update_order(&self, id: i64, update: &OrderUpdate) -> Result<bool, StorageError>;

    /// Newest orders of a user first.
    async fn get_user_orders(&self, user_id: i64, limit: i64) -> Result<Vec<Order>, StorageError>;

    /// Sets `to` if the current status is one of `from`.
    async fn transition_status(
        &self,
        id: i64,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<bool, StorageError>;

    /// Stores the processor binding and moves `created` to `waiting`.
    async fn bind_processor(
        &self,
        id: i64,
        external_id: &str,
        requisites: &str,
    ) -> Result<bool, StorageError>;

    /// Moves `waiting` to `paid_by_client`, recording the received amount.
    /// `problematic` only ever raises the flag.
    async fn record_payment(
        &self,
        id: i64,
        received_amount: Option<Decimal>,
        problematic: bool,
    ) -> Result<bool, StorageError>;

    /// Moves `paid_by_client` or `problem` to `completed` and adds the order
    /// to the owner's totals in the same transaction.
    async fn complete_order(&self, id: i64) -> Result<bool, StorageError>;

    /// Moves `waiting` or `paid_by_client` to `problem` and raises the flag.
    async fn escalate_order(&self, id: i64) -> Result<bool, StorageError>;

    /// Orders in `status` created before `created_before`, oldest first.
    async fn list_orders_created_before(
        &self,
        status: OrderStatus,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Order>, StorageError>;

    async fn get_setting(&self, key: &str) -> Result<Option<SettingValue>, StorageError>;

    async fn set_setting(&self, key: &str, value: &SettingValue) -> Result<(), StorageError>;

    /// Registers a user. Returns false if the user already exists.
    async fn add_user(&self, user: &NewUser) -> Result<bool, StorageError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError>;

    async fn set_user_blocked(&self, id: i64, blocked: bool) -> Result<bool, StorageError>;

    /// Links a user to the one who invited them and bumps the referrer's
    /// counter. A user can be linked only once and never to themselves.
    async fn link_referral(&self, user_id: i64, referrer_id: i64) -> Result<bool, StorageError>;

    /// Records the time of the user's last review.
    async fn touch_review(&self, user_id: i64, at: DateTime<Utc>) -> Result<bool, StorageError>;

    /// Aggregates; "today" figures count orders created at or after `today_start`.
    async fn get_statistics(&self, today_start: DateTime<Utc>) -> Result<Statistics, StorageError>;

    /// Close closes the storage connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests;
