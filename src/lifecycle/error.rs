//! Lifecycle error types.

use crate::domain::{OrderStatus, ValidationError};
use crate::processor::ProcessorError;
use crate::storage::StorageError;
use rust_decimal::Decimal;

/// Lifecycle error type.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("order {0} not found")]
    NotFound(String),

    /// The order is not in a status the action applies to.
    #[error("order {id} is {current}, cannot {action}")]
    Conflict {
        id: i64,
        current: OrderStatus,
        action: &'static str,
    },

    #[error("amount {amount} is outside [{min}, {max}]")]
    InvalidAmount {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("{0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
