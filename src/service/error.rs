//! Service error types.

use crate::notification::NotificationError;
use crate::processor::ProcessorError;
use crate::rates::RateError;
use crate::storage::StorageError;

/// Service error type.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service is already running")]
    AlreadyRunning,
    #[error("invalid webhook address: {0}")]
    InvalidAddress(String),
    #[error("failed to bind webhook listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("webhook server error: {0}")]
    Server(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),
    #[error("rate provider error: {0}")]
    Rates(#[from] RateError),
    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),
}
