//! Runtime statistics for the service.

/// Counters of the background expiry sweeper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub sweeps: u64,
    pub orders_expired: u64,
    pub sweep_failures: u64,
}
