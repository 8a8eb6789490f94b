//! Bot users and aggregate statistics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// User of the exchange bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Chat platform user id.
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub is_blocked: bool,
    /// Number of completed orders.
    pub total_operations: i64,
    /// Sum of `total_amount` over completed orders.
    pub total_amount: Decimal,
    /// User who invited this one.
    pub referred_by: Option<i64>,
    /// Number of users invited by this one.
    pub referral_count: i64,
    /// Last time a review was left, used for the review cooldown.
    pub last_review_at: Option<DateTime<Utc>>,
}

/// Values for registering a user.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// Aggregate figures for the admin panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_users: i64,
    pub total_orders: i64,
    pub completed_orders: i64,
    /// Sum of `total_amount` over completed orders.
    pub total_volume: Decimal,
    pub today_orders: i64,
    pub today_volume: Decimal,
}

impl Statistics {
    /// Share of completed orders in percent.
    pub fn completion_rate(&self) -> Decimal {
        if self.total_orders == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.completed_orders) * Decimal::ONE_HUNDRED
            / Decimal::from(self.total_orders)
    }
}
