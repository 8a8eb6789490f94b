//! Exchange order entity and its status transitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client pays fiat and receives BTC on a crypto address.
    Buy,
    /// Client sends BTC and receives fiat on a card or phone.
    Sell,
}

/// How the fiat leg of the order is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Bank card transfer.
    Card,
    /// Faster Payments System transfer by phone number.
    Sbp,
}

/// OrderStatus represents where the order is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Persisted, but the processor has not issued requisites yet.
    Created,
    /// Requisites issued, waiting for the client payment.
    Waiting,
    /// The processor reported the client payment.
    PaidByClient,
    /// An operator confirmed the asset was sent.
    Completed,
    /// Cancelled by the client, an operator, the processor or expiry.
    Cancelled,
    /// Escalated by an operator for manual handling.
    Problem,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Waiting => "waiting",
            OrderStatus::PaidByClient => "paid_by_client",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Problem => "problem",
        }
    }

    /// Returns true if no further status change is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns true if `next` is reachable from this status on the normal path.
    ///
    /// Entering `Problem` is an operator override and is not part of this
    /// table.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (Created, Waiting)
                | (Created, Cancelled)
                | (Waiting, PaidByClient)
                | (Waiting, Cancelled)
                | (PaidByClient, Completed)
                | (PaidByClient, Cancelled)
                | (Problem, Completed)
                | (Problem, Cancelled)
        )
    }

    /// Statuses from which `next` is reachable on the normal path.
    pub fn sources_of(next: OrderStatus) -> Vec<OrderStatus> {
        ALL_STATUSES
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// Returns true until the processor reports the client payment.
    pub fn is_unpaid(&self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::Waiting)
    }

    /// Statuses a client, the processor or expiry may cancel.
    pub fn unpaid_sources_of_cancel() -> Vec<OrderStatus> {
        Self::sources_of(OrderStatus::Cancelled)
            .into_iter()
            .filter(OrderStatus::is_unpaid)
            .collect()
    }

    /// Statuses an operator may escalate into `Problem`: issued, not yet settled.
    pub fn escalation_sources() -> Vec<OrderStatus> {
        ALL_STATUSES
            .iter()
            .copied()
            .filter(|s| {
                s.can_transition_to(OrderStatus::Completed)
                    || s.can_transition_to(OrderStatus::PaidByClient)
            })
            .filter(|s| *s != OrderStatus::Problem)
            .collect()
    }
}

const ALL_STATUSES: [OrderStatus; 6] = [
    OrderStatus::Created,
    OrderStatus::Waiting,
    OrderStatus::PaidByClient,
    OrderStatus::Completed,
    OrderStatus::Cancelled,
    OrderStatus::Problem,
];

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            "waiting" => Ok(OrderStatus::Waiting),
            "paid_by_client" => Ok(OrderStatus::PaidByClient),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "problem" => Ok(OrderStatus::Problem),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentType::Card => write!(f, "card"),
            PaymentType::Sbp => write!(f, "sbp"),
        }
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentType::Card),
            "sbp" => Ok(PaymentType::Sbp),
            _ => Err(format!("Unknown payment type: {}", s)),
        }
    }
}

/// Order represents one exchange request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Store-assigned identifier, also sent to the processor as `personal_id`.
    pub id: i64,
    /// Processor order id, present once the processor accepted the order.
    pub external_id: Option<String>,
    /// Owning user.
    pub user_id: i64,
    pub direction: Direction,
    /// Base fiat amount, before fees.
    pub amount_fiat: Decimal,
    pub amount_crypto: Decimal,
    /// Fiat per 1 BTC at creation time.
    pub rate: Decimal,
    pub processing_fee: Decimal,
    pub admin_fee: Decimal,
    /// Amount the client has to pay.
    pub total_amount: Decimal,
    pub payment_type: PaymentType,
    /// BTC address (buy) or fiat requisite (sell).
    pub destination: String,
    /// Payment instructions issued by the processor.
    pub requisites: Option<String>,
    pub status: OrderStatus,
    pub is_problematic: bool,
    /// Amount the processor reported as received.
    pub received_amount: Option<Decimal>,
    pub operator_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Identifier shown to people: the processor id once bound, else the internal id.
    pub fn display_id(&self) -> String {
        self.external_id
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Returns true if the received amount differs from the total by more than `tolerance`.
    /// A difference too large to represent counts as a mismatch.
    pub fn is_amount_mismatch(&self, received: Decimal, tolerance: Decimal) -> bool {
        match received.checked_sub(self.total_amount) {
            Some(diff) => diff.abs() > tolerance,
            None => true,
        }
    }
}

/// Values for a new order, snapshotted from a quote.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: i64,
    pub direction: Direction,
    pub amount_fiat: Decimal,
    pub amount_crypto: Decimal,
    pub rate: Decimal,
    pub processing_fee: Decimal,
    pub admin_fee: Decimal,
    pub total_amount: Decimal,
    pub payment_type: PaymentType,
    pub destination: String,
}

/// Partial update of an order. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub is_problematic: Option<bool>,
    pub requisites: Option<String>,
    pub external_id: Option<String>,
    pub operator_notes: Option<String>,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        self == &OrderUpdate::default()
    }
}
