//! Per-conversation exchange context: quote, input parsing and validation.

use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

use super::fees::{Fees, compute_fees};
use super::order::{Direction, NewOrder, PaymentType};

const MIN_FIAT_REQUISITE_LEN: usize = 10;
const BTC_ADDRESS_LEN: std::ops::RangeInclusive<usize> = 26..=62;

/// Rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid bitcoin address")]
    InvalidAddress,
    #[error("invalid payment requisite")]
    InvalidRequisite,
    #[error("invalid rate: {0}")]
    InvalidRate(Decimal),
    #[error("exchange flow is incomplete: {0} missing")]
    Incomplete(&'static str),
}

/// Priced exchange proposal shown to the user before an order is placed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quote {
    pub direction: Direction,
    pub amount_fiat: Decimal,
    pub amount_crypto: Decimal,
    pub rate: Decimal,
    pub fees: Fees,
}

impl Quote {
    /// Prices an amount entered by the user.
    ///
    /// For `Buy` the amount is fiat, for `Sell` it is BTC. Fees are always
    /// charged on the fiat side.
    pub fn calculate(
        direction: Direction,
        amount: Decimal,
        rate: Decimal,
        processing_percentage: Decimal,
        admin_percentage: Decimal,
    ) -> Result<Self, ValidationError> {
        if rate <= Decimal::ZERO {
            return Err(ValidationError::InvalidRate(rate));
        }

        let out_of_range = || ValidationError::InvalidAmount(amount.to_string());

        let (amount_fiat, amount_crypto) = match direction {
            Direction::Buy => (amount, amount.checked_div(rate).ok_or_else(out_of_range)?),
            Direction::Sell => (amount.checked_mul(rate).ok_or_else(out_of_range)?, amount),
        };

        let fees = compute_fees(amount_fiat, processing_percentage, admin_percentage)
            .ok_or_else(out_of_range)?;

        Ok(Self {
            direction,
            amount_fiat,
            amount_crypto,
            rate,
            fees,
        })
    }

    /// Builds the order to persist from this quote.
    pub fn to_new_order(
        &self,
        user_id: i64,
        payment_type: PaymentType,
        destination: impl Into<String>,
    ) -> NewOrder {
        NewOrder {
            user_id,
            direction: self.direction,
            amount_fiat: self.amount_fiat,
            amount_crypto: self.amount_crypto,
            rate: self.rate,
            processing_fee: self.fees.processing_fee,
            admin_fee: self.fees.admin_fee,
            total_amount: self.fees.total,
            payment_type,
            destination: destination.into(),
        }
    }
}

/// Step the user is currently at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    AwaitingAmount,
    AwaitingPaymentType,
    AwaitingDestination,
    ReadyToSubmit,
}

/// State of one exchange conversation, from amount input to order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeFlow {
    pub direction: Direction,
    pub step: FlowStep,
    pub quote: Option<Quote>,
    pub payment_type: Option<PaymentType>,
    pub destination: Option<String>,
}

impl ExchangeFlow {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            step: FlowStep::AwaitingAmount,
            quote: None,
            payment_type: None,
            destination: None,
        }
    }

    /// Stores the priced amount. Re-quoting resets later steps.
    pub fn set_quote(&mut self, quote: Quote) {
        self.quote = Some(quote);
        self.payment_type = None;
        self.destination = None;
        self.step = FlowStep::AwaitingPaymentType;
    }

    pub fn choose_payment_type(&mut self, payment_type: PaymentType) -> Result<(), ValidationError> {
        if self.quote.is_none() {
            return Err(ValidationError::Incomplete("amount"));
        }
        self.payment_type = Some(payment_type);
        self.step = FlowStep::AwaitingDestination;
        Ok(())
    }

    pub fn set_destination(&mut self, input: &str) -> Result<(), ValidationError> {
        if self.payment_type.is_none() {
            return Err(ValidationError::Incomplete("payment type"));
        }
        let destination = validate_destination(self.direction, input)?;
        self.destination = Some(destination);
        self.step = FlowStep::ReadyToSubmit;
        Ok(())
    }

    /// Converts a finished conversation into an order.
    pub fn into_new_order(self, user_id: i64) -> Result<NewOrder, ValidationError> {
        let quote = self.quote.ok_or(ValidationError::Incomplete("amount"))?;
        let payment_type = self
            .payment_type
            .ok_or(ValidationError::Incomplete("payment type"))?;
        let destination = self
            .destination
            .ok_or(ValidationError::Incomplete("destination"))?;

        Ok(quote.to_new_order(user_id, payment_type, destination))
    }
}

/// Parses an amount typed by a user: "10 000", "0,005" and "1500.50" are accepted.
pub fn parse_amount_input(input: &str) -> Result<Decimal, ValidationError> {
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let amount = Decimal::from_str(&normalized)
        .map_err(|_| ValidationError::InvalidAmount(input.trim().to_string()))?;

    if amount <= Decimal::ZERO {
        return Err(ValidationError::InvalidAmount(input.trim().to_string()));
    }

    Ok(amount)
}

/// Shallow check for legacy, P2SH and bech32 mainnet addresses.
pub fn validate_btc_address(address: &str) -> bool {
    let address = address.trim();
    let known_prefix =
        address.starts_with('1') || address.starts_with('3') || address.starts_with("bc1");

    known_prefix && BTC_ADDRESS_LEN.contains(&address.len())
}

/// Card number or phone number for fiat payouts.
pub fn validate_fiat_requisite(requisite: &str) -> bool {
    requisite.trim().chars().count() >= MIN_FIAT_REQUISITE_LEN
}

/// Validates the destination for the given direction and returns it trimmed.
pub fn validate_destination(direction: Direction, input: &str) -> Result<String, ValidationError> {
    let input = input.trim();
    match direction {
        Direction::Buy if !validate_btc_address(input) => Err(ValidationError::InvalidAddress),
        Direction::Sell if !validate_fiat_requisite(input) => Err(ValidationError::InvalidRequisite),
        _ => Ok(input.to_string()),
    }
}
