//! Commission calculation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Fees charged on top of the base fiat amount of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    /// Processor commission, charged on the base amount.
    pub processing_fee: Decimal,
    /// Service commission, charged on base amount plus processing fee.
    pub admin_fee: Decimal,
    /// Amount the client pays: base + processing fee + admin fee.
    pub total: Decimal,
}

/// Computes processing fee, admin fee and the total payable.
///
/// Percentages are expressed in percent (10 means 10%). No rounding is
/// applied. Negative inputs are not rejected here; callers validate the
/// amount against the configured limits first. Returns `None` if any step
/// overflows `Decimal`.
pub fn compute_fees(
    base_amount: Decimal,
    processing_percentage: Decimal,
    admin_percentage: Decimal,
) -> Option<Fees> {
    let processing_fee = base_amount
        .checked_mul(processing_percentage)?
        .checked_div(HUNDRED)?;
    let admin_fee = base_amount
        .checked_add(processing_fee)?
        .checked_mul(admin_percentage)?
        .checked_div(HUNDRED)?;
    let total = base_amount
        .checked_add(processing_fee)?
        .checked_add(admin_fee)?;

    Some(Fees {
        processing_fee,
        admin_fee,
        total,
    })
}
