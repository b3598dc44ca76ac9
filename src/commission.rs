//! Commission reconciliation
//!
//! The marketplace charges commission on the VAT-exclusive amount. These
//! helpers recompute it from a settlement line so the charged amount can be
//! compared with the seller's own category rate. All rounding is half-up
//! (`MidpointAwayFromZero`) to match the marketplace's statements.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::SettlementRecord;

/// VAT rate applied when a record carries none
pub const DEFAULT_VAT_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

/// Commission rate assumed for a category when the caller has none
pub const DEFAULT_ESTIMATED_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 0);

const DIVISOR_SCALE: u32 = 6;
const MONEY_SCALE: u32 = 2;

/// Commission arithmetic errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommissionError {
    /// VAT rate that would make the divisor zero or negative
    #[error("invalid VAT rate: {0}")]
    InvalidVatRate(Decimal),

    /// Decimal overflow
    #[error("amount out of range")]
    Overflow,
}

fn half_up(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// `1 + vat_rate / 100`, rounded to six places
pub fn vat_divisor(vat_rate: Decimal) -> Result<Decimal, CommissionError> {
    if vat_rate.is_sign_negative() {
        return Err(CommissionError::InvalidVatRate(vat_rate));
    }
    let divisor = Decimal::ONE + vat_rate / Decimal::ONE_HUNDRED;
    Ok(half_up(divisor, DIVISOR_SCALE))
}

/// VAT-exclusive amount of `gross`, rounded to cents
pub fn vat_base(gross: Decimal, vat_rate: Option<Decimal>) -> Result<Decimal, CommissionError> {
    let divisor = vat_divisor(vat_rate.unwrap_or(DEFAULT_VAT_RATE))?;
    let base = gross
        .checked_div(divisor)
        .ok_or(CommissionError::Overflow)?;
    Ok(half_up(base, MONEY_SCALE))
}

/// `vat_base * rate / 100`, rounded to cents
pub fn commission(vat_base: Decimal, rate: Decimal) -> Result<Decimal, CommissionError> {
    let amount = vat_base
        .checked_mul(rate)
        .ok_or(CommissionError::Overflow)?
        / Decimal::ONE_HUNDRED;
    Ok(half_up(amount, MONEY_SCALE))
}

/// Estimated vs. charged commission for one settlement line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    /// Order the line belongs to
    pub order_number: Option<String>,
    /// VAT-exclusive amount
    pub vat_base: Decimal,
    /// Commission at the caller's estimated rate
    pub estimated: Decimal,
    /// Commission at the line's own rate, if it has one
    pub recalculated: Option<Decimal>,
    /// Commission the marketplace charged, if reported
    pub actual: Option<Decimal>,
    /// `estimated - actual`
    pub difference: Option<Decimal>,
}

/// Reconcile `record` against `estimated_rate`.
pub fn reconcile(
    record: &SettlementRecord,
    estimated_rate: Decimal,
) -> Result<Reconciliation, CommissionError> {
    let base = vat_base(record.gross_amount, record.vat_rate)?;
    let estimated = commission(base, estimated_rate)?;
    let recalculated = record
        .commission_rate
        .map(|rate| commission(base, rate))
        .transpose()?;
    let actual = record.commission_amount;

    Ok(Reconciliation {
        order_number: record.order_number.clone(),
        vat_base: base,
        estimated,
        recalculated,
        actual,
        difference: actual.map(|a| estimated - a),
    })
}
