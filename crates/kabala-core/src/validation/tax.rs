//! Tax arithmetic.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A total split into its pre-tax and tax parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub pre_tax: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Split `total` into pre-tax and tax amounts at the given rate.
///
/// The pre-tax amount is rounded half-up to 2 places and the tax is the
/// remainder, so `pre_tax + tax == total` always holds exactly.
pub fn recompute_tax(total: Decimal, rate: Decimal) -> TaxBreakdown {
    let divisor = Decimal::ONE + rate;
    let pre_tax = if divisor > Decimal::ZERO {
        total
            .checked_div(divisor)
            .unwrap_or(total)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    } else {
        total
    };

    TaxBreakdown {
        pre_tax,
        tax: total - pre_tax,
        total,
    }
}

/// `pre_tax + tax - total`.
pub fn discrepancy(pre_tax: Decimal, tax: Decimal, total: Decimal) -> Decimal {
    pre_tax + tax - total
}

/// Whether `pre_tax + tax` matches `total` within `tolerance` (inclusive).
pub fn reconciles(pre_tax: Decimal, tax: Decimal, total: Decimal, tolerance: Decimal) -> bool {
    discrepancy(pre_tax, tax, total).abs() <= tolerance
}
