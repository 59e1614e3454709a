//! Display formatting for audit values and user-facing text.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::extract::rules::format_currency;

/// Shown in place of an absent value.
pub const EMPTY_MARKER: &str = "(ריק)";

/// Default currency symbol.
pub const SHEKEL: &str = "₪";

/// Day/month/year, e.g. `15/03/2024`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Amount in shekels, e.g. `₪1,234.56`.
pub fn format_shekels(amount: Decimal) -> String {
    format_currency(amount, SHEKEL)
}

/// Yes/no in Hebrew.
pub fn format_bool(value: bool) -> &'static str {
    if value { "כן" } else { "לא" }
}

/// Format an optional value, falling back to [`EMPTY_MARKER`].
pub fn or_empty<T>(value: Option<T>, format: impl FnOnce(T) -> String) -> String {
    value.map(format).unwrap_or_else(|| EMPTY_MARKER.to_string())
}
