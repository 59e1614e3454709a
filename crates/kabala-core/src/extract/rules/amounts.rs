//! Amount extraction for receipts.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

use super::patterns::{AMOUNT_PATTERN, PRE_TAX_LABELED, TAX_EXCLUDED_PREFIXES, TAX_LABELED, TOTAL_LABELED};
use super::{ExtractionMatch, FieldExtractor, RegexRule, Rule, first_rule_matches};
use crate::confidence::MatchKind;
use crate::validation::tax::recompute_tax;

/// Generic amount extractor.
///
/// Finds every decimal amount in the text, skipping numbers that are part
/// of a date (`15.03.2024`) or a percentage.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for caps in AMOUNT_PATTERN.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            if is_part_of_date_or_percent(text, m.start(), m.end()) {
                continue;
            }
            if let Some(amount) = parse_amount(m.as_str()) {
                results.push(
                    ExtractionMatch::new(amount, MatchKind::Fallback, "amount_any", m.as_str())
                        .with_position(m.start(), m.end()),
                );
            }
        }

        results
    }
}

fn is_part_of_date_or_percent(text: &str, start: usize, end: usize) -> bool {
    let mut before = text[..start].chars().rev();
    let date_before = matches!(
        (before.next(), before.next()),
        (Some('.' | '/' | '-'), Some(c)) if c.is_ascii_digit()
    );

    let mut after = text[end..].chars();
    let next = after.next();
    let date_after = matches!(
        (next, after.next()),
        (Some('.' | '/' | '-'), Some(c)) if c.is_ascii_digit()
    );

    date_before || date_after || next == Some('%')
}

/// Amounts found on a receipt.
#[derive(Debug, Clone, Default)]
pub struct ReceiptTotals {
    /// Total amount including tax.
    pub total: Option<ExtractionMatch<Decimal>>,
    /// Tax amount.
    pub tax: Option<ExtractionMatch<Decimal>>,
    /// Amount before tax.
    pub pre_tax: Option<ExtractionMatch<Decimal>>,
    /// All detected amounts.
    pub all_amounts: Vec<ExtractionMatch<Decimal>>,
}

/// Extractor for the total, tax and pre-tax amounts.
///
/// Labelled totals win over unlabelled amounts; when several candidates
/// exist the numerically largest one is taken. Missing parts of the
/// breakdown are derived from the others, or from the tax rate when only
/// the total is known.
pub struct TotalsExtractor {
    amounts: AmountExtractor,
    total_rules: Vec<Box<dyn Rule>>,
    pre_tax_rules: Vec<Box<dyn Rule>>,
    tax_rules: Vec<Box<dyn Rule>>,
}

impl TotalsExtractor {
    pub fn new() -> Self {
        Self {
            amounts: AmountExtractor::new(),
            total_rules: vec![Box::new(RegexRule::new(
                "total_labeled",
                &TOTAL_LABELED,
                MatchKind::Pattern,
            ))],
            pre_tax_rules: vec![Box::new(RegexRule::new(
                "pre_tax_labeled",
                &PRE_TAX_LABELED,
                MatchKind::Pattern,
            ))],
            tax_rules: vec![Box::new(
                RegexRule::new("tax_labeled", &TAX_LABELED, MatchKind::Pattern)
                    .excluding(TAX_EXCLUDED_PREFIXES),
            )],
        }
    }

    pub fn extract(&self, text: &str, tax_rate: Decimal) -> ReceiptTotals {
        let mut result = ReceiptTotals {
            all_amounts: self.amounts.extract_all(text),
            total: largest(first_rule_matches(&self.total_rules, text, parse_amount)),
            pre_tax: first_rule_matches(&self.pre_tax_rules, text, parse_amount)
                .into_iter()
                .next(),
            tax: first_rule_matches(&self.tax_rules, text, parse_amount)
                .into_iter()
                .next(),
        };
        derive_breakdown(&mut result, tax_rate);
        result
    }
}

impl Default for TotalsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the total, tax and pre-tax amounts from receipt text.
pub fn extract_totals(text: &str, tax_rate: Decimal) -> ReceiptTotals {
    TotalsExtractor::new().extract(text, tax_rate)
}

fn derive_breakdown(result: &mut ReceiptTotals, tax_rate: Decimal) {

    // Labelled breakdown without a labelled total
    if result.total.is_none() {
        if let (Some(pre_tax), Some(tax)) = (&result.pre_tax, &result.tax) {
            result.total = Some(ExtractionMatch::calculated(
                pre_tax.value + tax.value,
                "total_from_breakdown",
            ));
        }
    }

    // Fall back to the largest amount on the receipt
    if result.total.is_none() {
        result.total = largest(result.all_amounts.clone());
    }

    let Some(total) = result.total.as_ref().map(|t| t.value) else {
        return;
    };

    match (&result.pre_tax, &result.tax) {
        (Some(pre_tax), None) if pre_tax.value <= total => {
            result.tax = Some(ExtractionMatch::calculated(
                total - pre_tax.value,
                "tax_from_total",
            ));
        }
        (None, Some(tax)) if tax.value <= total => {
            result.pre_tax = Some(ExtractionMatch::calculated(
                total - tax.value,
                "pre_tax_from_total",
            ));
        }
        (None, None) => {
            let breakdown = recompute_tax(total, tax_rate);
            result.pre_tax = Some(ExtractionMatch::calculated(
                breakdown.pre_tax,
                "pre_tax_from_rate",
            ));
            result.tax = Some(ExtractionMatch::calculated(breakdown.tax, "tax_from_rate"));
        }
        _ => {}
    }
}

fn largest(matches: Vec<ExtractionMatch<Decimal>>) -> Option<ExtractionMatch<Decimal>> {
    // Earlier match wins on equal values
    matches.into_iter().reduce(|best, m| if m.value > best.value { m } else { best })
}

/// Parse an amount written with either `.` or `,` as the decimal separator.
///
/// The last separator is the decimal point when one or two digits follow
/// it; every other separator is a thousands separator. Currency symbols and
/// spaces are ignored. The result carries two decimal places.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match cleaned.rfind([',', '.']) {
        Some(pos) if (1..=2).contains(&(cleaned.len() - pos - 1)) => {
            let integer: String = cleaned[..pos].chars().filter(|c| c.is_ascii_digit()).collect();
            let integer = if integer.is_empty() { "0".to_string() } else { integer };
            format!("{}.{}", integer, &cleaned[pos + 1..])
        }
        _ => cleaned.chars().filter(|c| c.is_ascii_digit()).collect(),
    };

    let mut amount = Decimal::from_str(&normalized).ok()?;
    amount.rescale(2);
    Some(amount)
}

/// Format an amount with a currency symbol and thousands separators
/// (`₪1,234.56`).
pub fn format_currency(amount: Decimal, symbol: &str) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let s = format!("{:.2}", rounded.abs());
    let (integer_part, decimal_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    // Add thousand separators
    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(*c);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}{}{}.{}", sign, symbol, formatted, decimal_part)
}
