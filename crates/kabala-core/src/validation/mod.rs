//! Soft validation of receipt fields.
//!
//! Every rule yields at most one warning and none of them block a save.

pub mod tax;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::rules::validate_tax_id;
use crate::format::{format_date, format_shekels};
use crate::models::config::ValidationConfig;
use crate::models::receipt::{FieldName, Receipt, ReceiptFields};

pub use tax::{TaxBreakdown, discrepancy, reconciles, recompute_tax};

/// Identifies which rule produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    InvalidTaxId,
    DateInFuture,
    DateTooOld,
    TaxMismatch,
    LowConfidence,
    MissingVendor,
    MissingDate,
    MissingTotal,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::InvalidTaxId => "invalid_tax_id",
            WarningCode::DateInFuture => "date_in_future",
            WarningCode::DateTooOld => "date_too_old",
            WarningCode::TaxMismatch => "tax_mismatch",
            WarningCode::LowConfidence => "low_confidence",
            WarningCode::MissingVendor => "missing_vendor",
            WarningCode::MissingDate => "missing_date",
            WarningCode::MissingTotal => "missing_total",
        }
    }
}

/// One validation finding with a display-ready message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub code: WarningCode,
    pub message: String,
}

impl ValidationWarning {
    fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

/// Ordered warnings for one receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// True only when no rule produced a warning.
    pub fn is_valid(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn has(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    /// Warning messages in order.
    pub fn messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.message.clone()).collect()
    }
}

/// Applies the domain rules to receipt fields.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    tax_tolerance: Decimal,
    review_threshold: f32,
    retention_years: u32,
}

impl FieldValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            tax_tolerance: config.tax_tolerance,
            review_threshold: config.review_confidence_threshold,
            retention_years: config.retention_years,
        }
    }

    /// Validate a stored receipt against today's date.
    pub fn validate_receipt(&self, receipt: &Receipt) -> ValidationReport {
        self.validate(&receipt.fields, &receipt.field_confidence)
    }

    /// Validate fields against today's date.
    pub fn validate(
        &self,
        fields: &ReceiptFields,
        confidence: &BTreeMap<FieldName, f32>,
    ) -> ValidationReport {
        self.validate_at(fields, confidence, Utc::now().date_naive())
    }

    /// Validate fields as of `today`.
    pub fn validate_at(
        &self,
        fields: &ReceiptFields,
        confidence: &BTreeMap<FieldName, f32>,
        today: NaiveDate,
    ) -> ValidationReport {
        let mut warnings = Vec::new();

        if let Some(tax_id) = &fields.tax_id {
            if !validate_tax_id(tax_id) {
                warnings.push(ValidationWarning::new(
                    WarningCode::InvalidTaxId,
                    format!("מספר העוסק {} אינו תקין (ספרת ביקורת שגויה)", tax_id),
                ));
            }
        }

        if let Some(date) = fields.document_date {
            if date > today {
                warnings.push(ValidationWarning::new(
                    WarningCode::DateInFuture,
                    format!("תאריך המסמך {} הוא תאריך עתידי", format_date(date)),
                ));
            }
            if let Some(oldest) = today.checked_sub_months(Months::new(12 * self.retention_years)) {
                if date < oldest {
                    warnings.push(ValidationWarning::new(
                        WarningCode::DateTooOld,
                        format!(
                            "תאריך המסמך {} ישן מ-{} שנים",
                            format_date(date),
                            self.retention_years
                        ),
                    ));
                }
            }
        }

        match (fields.total_amount, fields.tax_amount, fields.pre_tax_amount) {
            (Some(total), Some(tax), Some(pre_tax)) => {
                if !reconciles(pre_tax, tax, total, self.tax_tolerance) {
                    warnings.push(ValidationWarning::new(
                        WarningCode::TaxMismatch,
                        format!(
                            "סכום לפני מע\"מ ({}) ועוד מע\"מ ({}) אינו שווה לסכום הכולל ({}), הפרש {}",
                            format_shekels(pre_tax),
                            format_shekels(tax),
                            format_shekels(total),
                            format_shekels(discrepancy(pre_tax, tax, total))
                        ),
                    ));
                }
            }
            // Only one part of the breakdown: it cannot exceed the total
            (Some(total), tax, pre_tax) => {
                let part = tax
                    .map(|v| (FieldName::TaxAmount, v))
                    .or(pre_tax.map(|v| (FieldName::PreTaxAmount, v)));
                if let Some((field, value)) = part {
                    if value > total + self.tax_tolerance {
                        warnings.push(ValidationWarning::new(
                            WarningCode::TaxMismatch,
                            format!(
                                "{} ({}) גדול מהסכום הכולל ({})",
                                field.display_label(),
                                format_shekels(value),
                                format_shekels(total)
                            ),
                        ));
                    }
                }
            }
            _ => {}
        }

        let low: Vec<&str> = confidence
            .iter()
            .filter(|(field, score)| **score < self.review_threshold && fields.is_present(**field))
            .map(|(field, _)| field.display_label())
            .collect();
        if !low.is_empty() {
            warnings.push(ValidationWarning::new(
                WarningCode::LowConfidence,
                format!("יש לוודא את השדות הבאים: {}", low.join(", ")),
            ));
        }

        if fields.vendor_name.as_deref().is_none_or(|v| v.trim().is_empty()) {
            warnings.push(ValidationWarning::new(WarningCode::MissingVendor, "חסר שם העסק"));
        }

        if fields.document_date.is_none() {
            warnings.push(ValidationWarning::new(WarningCode::MissingDate, "חסר תאריך המסמך"));
        }

        match fields.total_amount {
            None => warnings.push(ValidationWarning::new(
                WarningCode::MissingTotal,
                "חסר סכום כולל",
            )),
            Some(total) if total <= Decimal::ZERO => warnings.push(ValidationWarning::new(
                WarningCode::MissingTotal,
                "הסכום הכולל חייב להיות גדול מאפס",
            )),
            Some(_) => {}
        }

        debug!("Validation produced {} warnings", warnings.len());
        ValidationReport { warnings }
    }
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn complete_fields() -> ReceiptFields {
        ReceiptFields {
            vendor_name: Some("קפה קפה".to_string()),
            tax_id: Some("123456782".to_string()),
            document_date: NaiveDate::from_ymd_opt(2024, 5, 20),
            total_amount: Some(dec("117.00")),
            tax_amount: Some(dec("17.00")),
            pre_tax_amount: Some(dec("100.00")),
            ..ReceiptFields::default()
        }
    }

    fn codes(report: &ValidationReport) -> Vec<WarningCode> {
        report.warnings.iter().map(|w| w.code).collect()
    }

    #[test]
    fn test_complete_receipt_is_valid() {
        let report =
            FieldValidator::default().validate_at(&complete_fields(), &BTreeMap::new(), today());
        assert!(report.is_valid(), "{:?}", report);
    }

    #[test]
    fn test_tolerance_accepts_small_difference() {
        let mut fields = complete_fields();
        fields.total_amount = Some(dec("117.02"));
        let report = FieldValidator::default().validate_at(&fields, &BTreeMap::new(), today());
        assert!(!report.has(WarningCode::TaxMismatch));
    }

    #[test]
    fn test_tax_mismatch() {
        let mut fields = complete_fields();
        fields.pre_tax_amount = Some(dec("100.00"));
        fields.tax_amount = Some(dec("20.00"));
        fields.total_amount = Some(dec("95.00"));
        let report = FieldValidator::default().validate_at(&fields, &BTreeMap::new(), today());

        assert_eq!(codes(&report), vec![WarningCode::TaxMismatch]);
        assert!(report.warnings[0].message.contains("₪25.00"));
    }

    #[test]
    fn test_partial_breakdown_larger_than_total() {
        let mut fields = complete_fields();
        fields.pre_tax_amount = None;
        fields.tax_amount = Some(dec("130.00"));
        let report = FieldValidator::default().validate_at(&fields, &BTreeMap::new(), today());
        assert_eq!(codes(&report), vec![WarningCode::TaxMismatch]);
        assert!(report.warnings[0].message.contains("₪130.00"));

        let mut fields = complete_fields();
        fields.tax_amount = None;
        fields.pre_tax_amount = Some(dec("120.00"));
        let report = FieldValidator::default().validate_at(&fields, &BTreeMap::new(), today());
        assert_eq!(codes(&report), vec![WarningCode::TaxMismatch]);
    }

    #[test]
    fn test_partial_breakdown_within_total() {
        let mut fields = complete_fields();
        fields.tax_amount = None;
        let report = FieldValidator::default().validate_at(&fields, &BTreeMap::new(), today());
        assert!(report.is_valid(), "{:?}", report);

        let mut fields = complete_fields();
        fields.pre_tax_amount = None;
        fields.tax_amount = None;
        let report = FieldValidator::default().validate_at(&fields, &BTreeMap::new(), today());
        assert!(!report.has(WarningCode::TaxMismatch));
    }

    #[test]
    fn test_invalid_checksum_warns() {
        let mut fields = complete_fields();
        fields.tax_id = Some("123456783".to_string());
        let report = FieldValidator::default().validate_at(&fields, &BTreeMap::new(), today());
        assert_eq!(codes(&report), vec![WarningCode::InvalidTaxId]);
    }

    #[test]
    fn test_date_bounds() {
        let validator = FieldValidator::default();

        let mut fields = complete_fields();
        fields.document_date = NaiveDate::from_ymd_opt(2024, 6, 2);
        let report = validator.validate_at(&fields, &BTreeMap::new(), today());
        assert_eq!(codes(&report), vec![WarningCode::DateInFuture]);

        fields.document_date = NaiveDate::from_ymd_opt(2017, 5, 31);
        let report = validator.validate_at(&fields, &BTreeMap::new(), today());
        assert_eq!(codes(&report), vec![WarningCode::DateTooOld]);

        // Exactly seven years back is still accepted
        fields.document_date = NaiveDate::from_ymd_opt(2017, 6, 1);
        let report = validator.validate_at(&fields, &BTreeMap::new(), today());
        assert!(report.is_valid());

        // Today is not in the future
        fields.document_date = Some(today());
        assert!(validator.validate_at(&fields, &BTreeMap::new(), today()).is_valid());
    }

    #[test]
    fn test_low_confidence_lists_fields_together() {
        let mut confidence = BTreeMap::new();
        confidence.insert(FieldName::VendorName, 0.5);
        confidence.insert(FieldName::DocumentDate, 0.75);
        confidence.insert(FieldName::TotalAmount, 0.95);

        let report =
            FieldValidator::default().validate_at(&complete_fields(), &confidence, today());

        assert_eq!(codes(&report), vec![WarningCode::LowConfidence]);
        let message = &report.warnings[0].message;
        assert!(message.contains(FieldName::VendorName.display_label()));
        assert!(message.contains(FieldName::DocumentDate.display_label()));
        assert!(!message.contains(FieldName::TotalAmount.display_label()));
    }

    #[test]
    fn test_missing_fields_each_warn() {
        let report =
            FieldValidator::default().validate_at(&ReceiptFields::default(), &BTreeMap::new(), today());
        assert_eq!(
            codes(&report),
            vec![
                WarningCode::MissingVendor,
                WarningCode::MissingDate,
                WarningCode::MissingTotal,
            ]
        );
    }

    #[test]
    fn test_non_positive_total() {
        let fields = ReceiptFields {
            vendor_name: Some("x".to_string()),
            document_date: Some(today()),
            total_amount: Some(Decimal::ZERO),
            ..ReceiptFields::default()
        };
        let report = FieldValidator::default().validate_at(&fields, &BTreeMap::new(), today());
        assert_eq!(codes(&report), vec![WarningCode::MissingTotal]);
    }

    #[test]
    fn test_all_rules_can_fire_together() {
        let fields = ReceiptFields {
            tax_id: Some("000000001".to_string()),
            document_date: NaiveDate::from_ymd_opt(2030, 1, 1),
            total_amount: Some(dec("-5.00")),
            tax_amount: Some(dec("1.00")),
            pre_tax_amount: Some(dec("1.00")),
            ..ReceiptFields::default()
        };
        let mut confidence = BTreeMap::new();
        confidence.insert(FieldName::TaxId, 0.5);

        let report = FieldValidator::default().validate_at(&fields, &confidence, today());
        assert_eq!(
            codes(&report),
            vec![
                WarningCode::InvalidTaxId,
                WarningCode::DateInFuture,
                WarningCode::TaxMismatch,
                WarningCode::LowConfidence,
                WarningCode::MissingVendor,
                WarningCode::MissingTotal,
            ]
        );
    }
}
