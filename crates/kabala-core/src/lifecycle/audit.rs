//! Partial updates and the field-level audit trail.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{KabalaError, Result};
use crate::format::{EMPTY_MARKER, format_date, or_empty};
use crate::extract::rules::format_currency;
use crate::models::receipt::{
    CategoryCatalog, EditEntry, FieldName, ReceiptFields, ReceiptStatus,
};
use crate::normalize::digits_only;

/// Change to one optional field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum Patch<T> {
    /// Leave the stored value alone.
    Keep,
    /// Remove the stored value.
    Clear,
    /// Replace the stored value.
    Set(T),
}

impl<T: Clone + PartialEq> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// The value after applying the patch to `current`.
    pub fn resolve(&self, current: &Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current.clone(),
            Patch::Clear => None,
            Patch::Set(v) => Some(v.clone()),
        }
    }

    fn set_value(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }
}

/// A partial update of receipt fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptUpdate {
    pub vendor_name: Patch<String>,
    pub tax_id: Patch<String>,
    pub document_number: Patch<String>,
    pub document_date: Patch<NaiveDate>,
    pub total_amount: Patch<Decimal>,
    pub tax_amount: Patch<Decimal>,
    pub pre_tax_amount: Patch<Decimal>,
    pub category_id: Patch<i64>,
    pub notes: Patch<String>,
}

impl ReceiptUpdate {
    pub fn is_empty(&self) -> bool {
        self.vendor_name.is_keep()
            && self.tax_id.is_keep()
            && self.document_number.is_keep()
            && self.document_date.is_keep()
            && self.total_amount.is_keep()
            && self.tax_amount.is_keep()
            && self.pre_tax_amount.is_keep()
            && self.category_id.is_keep()
            && self.notes.is_keep()
    }

    /// Reject malformed values and canonicalize the rest.
    ///
    /// Text is trimmed and an empty string clears the field. Tax ids lose
    /// their separators and must then be exactly nine digits.
    pub fn checked(mut self, catalog: &CategoryCatalog) -> Result<Self> {
        self.vendor_name = clean_text(self.vendor_name);
        self.document_number = clean_text(self.document_number);
        self.notes = clean_text(self.notes);
        self.tax_id = clean_text(self.tax_id);

        if let Patch::Set(tax_id) = &self.tax_id {
            let digits = digits_only(tax_id);
            let only_separators = tax_id
                .chars()
                .all(|c| c.is_ascii_digit() || c == '-' || c == ' ');
            if digits.len() != 9 || !only_separators {
                return Err(KabalaError::malformed(
                    FieldName::TaxId.as_str(),
                    "must contain exactly 9 digits",
                ));
            }
            self.tax_id = Patch::Set(digits);
        }

        if let Some(total) = self.total_amount.set_value() {
            if *total <= Decimal::ZERO {
                return Err(KabalaError::malformed(
                    FieldName::TotalAmount.as_str(),
                    "must be greater than zero",
                ));
            }
        }

        for (field, patch) in [
            (FieldName::TaxAmount, &self.tax_amount),
            (FieldName::PreTaxAmount, &self.pre_tax_amount),
        ] {
            if patch.set_value().is_some_and(|v| *v < Decimal::ZERO) {
                return Err(KabalaError::malformed(field.as_str(), "must not be negative"));
            }
        }

        if let Patch::Set(id) = self.category_id {
            if !catalog.contains(id) {
                return Err(KabalaError::UnknownCategory(id));
            }
        }

        Ok(self)
    }
}

fn clean_text(patch: Patch<String>) -> Patch<String> {
    match patch {
        Patch::Set(s) if s.trim().is_empty() => Patch::Clear,
        Patch::Set(s) => Patch::Set(s.trim().to_string()),
        other => other,
    }
}

/// Formats stored values for the audit trail.
#[derive(Debug, Clone)]
pub struct AuditFormatter<'a> {
    currency: &'a str,
    catalog: &'a CategoryCatalog,
}

impl<'a> AuditFormatter<'a> {
    pub fn new(currency: &'a str, catalog: &'a CategoryCatalog) -> Self {
        Self { currency, catalog }
    }

    /// Display form of one field.
    pub fn field_value(&self, fields: &ReceiptFields, field: FieldName) -> String {
        let text = |v: &Option<String>| or_empty(v.as_deref(), str::to_string);
        let amount = |v: Option<Decimal>| or_empty(v, |a| format_currency(a, self.currency));

        match field {
            FieldName::VendorName => text(&fields.vendor_name),
            FieldName::TaxId => text(&fields.tax_id),
            FieldName::DocumentNumber => text(&fields.document_number),
            FieldName::DocumentDate => or_empty(fields.document_date, format_date),
            FieldName::TotalAmount => amount(fields.total_amount),
            FieldName::TaxAmount => amount(fields.tax_amount),
            FieldName::PreTaxAmount => amount(fields.pre_tax_amount),
            FieldName::Category => or_empty(fields.category_id, |id| self.category(id)),
            FieldName::Notes => text(&fields.notes),
            FieldName::Status => EMPTY_MARKER.to_string(),
        }
    }

    fn category(&self, id: i64) -> String {
        self.catalog
            .get(id)
            .map(|c| c.display_name.clone())
            .unwrap_or_else(|| format!("#{}", id))
    }
}

/// Apply `update` to `fields` and return one entry per field whose value
/// actually changed.
pub fn apply_update(
    fields: &mut ReceiptFields,
    update: &ReceiptUpdate,
    formatter: &AuditFormatter<'_>,
    receipt_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Vec<EditEntry> {
    let before = fields.clone();

    fields.vendor_name = update.vendor_name.resolve(&before.vendor_name);
    fields.tax_id = update.tax_id.resolve(&before.tax_id);
    fields.document_number = update.document_number.resolve(&before.document_number);
    fields.document_date = update.document_date.resolve(&before.document_date);
    fields.total_amount = update.total_amount.resolve(&before.total_amount);
    fields.tax_amount = update.tax_amount.resolve(&before.tax_amount);
    fields.pre_tax_amount = update.pre_tax_amount.resolve(&before.pre_tax_amount);
    fields.category_id = update.category_id.resolve(&before.category_id);
    fields.notes = update.notes.resolve(&before.notes);

    let changed = [
        (FieldName::VendorName, before.vendor_name != fields.vendor_name),
        (FieldName::TaxId, before.tax_id != fields.tax_id),
        (FieldName::DocumentNumber, before.document_number != fields.document_number),
        (FieldName::DocumentDate, before.document_date != fields.document_date),
        (FieldName::TotalAmount, before.total_amount != fields.total_amount),
        (FieldName::TaxAmount, before.tax_amount != fields.tax_amount),
        (FieldName::PreTaxAmount, before.pre_tax_amount != fields.pre_tax_amount),
        (FieldName::Category, before.category_id != fields.category_id),
        (FieldName::Notes, before.notes != fields.notes),
    ];

    changed
        .into_iter()
        .filter(|(_, changed)| *changed)
        .map(|(field, _)| EditEntry {
            receipt_id: receipt_id.to_string(),
            user_id: user_id.to_string(),
            field,
            old_value: formatter.field_value(&before, field),
            new_value: formatter.field_value(fields, field),
            edited_at: now,
        })
        .collect()
}

/// Audit entry for a status change.
pub fn status_entry(
    receipt_id: &str,
    user_id: &str,
    from: ReceiptStatus,
    to: ReceiptStatus,
    now: DateTime<Utc>,
) -> EditEntry {
    EditEntry {
        receipt_id: receipt_id.to_string(),
        user_id: user_id.to_string(),
        field: FieldName::Status,
        old_value: from.display_label().to_string(),
        new_value: to.display_label().to_string(),
        edited_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::receipt::Category;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn catalog() -> CategoryCatalog {
        CategoryCatalog::new(vec![Category {
            id: 3,
            display_name: "ציוד משרדי".to_string(),
        }])
    }

    fn apply(fields: &mut ReceiptFields, update: &ReceiptUpdate) -> Vec<EditEntry> {
        let catalog = catalog();
        let formatter = AuditFormatter::new("₪", &catalog);
        apply_update(fields, update, &formatter, "r1", "u1", Utc::now())
    }

    #[test]
    fn test_two_changes_two_entries() {
        let mut fields = ReceiptFields {
            total_amount: Some(dec("117.00")),
            ..ReceiptFields::default()
        };
        let update = ReceiptUpdate {
            vendor_name: Patch::Set("Cafe Cafe".to_string()),
            total_amount: Patch::Set(dec("1234.5")),
            ..ReceiptUpdate::default()
        };

        let entries = apply(&mut fields, &update);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].field, FieldName::VendorName);
        assert_eq!(entries[0].old_value, EMPTY_MARKER);
        assert_eq!(entries[0].new_value, "Cafe Cafe");
        assert_eq!(entries[1].field, FieldName::TotalAmount);
        assert_eq!(entries[1].old_value, "₪117.00");
        assert_eq!(entries[1].new_value, "₪1,234.50");
        assert_eq!(fields.vendor_name.as_deref(), Some("Cafe Cafe"));
    }

    #[test]
    fn test_noop_update_has_no_entries() {
        let mut fields = ReceiptFields {
            vendor_name: Some("Cafe Cafe".to_string()),
            total_amount: Some(dec("117.00")),
            ..ReceiptFields::default()
        };
        let update = ReceiptUpdate {
            vendor_name: Patch::Set("Cafe Cafe".to_string()),
            total_amount: Patch::Set(dec("117")),
            ..ReceiptUpdate::default()
        };

        assert!(apply(&mut fields, &update).is_empty());
    }

    #[test]
    fn test_dates_and_categories_are_formatted() {
        let mut fields = ReceiptFields::default();
        let update = ReceiptUpdate {
            document_date: Patch::Set(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
            category_id: Patch::Set(3),
            ..ReceiptUpdate::default()
        };

        let entries = apply(&mut fields, &update);
        assert_eq!(entries[0].new_value, "05/03/2024");
        assert_eq!(entries[1].new_value, "ציוד משרדי");
    }

    #[test]
    fn test_clear_records_empty_marker() {
        let mut fields = ReceiptFields {
            notes: Some("old".to_string()),
            ..ReceiptFields::default()
        };
        let update = ReceiptUpdate {
            notes: Patch::Clear,
            ..ReceiptUpdate::default()
        };

        let entries = apply(&mut fields, &update);
        assert_eq!(entries[0].old_value, "old");
        assert_eq!(entries[0].new_value, EMPTY_MARKER);
        assert_eq!(fields.notes, None);
    }

    #[test]
    fn test_status_entry_uses_labels() {
        let entry = status_entry(
            "r1",
            "u1",
            ReceiptStatus::Review,
            ReceiptStatus::Approved,
            Utc::now(),
        );
        assert_eq!(entry.field, FieldName::Status);
        assert_eq!(entry.old_value, "ממתין לבדיקה");
        assert_eq!(entry.new_value, "אושר");
    }

    #[test]
    fn test_checked_rejects_malformed() {
        let catalog = catalog();

        let negative_tax = ReceiptUpdate {
            tax_amount: Patch::Set(dec("-1")),
            ..ReceiptUpdate::default()
        };
        let err = negative_tax.checked(&catalog).unwrap_err();
        assert_eq!(err.code(), "malformed_input");

        let zero_total = ReceiptUpdate {
            total_amount: Patch::Set(Decimal::ZERO),
            ..ReceiptUpdate::default()
        };
        assert!(zero_total.checked(&catalog).is_err());

        let short_id = ReceiptUpdate {
            tax_id: Patch::Set("12345".to_string()),
            ..ReceiptUpdate::default()
        };
        assert!(short_id.checked(&catalog).is_err());

        let unknown = ReceiptUpdate {
            category_id: Patch::Set(99),
            ..ReceiptUpdate::default()
        };
        assert!(matches!(
            unknown.checked(&catalog),
            Err(KabalaError::UnknownCategory(99))
        ));
    }

    #[test]
    fn test_checked_canonicalizes() {
        let update = ReceiptUpdate {
            vendor_name: Patch::Set("  ".to_string()),
            tax_id: Patch::Set("12-345678-2".to_string()),
            notes: Patch::Set(" note ".to_string()),
            ..ReceiptUpdate::default()
        }
        .checked(&catalog())
        .unwrap();

        assert_eq!(update.vendor_name, Patch::Clear);
        assert_eq!(update.tax_id, Patch::Set("123456782".to_string()));
        assert_eq!(update.notes, Patch::Set("note".to_string()));
    }

    #[test]
    fn test_patch_deserializes() {
        let update: ReceiptUpdate = serde_json::from_str(
            r#"{"vendor_name": {"op": "set", "value": "Cafe"}, "notes": {"op": "clear"}}"#,
        )
        .unwrap();
        assert_eq!(update.vendor_name, Patch::Set("Cafe".to_string()));
        assert_eq!(update.notes, Patch::Clear);
        assert!(update.tax_id.is_keep());
    }
}
