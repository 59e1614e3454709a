//! Rendering of receipts, history and search results.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use console::style;
use kabala_core::format::{format_bool, or_empty};
use kabala_core::lifecycle::AuditFormatter;
use kabala_core::{
    CategoryCatalog, EditEntry, FieldName, Receipt, ReceiptFields, ValidationReport,
};

use super::OutputFormat;

const CSV_FIELDS: [FieldName; 9] = [
    FieldName::VendorName,
    FieldName::TaxId,
    FieldName::DocumentNumber,
    FieldName::DocumentDate,
    FieldName::TotalAmount,
    FieldName::TaxAmount,
    FieldName::PreTaxAmount,
    FieldName::Category,
    FieldName::Notes,
];

/// Renders values for display with the configured currency and categories.
pub struct Renderer<'a> {
    formatter: AuditFormatter<'a>,
}

impl<'a> Renderer<'a> {
    pub fn new(currency: &'a str, catalog: &'a CategoryCatalog) -> Self {
        Self {
            formatter: AuditFormatter::new(currency, catalog),
        }
    }

    pub fn receipts(&self, receipts: &[Receipt], format: OutputFormat) -> anyhow::Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(receipts)?),
            OutputFormat::Csv => self.csv(receipts),
            OutputFormat::Text => Ok(receipts
                .iter()
                .map(|r| self.summary_line(r))
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Full view of one receipt.
    pub fn receipt(&self, receipt: &Receipt, report: &ValidationReport) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "{} {}", style("Receipt").bold(), receipt.id);
        let _ = writeln!(
            out,
            "  {:<16} {} ({})",
            "status",
            receipt.status.display_label(),
            receipt.status
        );
        out.push_str(&self.fields(&receipt.fields, &receipt.field_confidence));
        let _ = writeln!(
            out,
            "  {:<16} {}",
            "duplicate",
            format_bool(receipt.is_duplicate)
        );
        if let Some(original) = &receipt.duplicate_of {
            let _ = writeln!(out, "  {:<16} {}", "duplicate_of", original);
        }
        let _ = writeln!(
            out,
            "  {:<16} {}",
            "confidence",
            or_empty(receipt.overall_confidence(), |c| format!("{:.0}%", c * 100.0))
        );
        if let Some(error) = &receipt.processing_error {
            let _ = writeln!(out, "  {:<16} {}", "error", style(error).red());
        }

        if !report.is_valid() {
            let _ = writeln!(out, "{}", style("Warnings:").yellow());
            for message in report.messages() {
                let _ = writeln!(out, "  - {}", message);
            }
        }

        out
    }

    /// One line per field with its confidence.
    pub fn fields(&self, fields: &ReceiptFields, confidence: &BTreeMap<FieldName, f32>) -> String {
        let mut out = String::new();
        for field in CSV_FIELDS {
            let value = self.formatter.field_value(fields, field);
            match confidence.get(&field) {
                Some(score) => {
                    let _ = writeln!(out, "  {:<16} {} [{:.2}]", field.as_str(), value, score);
                }
                None => {
                    let _ = writeln!(out, "  {:<16} {}", field.as_str(), value);
                }
            }
        }
        out
    }

    pub fn summary_line(&self, receipt: &Receipt) -> String {
        format!(
            "{}  {:<14} {:<30} {:>12}  {}",
            receipt.id,
            receipt.status.as_str(),
            self.formatter.field_value(&receipt.fields, FieldName::VendorName),
            self.formatter.field_value(&receipt.fields, FieldName::TotalAmount),
            self.formatter.field_value(&receipt.fields, FieldName::DocumentDate),
        )
    }

    pub fn history(&self, entries: &[EditEntry]) -> String {
        let mut out = String::new();
        for entry in entries {
            let _ = writeln!(
                out,
                "{}  {:<10} {:<16} {} -> {}",
                entry.edited_at.format("%Y-%m-%d %H:%M:%S"),
                entry.user_id,
                entry.field.as_str(),
                entry.old_value,
                entry.new_value
            );
        }
        out
    }

    fn csv(&self, receipts: &[Receipt]) -> anyhow::Result<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);

        let mut header = vec!["id", "status"];
        header.extend(CSV_FIELDS.iter().map(|f| f.as_str()));
        header.push("overall_confidence");
        wtr.write_record(&header)?;

        for receipt in receipts {
            let mut record = vec![receipt.id.clone(), receipt.status.to_string()];
            record.extend(CSV_FIELDS.iter().map(|f| csv_value(&receipt.fields, *f)));
            record.push(
                receipt
                    .overall_confidence()
                    .map(|c| format!("{:.2}", c))
                    .unwrap_or_default(),
            );
            wtr.write_record(&record)?;
        }

        Ok(String::from_utf8(wtr.into_inner()?)?)
    }
}

/// Machine-readable value for CSV output.
pub fn csv_value(fields: &ReceiptFields, field: FieldName) -> String {
    match field {
        FieldName::VendorName => fields.vendor_name.clone().unwrap_or_default(),
        FieldName::TaxId => fields.tax_id.clone().unwrap_or_default(),
        FieldName::DocumentNumber => fields.document_number.clone().unwrap_or_default(),
        FieldName::DocumentDate => fields
            .document_date
            .map(|d| d.to_string())
            .unwrap_or_default(),
        FieldName::TotalAmount => fields.total_amount.map(|a| a.to_string()).unwrap_or_default(),
        FieldName::TaxAmount => fields.tax_amount.map(|a| a.to_string()).unwrap_or_default(),
        FieldName::PreTaxAmount => fields
            .pre_tax_amount
            .map(|a| a.to_string())
            .unwrap_or_default(),
        FieldName::Category => fields.category_id.map(|c| c.to_string()).unwrap_or_default(),
        FieldName::Notes => fields.notes.clone().unwrap_or_default(),
        FieldName::Status => String::new(),
    }
}
