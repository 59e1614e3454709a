//! Receipt parser combining the per-field rule extractors.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::confidence::MatchKind;
use crate::models::config::ExtractionConfig;
use crate::models::receipt::{FieldName, ReceiptFields};

use super::rules::{
    DateExtractor, DocumentNumberExtractor, ExtractionMatch, FieldExtractor, TaxIdExtractor,
    TotalsExtractor, VendorExtractor,
};

/// Candidate values for every structured field of one receipt.
///
/// A field no rule matched stays `None`, which is distinct from an empty
/// value.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub vendor_name: Option<ExtractionMatch<String>>,
    pub tax_id: Option<ExtractionMatch<String>>,
    pub document_number: Option<ExtractionMatch<String>>,
    pub document_date: Option<ExtractionMatch<NaiveDate>>,
    pub total_amount: Option<ExtractionMatch<Decimal>>,
    pub tax_amount: Option<ExtractionMatch<Decimal>>,
    pub pre_tax_amount: Option<ExtractionMatch<Decimal>>,
    /// Characters of text that were examined.
    pub text_length: usize,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

impl Extraction {
    /// The extracted values as receipt fields.
    pub fn fields(&self) -> ReceiptFields {
        ReceiptFields {
            vendor_name: self.vendor_name.as_ref().map(|m| m.value.clone()),
            tax_id: self.tax_id.as_ref().map(|m| m.value.clone()),
            document_number: self.document_number.as_ref().map(|m| m.value.clone()),
            document_date: self.document_date.as_ref().map(|m| m.value),
            total_amount: self.total_amount.as_ref().map(|m| m.value),
            tax_amount: self.tax_amount.as_ref().map(|m| m.value),
            pre_tax_amount: self.pre_tax_amount.as_ref().map(|m| m.value),
            ..ReceiptFields::default()
        }
    }

    /// How each populated field was matched.
    pub fn kinds(&self) -> BTreeMap<FieldName, MatchKind> {
        let mut kinds = BTreeMap::new();
        let mut put = |field, kind: Option<MatchKind>| {
            if let Some(kind) = kind {
                kinds.insert(field, kind);
            }
        };

        put(FieldName::VendorName, self.vendor_name.as_ref().map(|m| m.kind));
        put(FieldName::TaxId, self.tax_id.as_ref().map(|m| m.kind));
        put(FieldName::DocumentNumber, self.document_number.as_ref().map(|m| m.kind));
        put(FieldName::DocumentDate, self.document_date.as_ref().map(|m| m.kind));
        put(FieldName::TotalAmount, self.total_amount.as_ref().map(|m| m.kind));
        put(FieldName::TaxAmount, self.tax_amount.as_ref().map(|m| m.kind));
        put(FieldName::PreTaxAmount, self.pre_tax_amount.as_ref().map(|m| m.kind));

        kinds
    }

    /// Number of populated fields.
    pub fn populated(&self) -> usize {
        self.kinds().len()
    }

    /// Diagnostic payload stored next to the receipt.
    pub fn to_payload(&self) -> Value {
        let mut fields = serde_json::Map::new();

        insert_match(&mut fields, FieldName::VendorName, &self.vendor_name);
        insert_match(&mut fields, FieldName::TaxId, &self.tax_id);
        insert_match(&mut fields, FieldName::DocumentNumber, &self.document_number);
        insert_match(&mut fields, FieldName::DocumentDate, &self.document_date);
        insert_match(&mut fields, FieldName::TotalAmount, &self.total_amount);
        insert_match(&mut fields, FieldName::TaxAmount, &self.tax_amount);
        insert_match(&mut fields, FieldName::PreTaxAmount, &self.pre_tax_amount);

        json!({
            "fields": fields,
            "text_length": self.text_length,
            "processing_time_ms": self.processing_time_ms,
        })
    }
}

fn insert_match<T: Display>(
    out: &mut serde_json::Map<String, Value>,
    field: FieldName,
    m: &Option<ExtractionMatch<T>>,
) {
    if let Some(m) = m {
        out.insert(
            field.as_str().to_string(),
            json!({
                "value": m.value.to_string(),
                "kind": m.kind.as_str(),
                "rule": m.rule,
                "source": m.source,
            }),
        );
    }
}

/// Rule-based receipt parser.
pub struct ReceiptParser {
    tax_rate: Decimal,
    max_text_length: usize,
    vendor: VendorExtractor,
    tax_id: TaxIdExtractor,
    document_number: DocumentNumberExtractor,
    date: DateExtractor,
    totals: TotalsExtractor,
}

impl ReceiptParser {
    /// Create a parser with the given extraction settings.
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            tax_rate: config.tax_rate,
            max_text_length: config.max_text_length,
            vendor: VendorExtractor::new(),
            tax_id: TaxIdExtractor::new(),
            document_number: DocumentNumberExtractor::new(),
            date: DateExtractor::new(),
            totals: TotalsExtractor::new(),
        }
    }

    /// Set the tax rate used to split a bare total.
    pub fn with_tax_rate(mut self, tax_rate: Decimal) -> Self {
        self.tax_rate = tax_rate;
        self
    }

    /// Extract every field from recognized text. Never fails; fields that
    /// cannot be found are left empty.
    pub fn parse(&self, text: &str) -> Extraction {
        let start = Instant::now();
        let text = self.prepare(text);

        info!("Parsing receipt from {} characters of text", text.chars().count());

        let totals = self.totals.extract(&text, self.tax_rate);

        let mut extraction = Extraction {
            vendor_name: self.vendor.extract(&text),
            tax_id: self.tax_id.extract(&text),
            document_number: self.document_number.extract(&text),
            document_date: self.date.extract(&text),
            total_amount: totals.total,
            tax_amount: totals.tax,
            pre_tax_amount: totals.pre_tax,
            text_length: text.chars().count(),
            processing_time_ms: 0,
        };

        for (field, kind) in extraction.kinds() {
            debug!("{}: matched as {}", field, kind);
        }

        extraction.processing_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Extracted {} of {} fields in {} ms",
            extraction.populated(),
            FieldName::EXTRACTED.len(),
            extraction.processing_time_ms
        );

        extraction
    }

    fn prepare(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        match text.char_indices().nth(self.max_text_length) {
            Some((cut, _)) => text[..cut].to_string(),
            None => text,
        }
    }
}

impl Default for ReceiptParser {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

/// Extract receipt fields from text with default settings.
pub fn extract_fields(text: &str) -> ReceiptFields {
    ReceiptParser::default().parse(text).fields()
}
