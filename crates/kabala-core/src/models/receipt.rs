//! Receipt data models.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A stored receipt and everything the pipeline learned about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// Opaque receipt id.
    pub id: String,

    /// Owning user. Never changes after creation.
    pub owner_id: String,

    /// Source image or document.
    pub artifact: Artifact,

    /// Extracted and user-edited fields.
    pub fields: ReceiptFields,

    /// Per-field confidence (0.0 - 1.0).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_confidence: BTreeMap<FieldName, f32>,

    /// Raw extraction payload, kept for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_extraction: Option<serde_json::Value>,

    /// Processing status.
    pub status: ReceiptStatus,

    /// Last OCR failure message, shown next to a `failed` receipt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,

    /// Whether the receipt was classified as a duplicate.
    pub is_duplicate: bool,

    /// Receipt this one duplicates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Receipt {
    /// Create a fresh receipt in `processing` for the given artifact.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, artifact: Artifact) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            artifact,
            fields: ReceiptFields::default(),
            field_confidence: BTreeMap::new(),
            raw_extraction: None,
            status: ReceiptStatus::Processing,
            processing_error: None,
            is_duplicate: false,
            duplicate_of: None,
            created_at: now,
            updated_at: now,
            processing_started_at: Some(now),
            processing_completed_at: None,
            approved_at: None,
        }
    }

    /// Mean of the populated per-field confidences.
    ///
    /// `None` when no field carries a confidence.
    pub fn overall_confidence(&self) -> Option<f32> {
        crate::confidence::overall_confidence(&self.field_confidence)
    }
}

/// Reference to the stored source artifact. Not interpreted by this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Opaque storage handle or URL.
    pub reference: String,

    /// Original file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Artifact {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            ..Self::default()
        }
    }
}

/// Structured receipt fields. Everything is optional until populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,

    /// Nine digit business registration number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_date: Option<NaiveDate>,

    /// Total amount including tax.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_tax_amount: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ReceiptFields {
    /// Whether the given field currently holds a value.
    pub fn is_present(&self, field: FieldName) -> bool {
        match field {
            FieldName::VendorName => self.vendor_name.is_some(),
            FieldName::TaxId => self.tax_id.is_some(),
            FieldName::DocumentNumber => self.document_number.is_some(),
            FieldName::DocumentDate => self.document_date.is_some(),
            FieldName::TotalAmount => self.total_amount.is_some(),
            FieldName::TaxAmount => self.tax_amount.is_some(),
            FieldName::PreTaxAmount => self.pre_tax_amount.is_some(),
            FieldName::Category => self.category_id.is_some(),
            FieldName::Notes => self.notes.is_some(),
            FieldName::Status => true,
        }
    }
}

/// Names of auditable receipt fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    VendorName,
    TaxId,
    DocumentNumber,
    DocumentDate,
    TotalAmount,
    TaxAmount,
    PreTaxAmount,
    Category,
    Notes,
    Status,
}

impl FieldName {
    /// Fields the extractor can populate.
    pub const EXTRACTED: [FieldName; 7] = [
        FieldName::VendorName,
        FieldName::TaxId,
        FieldName::DocumentNumber,
        FieldName::DocumentDate,
        FieldName::TotalAmount,
        FieldName::TaxAmount,
        FieldName::PreTaxAmount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::VendorName => "vendor_name",
            FieldName::TaxId => "tax_id",
            FieldName::DocumentNumber => "document_number",
            FieldName::DocumentDate => "document_date",
            FieldName::TotalAmount => "total_amount",
            FieldName::TaxAmount => "tax_amount",
            FieldName::PreTaxAmount => "pre_tax_amount",
            FieldName::Category => "category",
            FieldName::Notes => "notes",
            FieldName::Status => "status",
        }
    }

    /// Parse from the snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "vendor_name" => Some(FieldName::VendorName),
            "tax_id" => Some(FieldName::TaxId),
            "document_number" => Some(FieldName::DocumentNumber),
            "document_date" => Some(FieldName::DocumentDate),
            "total_amount" => Some(FieldName::TotalAmount),
            "tax_amount" => Some(FieldName::TaxAmount),
            "pre_tax_amount" => Some(FieldName::PreTaxAmount),
            "category" => Some(FieldName::Category),
            "notes" => Some(FieldName::Notes),
            "status" => Some(FieldName::Status),
            _ => None,
        }
    }

    /// Hebrew label for user-facing messages.
    pub fn display_label(&self) -> &'static str {
        match self {
            FieldName::VendorName => "שם העסק",
            FieldName::TaxId => "מספר עוסק",
            FieldName::DocumentNumber => "מספר מסמך",
            FieldName::DocumentDate => "תאריך",
            FieldName::TotalAmount => "סכום כולל",
            FieldName::TaxAmount => "מע\"מ",
            FieldName::PreTaxAmount => "סכום לפני מע\"מ",
            FieldName::Category => "קטגוריה",
            FieldName::Notes => "הערות",
            FieldName::Status => "סטטוס",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// Extraction is running.
    Processing,
    /// Extraction finished, waiting for the user.
    Review,
    /// Confirmed by the user. Locked.
    Approved,
    /// OCR failed; can be retried.
    Failed,
    /// Classified as a duplicate of another receipt.
    Duplicate,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Processing => "processing",
            ReceiptStatus::Review => "review",
            ReceiptStatus::Approved => "approved",
            ReceiptStatus::Failed => "failed",
            ReceiptStatus::Duplicate => "duplicate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "processing" => Some(ReceiptStatus::Processing),
            "review" => Some(ReceiptStatus::Review),
            "approved" => Some(ReceiptStatus::Approved),
            "failed" => Some(ReceiptStatus::Failed),
            "duplicate" => Some(ReceiptStatus::Duplicate),
            _ => None,
        }
    }

    /// Hebrew display label.
    pub fn display_label(&self) -> &'static str {
        match self {
            ReceiptStatus::Processing => "בעיבוד",
            ReceiptStatus::Review => "ממתין לבדיקה",
            ReceiptStatus::Approved => "אושר",
            ReceiptStatus::Failed => "נכשל",
            ReceiptStatus::Duplicate => "כפילות",
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row per changed field.
///
/// Values are formatted for display before they are stored, so history does
/// not shift when display conventions change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEntry {
    pub receipt_id: String,
    /// User who made the change.
    pub user_id: String,
    pub field: FieldName,
    pub old_value: String,
    pub new_value: String,
    pub edited_at: DateTime<Utc>,
}

/// Externally managed classification entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub display_name: String,
}

/// The closed category list.
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
}

impl CategoryCatalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn get(&self, id: i64) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }
}
