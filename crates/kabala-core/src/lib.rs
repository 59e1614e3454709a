//! Core library for receipt ingestion.
//!
//! This crate provides:
//! - Field extraction from recognized receipt text (vendor, tax id, document
//!   number, date, total/tax/pre-tax amounts)
//! - Per-field confidence scoring and soft validation
//! - Duplicate detection and ranked search
//! - The receipt lifecycle with a field-level audit trail
//! - SQLite persistence and an async ingestion service around an OCR engine

pub mod confidence;
pub mod duplicate;
pub mod error;
pub mod extract;
pub mod format;
pub mod lifecycle;
pub mod models;
pub mod normalize;
pub mod ocr;
pub mod search;
pub mod service;
pub mod store;
pub mod validation;

pub use confidence::{ConfidenceScorer, MatchKind};
pub use duplicate::{DuplicateCandidate, DuplicateDetector, DuplicateVerdict};
pub use error::{KabalaError, OcrError, Result, StoreError};
pub use extract::{Extraction, ReceiptParser, extract_fields};
pub use lifecycle::{Patch, ReceiptUpdate};
pub use models::{
    Artifact, Category, CategoryCatalog, EditEntry, FieldName, KabalaConfig, Receipt,
    ReceiptFields, ReceiptStatus,
};
pub use ocr::{OcrEngine, OcrOutput, TextDumpOcr};
pub use search::{SearchHit, SearchRanker};
pub use service::{IngestHandle, ReceiptService, Reviewed};
pub use store::{ReceiptStore, SqliteStore};
pub use validation::{FieldValidator, ValidationReport, ValidationWarning, WarningCode};
