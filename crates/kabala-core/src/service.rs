//! Receipt ingestion service.
//!
//! Ties the store, the OCR engine and the extraction rules together and
//! enforces the lifecycle. Ingestion returns at once with a `processing`
//! receipt; OCR, extraction, scoring, validation and the duplicate check run
//! in a background task that writes the receipt exactly once when done.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::confidence::ConfidenceScorer;
use crate::duplicate::{DuplicateCandidate, DuplicateDetector, DuplicateVerdict};
use crate::error::{KabalaError, Result};
use crate::extract::ReceiptParser;
use crate::lifecycle::{
    AuditFormatter, ReceiptUpdate, apply_update, check_editable, check_transition,
    missing_required, status_entry,
};
use crate::models::config::KabalaConfig;
use crate::models::receipt::{
    Artifact, CategoryCatalog, EditEntry, Receipt, ReceiptStatus,
};
use crate::ocr::{OcrEngine, recognize_with_retry};
use crate::search::{SearchHit, SearchRanker};
use crate::store::ReceiptStore;
use crate::validation::{FieldValidator, ValidationReport};

/// Confidence of a value typed in by the user.
const USER_CONFIDENCE: f32 = 1.0;

/// Acknowledgement of an ingestion or retry.
///
/// The background task keeps running when the handle is dropped.
#[derive(Debug)]
pub struct IngestHandle {
    pub receipt_id: String,
    pub status: ReceiptStatus,
    task: JoinHandle<Result<Receipt>>,
}

impl IngestHandle {
    /// Wait for the pipeline to finish and return the stored receipt.
    pub async fn wait(self) -> Result<Receipt> {
        self.task
            .await
            .map_err(|e| KabalaError::Task(e.to_string()))?
    }
}

/// A saved receipt together with its soft validation findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reviewed {
    pub receipt: Receipt,
    pub report: ValidationReport,
}

/// Receipt operations for one store and one OCR engine.
///
/// Every operation takes the acting user's id; receipts of other users are
/// reported as not found.
#[derive(Clone)]
pub struct ReceiptService {
    store: Arc<dyn ReceiptStore>,
    ocr: Arc<dyn OcrEngine>,
    config: Arc<KabalaConfig>,
    catalog: Arc<CategoryCatalog>,
}

impl ReceiptService {
    pub fn new(store: Arc<dyn ReceiptStore>, ocr: Arc<dyn OcrEngine>, config: KabalaConfig) -> Self {
        let catalog = config.category_catalog();
        Self {
            store,
            ocr,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
        }
    }

    pub fn config(&self) -> &KabalaConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// Register an artifact and start extraction in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(&self, owner_id: &str, artifact: Artifact) -> Result<IngestHandle> {
        if artifact.reference.trim().is_empty() {
            return Err(KabalaError::malformed("artifact", "reference must not be empty"));
        }

        let receipt = Receipt::new(Uuid::new_v4().to_string(), owner_id, artifact);
        self.store.insert(&receipt)?;
        info!(
            "Created receipt {} for {}",
            receipt.id, receipt.artifact.reference
        );

        Ok(self.spawn_pipeline(receipt))
    }

    /// Fetch one receipt.
    pub fn get(&self, owner_id: &str, id: &str) -> Result<Receipt> {
        self.store
            .get(owner_id, id)?
            .ok_or_else(|| KabalaError::NotFound(id.to_string()))
    }

    /// All receipts of a user, oldest first.
    pub fn list(&self, owner_id: &str) -> Result<Vec<Receipt>> {
        Ok(self.store.list(owner_id)?)
    }

    /// Soft validation of a stored receipt.
    pub fn validate(&self, receipt: &Receipt) -> ValidationReport {
        FieldValidator::new(&self.config.validation).validate_receipt(receipt)
    }

    /// Apply user edits to a receipt in `review` or `duplicate`.
    ///
    /// Changed fields and their audit entries are written together. Edited
    /// fields get full confidence; cleared fields lose theirs.
    pub fn update(&self, owner_id: &str, id: &str, update: ReceiptUpdate) -> Result<Reviewed> {
        let mut receipt = self.get(owner_id, id)?;
        check_editable(receipt.status)?;
        let update = update.checked(&self.catalog)?;

        let edits = self.apply(&mut receipt, &update, owner_id);
        if !edits.is_empty() {
            self.persist(&receipt, receipt.status, &edits)?;
            info!("Updated {} field(s) of receipt {}", edits.len(), id);
        }

        let report = self.validate(&receipt);
        Ok(Reviewed { receipt, report })
    }

    /// Apply final edits and approve a receipt in `review`.
    ///
    /// Fails without writing anything when a required field is missing.
    pub fn approve(&self, owner_id: &str, id: &str, update: ReceiptUpdate) -> Result<Receipt> {
        let mut receipt = self.get(owner_id, id)?;
        check_transition(receipt.status, ReceiptStatus::Approved)?;
        let update = update.checked(&self.catalog)?;

        let mut edits = self.apply(&mut receipt, &update, owner_id);

        let missing = missing_required(&receipt.fields);
        if !missing.is_empty() {
            return Err(KabalaError::MissingRequiredFields(missing));
        }
        if let Some(category) = receipt.fields.category_id {
            if !self.catalog.contains(category) {
                return Err(KabalaError::UnknownCategory(category));
            }
        }

        let now = Utc::now();
        edits.push(status_entry(
            id,
            owner_id,
            receipt.status,
            ReceiptStatus::Approved,
            now,
        ));
        receipt.status = ReceiptStatus::Approved;
        receipt.approved_at = Some(now);
        receipt.updated_at = now;

        self.persist(&receipt, ReceiptStatus::Review, &edits)?;
        info!("Approved receipt {}", id);
        Ok(receipt)
    }

    /// Re-run extraction for a `failed` receipt.
    pub fn retry(&self, owner_id: &str, id: &str) -> Result<IngestHandle> {
        let mut receipt = self.get(owner_id, id)?;
        check_transition(receipt.status, ReceiptStatus::Processing)?;

        let now = Utc::now();
        receipt.status = ReceiptStatus::Processing;
        receipt.processing_error = None;
        receipt.processing_started_at = Some(now);
        receipt.processing_completed_at = None;
        receipt.updated_at = now;
        self.persist(&receipt, ReceiptStatus::Failed, &[])?;
        info!("Retrying receipt {}", id);

        Ok(self.spawn_pipeline(receipt))
    }

    /// Delete a receipt and its history. Returns the deleted receipt so the
    /// caller can release the artifact.
    pub fn delete(&self, owner_id: &str, id: &str) -> Result<Receipt> {
        let receipt = self.get(owner_id, id)?;
        if !self.store.delete(owner_id, id)? {
            return Err(KabalaError::NotFound(id.to_string()));
        }
        info!("Deleted receipt {}", id);
        Ok(receipt)
    }

    /// Edit history, newest first.
    pub fn get_history(&self, owner_id: &str, id: &str) -> Result<Vec<EditEntry>> {
        self.get(owner_id, id)?;
        Ok(self.store.history(owner_id, id)?)
    }

    /// Ranked search over the user's receipts.
    pub fn search(&self, owner_id: &str, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        let ranker = SearchRanker::new(self.config.search.clone());
        ranker.check(query, limit)?;
        let receipts = self.store.list(owner_id)?;
        ranker.search(query, limit, &receipts)
    }

    /// Compare a candidate against the user's receipts.
    pub fn check_duplicate(
        &self,
        owner_id: &str,
        candidate: &DuplicateCandidate,
    ) -> Result<DuplicateVerdict> {
        let Some(date) = candidate.date else {
            return Ok(DuplicateVerdict::default());
        };

        let (from, to) = date_window(date, self.config.duplicate.date_window_days);
        let existing = self.store.list_in_window(owner_id, from, to)?;

        Ok(DuplicateDetector::new(self.config.duplicate.clone()).find_duplicate(candidate, &existing))
    }

    /// Flag a receipt in `review` as a duplicate of `original_id`.
    pub fn mark_duplicate(&self, owner_id: &str, id: &str, original_id: &str) -> Result<Receipt> {
        if id == original_id {
            return Err(KabalaError::malformed("duplicate_of", "a receipt cannot duplicate itself"));
        }
        let mut receipt = self.get(owner_id, id)?;
        self.get(owner_id, original_id)?;
        if receipt.status != ReceiptStatus::Review {
            return Err(KabalaError::IllegalTransition {
                from: receipt.status,
                to: ReceiptStatus::Duplicate,
            });
        }

        let now = Utc::now();
        let entry = status_entry(id, owner_id, receipt.status, ReceiptStatus::Duplicate, now);
        receipt.status = ReceiptStatus::Duplicate;
        receipt.is_duplicate = true;
        receipt.duplicate_of = Some(original_id.to_string());
        receipt.updated_at = now;

        self.persist(&receipt, ReceiptStatus::Review, &[entry])?;
        info!("Marked receipt {} as duplicate of {}", id, original_id);
        Ok(receipt)
    }

    /// Return a `duplicate` receipt to `review` and clear the flag.
    pub fn dismiss_duplicate(&self, owner_id: &str, id: &str) -> Result<Receipt> {
        let mut receipt = self.get(owner_id, id)?;
        if receipt.status != ReceiptStatus::Duplicate {
            return Err(KabalaError::IllegalTransition {
                from: receipt.status,
                to: ReceiptStatus::Review,
            });
        }

        let now = Utc::now();
        let entry = status_entry(id, owner_id, receipt.status, ReceiptStatus::Review, now);
        receipt.status = ReceiptStatus::Review;
        receipt.is_duplicate = false;
        receipt.duplicate_of = None;
        receipt.updated_at = now;

        self.persist(&receipt, ReceiptStatus::Duplicate, &[entry])?;
        info!("Receipt {} is no longer a duplicate", id);
        Ok(receipt)
    }

    fn apply(&self, receipt: &mut Receipt, update: &ReceiptUpdate, user_id: &str) -> Vec<EditEntry> {
        let now = Utc::now();
        let formatter = AuditFormatter::new(&self.config.extraction.currency_symbol, &self.catalog);
        let edits = apply_update(&mut receipt.fields, update, &formatter, &receipt.id, user_id, now);

        for edit in &edits {
            if receipt.fields.is_present(edit.field) {
                receipt.field_confidence.insert(edit.field, USER_CONFIDENCE);
            } else {
                receipt.field_confidence.remove(&edit.field);
            }
        }
        if !edits.is_empty() {
            receipt.updated_at = now;
        }

        edits
    }

    /// Save a receipt read while it was `expected`.
    ///
    /// Fails without writing when the stored receipt has since moved to
    /// another status.
    fn persist(&self, receipt: &Receipt, expected: ReceiptStatus, edits: &[EditEntry]) -> Result<()> {
        if self.store.save(receipt, expected, edits)? {
            return Ok(());
        }

        match self.store.get(&receipt.owner_id, &receipt.id)? {
            None => Err(KabalaError::NotFound(receipt.id.clone())),
            Some(current) if receipt.status == expected => {
                Err(KabalaError::EditNotAllowed { status: current.status })
            }
            Some(current) => Err(KabalaError::IllegalTransition {
                from: current.status,
                to: receipt.status,
            }),
        }
    }

    fn spawn_pipeline(&self, receipt: Receipt) -> IngestHandle {
        let receipt_id = receipt.id.clone();
        let service = self.clone();
        let task = tokio::spawn(async move { service.run_pipeline(receipt).await });

        IngestHandle {
            receipt_id,
            status: ReceiptStatus::Processing,
            task,
        }
    }

    async fn run_pipeline(&self, receipt: Receipt) -> Result<Receipt> {
        let outcome =
            recognize_with_retry(self.ocr.as_ref(), &receipt.artifact, &self.config.pipeline)
                .await
                .map_err(|e| e.to_string());

        // Extraction and the store calls block
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.finish(receipt, outcome))
            .await
            .map_err(|e| KabalaError::Task(e.to_string()))?
    }

    /// Store the outcome of a pipeline run. Any error on the way leaves the
    /// receipt `failed` so it can be retried.
    fn finish(&self, mut receipt: Receipt, outcome: std::result::Result<String, String>) -> Result<Receipt> {
        let failure = match outcome {
            Ok(text) => self.complete(&mut receipt, &text).err().map(|e| e.to_string()),
            Err(e) => Some(e),
        };

        if let Some(error) = failure {
            warn!("Extraction of receipt {} failed: {}", receipt.id, error);
            receipt.status = ReceiptStatus::Failed;
            receipt.is_duplicate = false;
            receipt.duplicate_of = None;
            receipt.processing_error = Some(error);
        }

        let now = Utc::now();
        receipt.processing_completed_at = Some(now);
        receipt.updated_at = now;
        self.persist(&receipt, ReceiptStatus::Processing, &[])?;
        info!("Receipt {} finished processing: {}", receipt.id, receipt.status);

        Ok(receipt)
    }

    /// Extract, score, validate and classify recognized text.
    fn complete(&self, receipt: &mut Receipt, text: &str) -> Result<()> {
        let extraction = ReceiptParser::new(&self.config.extraction).parse(text);
        let scorer = ConfidenceScorer::new(&self.config.confidence, self.config.validation.tax_tolerance);

        receipt.fields = extraction.fields();
        receipt.field_confidence = scorer.score_extraction(&extraction);
        receipt.raw_extraction = Some(extraction.to_payload());
        receipt.processing_error = None;

        let report = self.validate(receipt);
        for warning in &report.warnings {
            debug!("Receipt {}: {}", receipt.id, warning);
        }

        let verdict = self.check_duplicate(&receipt.owner_id, &DuplicateCandidate::from_receipt(receipt))?;
        let next = if verdict.is_duplicate {
            ReceiptStatus::Duplicate
        } else {
            ReceiptStatus::Review
        };
        check_transition(receipt.status, next)?;

        receipt.status = next;
        receipt.is_duplicate = verdict.is_duplicate;
        receipt.duplicate_of = if verdict.is_duplicate {
            verdict.matched_receipt_id
        } else {
            None
        };

        Ok(())
    }
}

/// Inclusive range of `days` around `date`, kept within four-digit years.
fn date_window(date: NaiveDate, days: i64) -> (NaiveDate, NaiveDate) {
    let earliest = NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN);
    let latest = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX);

    let window = Duration::try_days(days.max(0));
    let from = window
        .and_then(|w| date.checked_sub_signed(w))
        .unwrap_or(earliest);
    let to = window
        .and_then(|w| date.checked_add_signed(w))
        .unwrap_or(latest);

    (from.max(earliest), to.min(latest))
}
