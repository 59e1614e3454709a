//! Duplicate receipt detection.
//!
//! A candidate is compared only against receipts of the same owner whose
//! date and amount fall inside the configured windows. Surviving pairs are
//! scored by vendor name similarity plus small bonuses for an almost equal
//! amount and the same calendar day.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use similar::{Algorithm, TextDiff};
use tracing::debug;

use crate::models::config::DuplicateConfig;
use crate::models::receipt::{Receipt, ReceiptStatus};
use crate::normalize::normalize_opt;

/// What an incoming receipt is checked with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    /// Receipt being checked, never matched against itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    pub vendor_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
}

impl DuplicateCandidate {
    /// Candidate built from a stored receipt's fields.
    pub fn from_receipt(receipt: &Receipt) -> Self {
        Self {
            receipt_id: Some(receipt.id.clone()),
            vendor_name: receipt.fields.vendor_name.clone(),
            date: receipt.fields.document_date,
            amount: receipt.fields.total_amount,
        }
    }
}

/// Outcome of a duplicate check.
///
/// `matched_receipt_id` and `similarity` describe the best scoring receipt
/// even when it stays below the threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    pub matched_receipt_id: Option<String>,
    /// Score between 0 and 100.
    pub similarity: f64,
}

/// Duplicate detector.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    config: DuplicateConfig,
}

impl DuplicateDetector {
    pub fn new(config: DuplicateConfig) -> Self {
        Self { config }
    }

    /// Find the receipt in `existing` that `candidate` most likely duplicates.
    ///
    /// Deterministic for a fixed input order; on equal scores the first
    /// receipt wins.
    pub fn find_duplicate(
        &self,
        candidate: &DuplicateCandidate,
        existing: &[Receipt],
    ) -> DuplicateVerdict {
        let mut best: Option<(&Receipt, f64)> = None;

        for receipt in existing.iter().filter(|r| self.in_window(candidate, r)) {
            let score = self.score_pair(candidate, receipt);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((receipt, score));
            }
        }

        let verdict = match best {
            Some((receipt, similarity)) => DuplicateVerdict {
                is_duplicate: similarity >= self.config.threshold,
                matched_receipt_id: Some(receipt.id.clone()),
                similarity,
            },
            None => DuplicateVerdict::default(),
        };

        debug!(
            "Duplicate check: best {:?} scored {:.1} (duplicate: {})",
            verdict.matched_receipt_id, verdict.similarity, verdict.is_duplicate
        );
        verdict
    }

    /// Score of one candidate/receipt pair, 0 - 100.
    pub fn score_pair(&self, candidate: &DuplicateCandidate, receipt: &Receipt) -> f64 {
        let mut score = vendor_similarity(
            candidate.vendor_name.as_deref(),
            receipt.fields.vendor_name.as_deref(),
        );

        if let (Some(a), Some(b)) = (candidate.amount, receipt.fields.total_amount) {
            if (a - b).abs() < a.abs() * self.config.close_amount_ratio {
                score += self.config.close_amount_bonus;
            }
        }

        if candidate.date.is_some() && candidate.date == receipt.fields.document_date {
            score += self.config.same_day_bonus;
        }

        score.min(100.0)
    }

    fn in_window(&self, candidate: &DuplicateCandidate, receipt: &Receipt) -> bool {
        if !is_eligible(receipt.status) {
            return false;
        }
        if candidate.receipt_id.as_deref() == Some(receipt.id.as_str()) {
            return false;
        }

        let (Some(date), Some(amount)) = (candidate.date, candidate.amount) else {
            return false;
        };
        let (Some(other_date), Some(other_amount)) =
            (receipt.fields.document_date, receipt.fields.total_amount)
        else {
            return false;
        };

        let days = (other_date - date).num_days().abs();
        let window = amount.abs() * self.config.amount_window;

        days <= self.config.date_window_days && (other_amount - amount).abs() <= window
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DuplicateConfig::default())
    }
}

/// Only receipts that completed extraction and were not flagged can be
/// duplicated.
fn is_eligible(status: ReceiptStatus) -> bool {
    matches!(status, ReceiptStatus::Review | ReceiptStatus::Approved)
}

/// Similarity of two vendor names on a 0 - 100 scale.
///
/// Names are normalized first. The ratio comes from a longest common
/// subsequence alignment of the characters. An empty name on either side
/// scores 0.
pub fn vendor_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    let a = normalize_opt(a);
    let b = normalize_opt(b);

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 100.0;
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_chars(a.as_str(), b.as_str());
    f64::from(diff.ratio()) * 100.0
}

/// Convert a score to a display percentage.
pub fn similarity_percent(similarity: f64) -> u32 {
    similarity.round().clamp(0.0, 100.0) as u32
}
