//! Relevance ranked search over stored receipts.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KabalaError, Result};
use crate::models::config::SearchConfig;
use crate::models::receipt::{FieldName, Receipt};
use crate::normalize::{digits_only, normalize, normalize_opt};

const VENDOR_CONTAINS: u32 = 50;
const VENDOR_PREFIX: u32 = 30;
const VENDOR_EXACT: u32 = 20;
const DOCUMENT_EXACT: u32 = 100;
const DOCUMENT_CONTAINS: u32 = 60;
const TAX_ID_EXACT: u32 = 80;
const TAX_ID_CONTAINS: u32 = 50;
const NOTES_CONTAINS: u32 = 20;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub receipt_id: String,
    /// Sum of all field scores.
    pub score: u32,
    /// Field that contributed the most.
    pub matched_field: FieldName,
}

/// Scores and orders receipts against a free text query.
#[derive(Debug, Clone)]
pub struct SearchRanker {
    config: SearchConfig,
}

impl SearchRanker {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Check query and limit bounds. Returns the effective limit.
    pub fn check(&self, query: &str, limit: Option<usize>) -> Result<usize> {
        let len = query.trim().chars().count();
        if len < self.config.min_query_len || len > self.config.max_query_len {
            return Err(KabalaError::malformed(
                "query",
                format!(
                    "length must be between {} and {} characters, got {}",
                    self.config.min_query_len, self.config.max_query_len, len
                ),
            ));
        }

        let limit = limit.unwrap_or(self.config.default_limit);
        if limit == 0 || limit > self.config.max_limit {
            return Err(KabalaError::malformed(
                "limit",
                format!("must be between 1 and {}, got {}", self.config.max_limit, limit),
            ));
        }

        Ok(limit)
    }

    /// Rank `receipts` against `query`.
    ///
    /// Every receipt is scored before the list is cut to `limit`. Receipts
    /// scoring 0 are dropped; equal scores keep their input order.
    pub fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        receipts: &[Receipt],
    ) -> Result<Vec<SearchHit>> {
        let limit = self.check(query, limit)?;
        let query = Query::new(query);

        let mut hits: Vec<SearchHit> = receipts
            .iter()
            .filter_map(|receipt| {
                query.score(receipt).map(|(score, matched_field)| SearchHit {
                    receipt_id: receipt.id.clone(),
                    score,
                    matched_field,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score));
        debug!(
            "Search {:?}: {} of {} receipts matched",
            query.text,
            hits.len(),
            receipts.len()
        );
        hits.truncate(limit);

        Ok(hits)
    }
}

impl Default for SearchRanker {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

/// Normalized forms of the query.
struct Query {
    text: String,
    digits: Option<String>,
}

impl Query {
    fn new(raw: &str) -> Self {
        let text = normalize(raw);
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = (!compact.is_empty() && compact.chars().all(|c| c.is_ascii_digit()))
            .then_some(compact);
        Self { text, digits }
    }

    /// Total score and best field, or `None` when nothing matched.
    fn score(&self, receipt: &Receipt) -> Option<(u32, FieldName)> {
        if self.text.is_empty() {
            return None;
        }

        let fields = &receipt.fields;
        let scores = [
            (FieldName::VendorName, self.score_vendor(fields.vendor_name.as_deref())),
            (
                FieldName::DocumentNumber,
                self.score_document_number(fields.document_number.as_deref()),
            ),
            (FieldName::TaxId, self.score_tax_id(fields.tax_id.as_deref())),
            (FieldName::Notes, self.score_notes(fields.notes.as_deref())),
        ];

        let total: u32 = scores.iter().map(|(_, s)| s).sum();
        if total == 0 {
            return None;
        }

        // First field wins on equal scores
        let (best, _) = scores
            .iter()
            .fold((FieldName::VendorName, 0), |(bf, bs), (f, s)| {
                if *s > bs { (*f, *s) } else { (bf, bs) }
            });

        Some((total, best))
    }

    fn score_vendor(&self, vendor: Option<&str>) -> u32 {
        let vendor = normalize_opt(vendor);
        if vendor.is_empty() || !vendor.contains(&self.text) {
            return 0;
        }

        let mut score = VENDOR_CONTAINS;
        if vendor.starts_with(&self.text) {
            score += VENDOR_PREFIX;
        }
        if vendor == self.text {
            score += VENDOR_EXACT;
        }
        score
    }

    fn score_document_number(&self, number: Option<&str>) -> u32 {
        let number = normalize_opt(number);
        if number.is_empty() {
            0
        } else if number == self.text {
            DOCUMENT_EXACT
        } else if number.contains(&self.text) {
            DOCUMENT_CONTAINS
        } else {
            0
        }
    }

    fn score_tax_id(&self, tax_id: Option<&str>) -> u32 {
        let (Some(query), Some(tax_id)) = (&self.digits, tax_id) else {
            return 0;
        };
        let tax_id = digits_only(tax_id);
        if tax_id.is_empty() {
            0
        } else if &tax_id == query {
            TAX_ID_EXACT
        } else if tax_id.contains(query.as_str()) {
            TAX_ID_CONTAINS
        } else {
            0
        }
    }

    fn score_notes(&self, notes: Option<&str>) -> u32 {
        if normalize_opt(notes).contains(&self.text) {
            NOTES_CONTAINS
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::receipt::Artifact;
    use pretty_assertions::assert_eq;

    fn receipt(id: &str) -> Receipt {
        Receipt::new(id, "u1", Artifact::new(format!("mem://{}", id)))
    }

    fn with_vendor(id: &str, vendor: &str) -> Receipt {
        let mut r = receipt(id);
        r.fields.vendor_name = Some(vendor.to_string());
        r
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.receipt_id.as_str()).collect()
    }

    #[test]
    fn test_vendor_ordering() {
        let mut notes_only = receipt("notes");
        notes_only.fields.notes = Some("bought at the super".to_string());

        let receipts = vec![
            notes_only,
            with_vendor("market", "Super Market"),
            with_vendor("exact", "Super"),
            with_vendor("plus", "Supermarket Plus"),
            with_vendor("other", "Office Depot"),
        ];

        let hits = SearchRanker::default().search("Super", None, &receipts).unwrap();

        assert_eq!(ids(&hits), vec!["exact", "market", "plus", "notes"]);
        assert_eq!(hits[0].score, 100);
        assert_eq!(hits[1].score, 80);
        assert_eq!(hits[3].score, 20);
        assert_eq!(hits[3].matched_field, FieldName::Notes);
    }

    #[test]
    fn test_scores_add_up_across_fields() {
        let mut r = with_vendor("r1", "Cafe 2024");
        r.fields.document_number = Some("2024".to_string());

        let hits = SearchRanker::default().search("2024", None, &[r]).unwrap();
        assert_eq!(hits[0].score, 50 + 100);
        assert_eq!(hits[0].matched_field, FieldName::DocumentNumber);
    }

    #[test]
    fn test_tax_id_match() {
        let mut exact = receipt("exact");
        exact.fields.tax_id = Some("123456782".to_string());
        let mut partial = receipt("partial");
        partial.fields.tax_id = Some("512345678".to_string());

        let hits = SearchRanker::default()
            .search("12-345678-2", None, &[partial.clone(), exact.clone()])
            .unwrap();
        assert_eq!(ids(&hits), vec!["exact"]);
        assert_eq!(hits[0].score, 80);

        let hits = SearchRanker::default().search("345", None, &[exact, partial]).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score == 50 && h.matched_field == FieldName::TaxId));
    }

    #[test]
    fn test_hebrew_query_ignores_niqqud() {
        let receipts = vec![with_vendor("r1", "שׁוּפֶרסל")];
        let hits = SearchRanker::default().search("שופרסל", None, &receipts).unwrap();
        assert_eq!(hits[0].score, 100);
    }

    #[test]
    fn test_limit_applies_after_sorting() {
        let receipts = vec![
            with_vendor("a", "Super Market"),
            with_vendor("b", "Mega Super"),
            with_vendor("c", "Super"),
        ];
        let hits = SearchRanker::default().search("super", Some(1), &receipts).unwrap();
        assert_eq!(ids(&hits), vec!["c"]);
    }

    #[test]
    fn test_zero_score_excluded() {
        let receipts = vec![with_vendor("a", "Office Depot")];
        let hits = SearchRanker::default().search("cafe", None, &receipts).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_query_bounds() {
        let ranker = SearchRanker::default();
        let err = ranker.search("a", None, &[]).unwrap_err();
        assert_eq!(err.code(), "malformed_input");

        let long = "x".repeat(101);
        assert!(ranker.search(&long, None, &[]).is_err());
        assert!(ranker.search(&"x".repeat(100), None, &[]).is_ok());
    }

    #[test]
    fn test_limit_bounds() {
        let ranker = SearchRanker::default();
        assert!(ranker.search("super", Some(0), &[]).is_err());
        assert!(ranker.search("super", Some(101), &[]).is_err());
        assert!(ranker.search("super", Some(100), &[]).is_ok());
        assert_eq!(ranker.check("super", None).unwrap(), 20);
    }
}
