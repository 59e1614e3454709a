//! Confidence scoring for extracted fields.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::extract::Extraction;
use crate::models::config::ConfidenceConfig;
use crate::models::receipt::FieldName;
use crate::validation::tax::reconciles;

/// How a field value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Labelled match confirmed by a checksum or by the other fields.
    Validated,
    /// Labelled match without secondary confirmation.
    Pattern,
    /// Derived arithmetically from other fields.
    Calculated,
    /// Heuristic guess.
    Fallback,
}

impl MatchKind {
    /// Whether the value was read from the text rather than computed.
    pub fn is_direct(&self) -> bool {
        matches!(self, MatchKind::Validated | MatchKind::Pattern)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Validated => "validated",
            MatchKind::Pattern => "pattern",
            MatchKind::Calculated => "calculated",
            MatchKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps match kinds to confidence values.
///
/// Configured values are clamped into their bands:
///
/// | kind       | band        |
/// |------------|-------------|
/// | validated  | 0.85 - 1.00 |
/// | pattern    | 0.70 - 0.84 |
/// | calculated | 0.70 - 0.84 |
/// | fallback   | 0.00 - 0.69 |
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    validated: f32,
    pattern: f32,
    calculated: f32,
    fallback: f32,
    tolerance: Decimal,
}

impl ConfidenceScorer {
    /// Create a scorer. `tolerance` is the absolute amount tolerance used to
    /// confirm a total/tax/pre-tax triple.
    pub fn new(config: &ConfidenceConfig, tolerance: Decimal) -> Self {
        Self {
            validated: config.validated.clamp(0.85, 1.0),
            pattern: config.pattern.clamp(0.70, 0.84),
            calculated: config.calculated.clamp(0.70, 0.84),
            fallback: config.fallback.clamp(0.0, 0.69),
            tolerance,
        }
    }

    /// Confidence for one field matched the given way.
    pub fn score(&self, field: FieldName, kind: MatchKind) -> f32 {
        let score = match kind {
            MatchKind::Validated => self.validated,
            MatchKind::Pattern => self.pattern,
            MatchKind::Calculated => self.calculated,
            MatchKind::Fallback => self.fallback,
        };
        trace!("score {} ({}) = {:.2}", field, kind, score);
        score
    }

    /// Score every populated field of an extraction.
    ///
    /// A total, tax and pre-tax amount that were all read directly and
    /// reconcile within tolerance confirm each other and are all scored as
    /// validated.
    pub fn score_extraction(&self, extraction: &Extraction) -> BTreeMap<FieldName, f32> {
        let mut kinds = extraction.kinds();

        if let (Some(total), Some(tax), Some(pre_tax)) = (
            &extraction.total_amount,
            &extraction.tax_amount,
            &extraction.pre_tax_amount,
        ) {
            let direct = total.kind.is_direct() && tax.kind.is_direct() && pre_tax.kind.is_direct();
            if direct && reconciles(pre_tax.value, tax.value, total.value, self.tolerance) {
                for field in [
                    FieldName::TotalAmount,
                    FieldName::TaxAmount,
                    FieldName::PreTaxAmount,
                ] {
                    kinds.insert(field, MatchKind::Validated);
                }
            }
        }

        kinds
            .into_iter()
            .map(|(field, kind)| (field, self.score(field, kind)))
            .collect()
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(&ConfidenceConfig::default(), Decimal::new(2, 2))
    }
}

/// Arithmetic mean of the populated per-field confidences.
///
/// Fields that were never extracted are left out of the mean rather than
/// counted as zero. Returns `None` for an empty map.
pub fn overall_confidence(scores: &BTreeMap<FieldName, f32>) -> Option<f32> {
    if scores.is_empty() {
        return None;
    }
    let sum: f32 = scores.values().sum();
    Some(sum / scores.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ReceiptParser;

    #[test]
    fn test_default_bands() {
        let scorer = ConfidenceScorer::default();
        assert!(scorer.score(FieldName::TaxId, MatchKind::Validated) >= 0.85);

        let pattern = scorer.score(FieldName::DocumentDate, MatchKind::Pattern);
        assert!((0.70..0.85).contains(&pattern));

        let calculated = scorer.score(FieldName::TaxAmount, MatchKind::Calculated);
        assert!((0.70..0.85).contains(&calculated));

        assert!(scorer.score(FieldName::VendorName, MatchKind::Fallback) < 0.70);
    }

    #[test]
    fn test_configured_values_are_clamped() {
        let config = ConfidenceConfig {
            validated: 0.5,
            pattern: 0.99,
            calculated: 0.1,
            fallback: 0.9,
        };
        let scorer = ConfidenceScorer::new(&config, Decimal::new(2, 2));

        assert_eq!(scorer.score(FieldName::TaxId, MatchKind::Validated), 0.85);
        assert_eq!(scorer.score(FieldName::TaxId, MatchKind::Pattern), 0.84);
        assert_eq!(scorer.score(FieldName::TaxId, MatchKind::Calculated), 0.70);
        assert_eq!(scorer.score(FieldName::TaxId, MatchKind::Fallback), 0.69);
    }

    #[test]
    fn test_overall_confidence_is_mean_of_present() {
        let mut scores = BTreeMap::new();
        assert_eq!(overall_confidence(&scores), None);

        scores.insert(FieldName::VendorName, 0.5);
        scores.insert(FieldName::TotalAmount, 1.0);
        let overall = overall_confidence(&scores).unwrap();
        assert!((overall - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_record_matches_full_record_with_same_scores() {
        let mut sparse = BTreeMap::new();
        sparse.insert(FieldName::TotalAmount, 0.8);

        let full: BTreeMap<_, _> = FieldName::EXTRACTED.iter().map(|f| (*f, 0.8)).collect();

        assert_eq!(overall_confidence(&sparse), overall_confidence(&full));
    }

    #[test]
    fn test_reconciled_triple_is_validated() {
        let text = "סה\"כ לפני מע\"מ: 100.00\nמע\"מ 17%: 17.00\nסה\"כ לתשלום: 117.00";
        let extraction = ReceiptParser::default().parse(text);
        let scores = ConfidenceScorer::default().score_extraction(&extraction);

        assert_eq!(scores[&FieldName::TotalAmount], 0.95);
        assert_eq!(scores[&FieldName::TaxAmount], 0.95);
        assert_eq!(scores[&FieldName::PreTaxAmount], 0.95);
    }

    #[test]
    fn test_unreconciled_triple_stays_pattern() {
        let text = "סה\"כ לפני מע\"מ: 100.00\nמע\"מ 17%: 20.00\nסה\"כ לתשלום: 117.00";
        let extraction = ReceiptParser::default().parse(text);
        let scores = ConfidenceScorer::default().score_extraction(&extraction);

        assert_eq!(scores[&FieldName::TotalAmount], 0.80);
        assert_eq!(scores[&FieldName::TaxAmount], 0.80);
    }

    #[test]
    fn test_derived_amounts_score_as_calculated() {
        let extraction = ReceiptParser::default().parse("סה\"כ לתשלום: 117.00");
        let scores = ConfidenceScorer::default().score_extraction(&extraction);

        assert_eq!(scores[&FieldName::TotalAmount], 0.80);
        assert_eq!(scores[&FieldName::TaxAmount], 0.75);
        assert_eq!(scores[&FieldName::PreTaxAmount], 0.75);
    }
}
