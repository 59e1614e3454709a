//! Business registration number (ח.פ / ע.מ) extraction and validation.

use super::patterns::{TAX_ID_LABELED, TAX_ID_STANDALONE};
use super::{ExtractionMatch, FieldExtractor, Rule, RegexRule};
use crate::confidence::MatchKind;
use crate::normalize::digits_only;

/// Tax id field extractor.
pub struct TaxIdExtractor {
    rules: Vec<Box<dyn Rule>>,
}

impl TaxIdExtractor {
    /// Create a new tax id extractor.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RegexRule::new("tax_id_labeled", &TAX_ID_LABELED, MatchKind::Pattern)),
                Box::new(RegexRule::new(
                    "tax_id_standalone",
                    &TAX_ID_STANDALONE,
                    MatchKind::Pattern,
                )),
            ],
        }
    }

    fn matches_for(&self, rule: &dyn Rule, text: &str) -> Vec<ExtractionMatch<String>> {
        let labeled = rule.name() == "tax_id_labeled";

        rule.captures(text)
            .into_iter()
            .filter_map(|cap| {
                let id = digits_only(cap.value);
                let valid = validate_tax_id(&id);

                // A bare nine digit run is only trusted when its check digit is right
                if !labeled && !valid {
                    return None;
                }

                let kind = if labeled && valid {
                    MatchKind::Validated
                } else {
                    rule.kind()
                };
                Some(
                    ExtractionMatch::new(id, kind, rule.name(), cap.source)
                        .with_position(cap.start, cap.end),
                )
            })
            .collect()
    }
}

impl Default for TaxIdExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for TaxIdExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.rules
            .iter()
            .find_map(|rule| self.matches_for(rule.as_ref(), text).into_iter().next())
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();
        for rule in &self.rules {
            for m in self.matches_for(rule.as_ref(), text) {
                if !results.iter().any(|r| r.value == m.value) {
                    results.push(m);
                }
            }
        }
        results
    }
}

/// Extract the tax id from text.
pub fn extract_tax_id(text: &str) -> Option<String> {
    TaxIdExtractor::new().extract(text).map(|m| m.value)
}

/// Validate a nine digit registration number.
///
/// Digits are weighted 1, 2, 1, 2, ... from the left; products of 10 or
/// more are folded to the sum of their digits. The number is valid when the
/// total is divisible by 10.
pub fn validate_tax_id(tax_id: &str) -> bool {
    let digits: Vec<u32> = tax_id
        .chars()
        .filter(|c| c.is_ascii_digit())
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != 9 || tax_id.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let product = d * (1 + (i as u32 % 2));
            if product >= 10 { product - 9 } else { product }
        })
        .sum();

    sum % 10 == 0
}

/// Format a tax id as XX-XXXXXX-X.
pub fn format_tax_id(tax_id: &str) -> String {
    let digits = digits_only(tax_id);

    if digits.len() != 9 {
        return tax_id.to_string();
    }

    format!("{}-{}-{}", &digits[0..2], &digits[2..8], &digits[8..9])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tax_id_valid() {
        assert!(validate_tax_id("123456782"));
        assert!(validate_tax_id("12-345678-2")); // With dashes
        assert!(validate_tax_id("000000018"));
    }

    #[test]
    fn test_validate_tax_id_invalid() {
        assert!(!validate_tax_id("123456783")); // Last digit flipped
        assert!(!validate_tax_id("223456782")); // First digit flipped
        assert!(!validate_tax_id("12345678")); // Too short
        assert!(!validate_tax_id("1234567820")); // Too long
        assert!(!validate_tax_id(""));
    }

    #[test]
    fn test_extract_labeled_is_validated() {
        let text = "קפה קפה בע\"מ\nח.פ: 12-345678-2\nתל אביב";
        let extractor = TaxIdExtractor::new();
        let result = extractor.extract(text).unwrap();

        assert_eq!(result.value, "123456782");
        assert_eq!(result.kind, MatchKind::Validated);
        assert_eq!(result.rule, "tax_id_labeled");
    }

    #[test]
    fn test_labeled_bad_checksum_kept_as_pattern() {
        let result = TaxIdExtractor::new().extract("עוסק מורשה 123456783").unwrap();
        assert_eq!(result.value, "123456783");
        assert_eq!(result.kind, MatchKind::Pattern);
    }

    #[test]
    fn test_standalone_requires_checksum() {
        assert_eq!(extract_tax_id("ref 123456782 ok"), Some("123456782".to_string()));
        assert_eq!(extract_tax_id("ref 123456783 ok"), None);
    }

    #[test]
    fn test_english_label() {
        assert_eq!(
            extract_tax_id("Tax ID: 123456782"),
            Some("123456782".to_string())
        );
    }

    #[test]
    fn test_format_tax_id() {
        assert_eq!(format_tax_id("123456782"), "12-345678-2");
        assert_eq!(format_tax_id("1234"), "1234");
    }
}
