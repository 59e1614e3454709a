//! Vendor (business name) extraction.

use super::patterns::{NON_VENDOR_WORDS, PHONE, VENDOR_LABELED};
use super::{Capture, ExtractionMatch, FieldExtractor, RegexRule, Rule, all_rule_matches, first_rule_matches};
use crate::confidence::MatchKind;
use crate::normalize::normalize;

/// How many leading non-empty lines are considered for an unlabelled name.
const HEADER_LINES: usize = 5;

const MAX_VENDOR_LEN: usize = 100;

/// Vendor name extractor.
///
/// An explicit "שם העסק:" / "Vendor:" line wins. Otherwise the business
/// name is assumed to be the first header line that is not a label, a
/// phone number or mostly digits.
pub struct VendorExtractor {
    rules: Vec<Box<dyn Rule>>,
}

impl VendorExtractor {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RegexRule::new("vendor_labeled", &VENDOR_LABELED, MatchKind::Pattern)),
                Box::new(HeaderLineRule),
            ],
        }
    }
}

impl Default for VendorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for VendorExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        first_rule_matches(&self.rules, text, parse_vendor_name)
            .into_iter()
            .next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        all_rule_matches(&self.rules, text, parse_vendor_name)
    }
}

/// Picks business-name candidates from the top of the receipt.
struct HeaderLineRule;

impl Rule for HeaderLineRule {
    fn name(&self) -> &'static str {
        "vendor_header_line"
    }

    fn kind(&self) -> MatchKind {
        MatchKind::Fallback
    }

    fn captures<'t>(&self, text: &'t str) -> Vec<Capture<'t>> {
        let mut offset = 0;
        let mut seen = 0;
        let mut captures = Vec::new();

        for line in text.split_inclusive('\n') {
            let start = offset;
            offset += line.len();

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            seen += 1;
            if seen > HEADER_LINES {
                break;
            }
            if !looks_like_name(trimmed) {
                continue;
            }

            let lead = line.len() - line.trim_start().len();
            captures.push(Capture {
                value: trimmed,
                source: trimmed,
                start: start + lead,
                end: start + lead + trimmed.len(),
            });
        }

        captures
    }
}

fn looks_like_name(line: &str) -> bool {
    if PHONE.is_match(line) {
        return false;
    }

    let normalized = normalize(line);
    let letters = normalized.chars().filter(|c| c.is_alphabetic()).count();
    let digits = normalized.chars().filter(|c| c.is_numeric()).count();
    if letters < 2 || digits > letters {
        return false;
    }

    !normalized
        .split(' ')
        .any(|word| NON_VENDOR_WORDS.contains(&word))
}

fn parse_vendor_name(s: &str) -> Option<String> {
    let name = s
        .trim()
        .trim_matches(|c: char| c == '*' || c == '-' || c == '=' || c == '|')
        .trim();

    if name.is_empty() || name.chars().count() > MAX_VENDOR_LEN {
        return None;
    }

    Some(name.to_string())
}

/// Extract the vendor name from text.
pub fn extract_vendor_name(text: &str) -> Option<String> {
    VendorExtractor::new().extract(text).map(|m| m.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_vendor() {
        let text = "חשבונית מס קבלה\nשם העסק: קפה קפה בע\"מ\nתאריך: 15/03/2024";
        let result = VendorExtractor::new().extract(text).unwrap();
        assert_eq!(result.value, "קפה קפה בע\"מ");
        assert_eq!(result.kind, MatchKind::Pattern);
    }

    #[test]
    fn test_header_line_fallback() {
        let text = "\n  *** סופר פארם ***\nטל: 03-1234567\nחשבונית מס קבלה 5512\n";
        let result = VendorExtractor::new().extract(text).unwrap();
        assert_eq!(result.value, "סופר פארם");
        assert_eq!(result.kind, MatchKind::Fallback);
    }

    #[test]
    fn test_header_skips_labels_and_numbers() {
        let text = "קבלה\n03-1234567\n12345 67\nOffice Depot\n";
        assert_eq!(extract_vendor_name(text), Some("Office Depot".to_string()));
    }

    #[test]
    fn test_english_label() {
        assert_eq!(
            extract_vendor_name("Merchant: Cafe Cafe\nTotal 12.00"),
            Some("Cafe Cafe".to_string())
        );
    }

    #[test]
    fn test_no_vendor() {
        assert_eq!(extract_vendor_name(""), None);
        assert_eq!(extract_vendor_name("12.50\n99.00"), None);
    }
}
