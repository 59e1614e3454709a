//! Invoice / receipt number extraction.

use super::patterns::{DOCUMENT_NUMBER_EN, DOCUMENT_NUMBER_HE};
use super::{ExtractionMatch, FieldExtractor, RegexRule, Rule, all_rule_matches, first_rule_matches};
use crate::confidence::MatchKind;

/// Document number extractor.
pub struct DocumentNumberExtractor {
    rules: Vec<Box<dyn Rule>>,
}

impl DocumentNumberExtractor {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RegexRule::new(
                    "document_number_he",
                    &DOCUMENT_NUMBER_HE,
                    MatchKind::Pattern,
                )),
                Box::new(RegexRule::new(
                    "document_number_en",
                    &DOCUMENT_NUMBER_EN,
                    MatchKind::Pattern,
                )),
            ],
        }
    }
}

impl Default for DocumentNumberExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DocumentNumberExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        first_rule_matches(&self.rules, text, parse_document_number)
            .into_iter()
            .next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        all_rule_matches(&self.rules, text, parse_document_number)
    }
}

/// Extract the document number from text.
pub fn extract_document_number(text: &str) -> Option<String> {
    DocumentNumberExtractor::new().extract(text).map(|m| m.value)
}

fn parse_document_number(s: &str) -> Option<String> {
    let value = s.trim().trim_end_matches(['-', '/']);

    // Labels are often followed by words ("קבלה מקור"); a number needs a digit
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(value.to_string())
}
