//! Rule-based field extractors for receipts.
//!
//! Each field owns an ordered list of [`Rule`]s. Rules are tried in order and
//! the first one that yields a parseable value wins for that field.

pub mod amounts;
pub mod dates;
pub mod document_number;
pub mod patterns;
pub mod tax_id;
pub mod vendor;

pub use amounts::{
    AmountExtractor, ReceiptTotals, TotalsExtractor, extract_totals, format_currency, parse_amount,
};
pub use dates::{DateExtractor, extract_date, parse_date};
pub use document_number::{DocumentNumberExtractor, extract_document_number};
pub use tax_id::{TaxIdExtractor, extract_tax_id, format_tax_id, validate_tax_id};
pub use vendor::{VendorExtractor, extract_vendor_name};

use regex::Regex;

use crate::confidence::MatchKind;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// An extracted value and how it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// How the value was obtained.
    pub kind: MatchKind,
    /// Name of the rule that produced it.
    pub rule: &'static str,
    /// Position in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, kind: MatchKind, rule: &'static str, source: impl Into<String>) -> Self {
        Self {
            value,
            kind,
            rule,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }

    /// A value computed from other fields rather than read from text.
    pub fn calculated(value: T, rule: &'static str) -> Self {
        Self::new(value, MatchKind::Calculated, rule, "calculated")
    }
}

/// Raw capture produced by a rule, before typed parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture<'t> {
    /// Captured value text.
    pub value: &'t str,
    /// Whole matched text.
    pub source: &'t str,
    pub start: usize,
    pub end: usize,
}

/// One entry in a field's ordered rule list.
pub trait Rule: Send + Sync {
    /// Rule name, reported with every match.
    fn name(&self) -> &'static str;

    /// How trustworthy a match of this rule is.
    fn kind(&self) -> MatchKind;

    /// All raw captures in `text`, in text order.
    fn captures<'t>(&self, text: &'t str) -> Vec<Capture<'t>>;
}

/// A rule backed by a single regex capture group.
pub struct RegexRule {
    name: &'static str,
    regex: &'static Regex,
    group: usize,
    kind: MatchKind,
    excluded_prefixes: &'static [&'static str],
}

impl RegexRule {
    pub fn new(name: &'static str, regex: &'static Regex, kind: MatchKind) -> Self {
        Self {
            name,
            regex,
            group: 1,
            kind,
            excluded_prefixes: &[],
        }
    }

    /// Capture group holding the value (0 = whole match).
    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    /// Skip matches preceded on the same line by any of `prefixes`.
    pub fn excluding(mut self, prefixes: &'static [&'static str]) -> Self {
        self.excluded_prefixes = prefixes;
        self
    }

    fn is_excluded(&self, text: &str, start: usize) -> bool {
        if self.excluded_prefixes.is_empty() {
            return false;
        }
        let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let before = text[line_start..start].to_lowercase();
        self.excluded_prefixes.iter().any(|p| before.contains(p))
    }
}

impl Rule for RegexRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> MatchKind {
        self.kind
    }

    fn captures<'t>(&self, text: &'t str) -> Vec<Capture<'t>> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let full = caps.get(0)?;
                let value = caps.get(self.group)?;
                if self.is_excluded(text, full.start()) {
                    return None;
                }
                Some(Capture {
                    value: value.as_str(),
                    source: full.as_str(),
                    start: full.start(),
                    end: full.end(),
                })
            })
            .collect()
    }
}

/// Parse every capture of `rule`, dropping those that do not parse.
pub(crate) fn parse_captures<T>(
    rule: &dyn Rule,
    text: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Vec<ExtractionMatch<T>> {
    rule.captures(text)
        .into_iter()
        .filter_map(|cap| {
            parse(cap.value).map(|value| {
                ExtractionMatch::new(value, rule.kind(), rule.name(), cap.source)
                    .with_position(cap.start, cap.end)
            })
        })
        .collect()
}

/// Walk `rules` in priority order and return the matches of the first rule
/// that produced any.
pub(crate) fn first_rule_matches<T>(
    rules: &[Box<dyn Rule>],
    text: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Vec<ExtractionMatch<T>> {
    for rule in rules {
        let matches = parse_captures(rule.as_ref(), text, &parse);
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

/// Matches of every rule, in rule order, skipping values already seen.
pub(crate) fn all_rule_matches<T: PartialEq>(
    rules: &[Box<dyn Rule>],
    text: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Vec<ExtractionMatch<T>> {
    let mut results: Vec<ExtractionMatch<T>> = Vec::new();
    for rule in rules {
        for m in parse_captures(rule.as_ref(), text, &parse) {
            if !results.iter().any(|r| r.value == m.value) {
                results.push(m);
            }
        }
    }
    results
}
