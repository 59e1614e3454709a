//! Document date extraction.

use chrono::NaiveDate;

use super::patterns::{DATE_ENGLISH_LONG, DATE_HEBREW_LONG, DATE_LABELED, DATE_NUMERIC};
use super::{ExtractionMatch, FieldExtractor, RegexRule, Rule, all_rule_matches, first_rule_matches};
use crate::confidence::MatchKind;

/// Date field extractor.
///
/// A labelled date ("תאריך: 15/03/2024") wins over any other date on the
/// receipt. Without a label the first date in the text is used.
pub struct DateExtractor {
    rules: Vec<Box<dyn Rule>>,
}

impl DateExtractor {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RegexRule::new("date_labeled", &DATE_LABELED, MatchKind::Pattern)),
                Box::new(RegexRule::new("date_numeric", &DATE_NUMERIC, MatchKind::Fallback)),
                Box::new(
                    RegexRule::new("date_hebrew_long", &DATE_HEBREW_LONG, MatchKind::Fallback)
                        .with_group(0),
                ),
                Box::new(
                    RegexRule::new("date_english_long", &DATE_ENGLISH_LONG, MatchKind::Fallback)
                        .with_group(0),
                ),
            ],
        }
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        first_rule_matches(&self.rules, text, parse_date)
            .into_iter()
            .next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        all_rule_matches(&self.rules, text, parse_date)
    }
}

/// Extract the document date from text.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    DateExtractor::new().extract(text).map(|m| m.value)
}

/// Parse a date written in any of the supported layouts.
///
/// Numeric dates with a four digit first part are read year-month-day.
/// Otherwise day/month/year is tried first and month/day/year second, so
/// `03/15/2024` still parses. Month names may be Hebrew or English.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Some(caps) = DATE_HEBREW_LONG.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month = hebrew_month_to_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_ENGLISH_LONG.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month = english_month_to_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let parts: Vec<&str> = s.split(['.', '/', '-']).map(str::trim).collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    let a: u32 = parts[0].parse().ok()?;
    let b: u32 = parts[1].parse().ok()?;

    if parts[0].len() == 4 {
        let c: u32 = parts[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(a as i32, b, c);
    }

    if parts[2].len() != 2 && parts[2].len() != 4 {
        return None;
    }
    let year = parse_year(parts[2])?;

    NaiveDate::from_ymd_opt(year, b, a).or_else(|| NaiveDate::from_ymd_opt(year, a, b))
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    if year < 100 {
        // Two-digit year: assume 2000s for 00-50, 1900s for 51-99
        if year <= 50 {
            Some(2000 + year)
        } else {
            Some(1900 + year)
        }
    } else {
        Some(year)
    }
}

fn hebrew_month_to_number(month: &str) -> Option<u32> {
    match month {
        "ינואר" => Some(1),
        "פברואר" => Some(2),
        "מרץ" | "מרס" => Some(3),
        "אפריל" => Some(4),
        "מאי" => Some(5),
        "יוני" => Some(6),
        "יולי" => Some(7),
        "אוגוסט" => Some(8),
        "ספטמבר" => Some(9),
        "אוקטובר" => Some(10),
        "נובמבר" => Some(11),
        "דצמבר" => Some(12),
        _ => None,
    }
}

fn english_month_to_number(month: &str) -> Option<u32> {
    let prefix: String = month.to_lowercase().chars().take(3).collect();
    match prefix.as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_orderings() {
        assert_eq!(parse_date("15/03/2024"), Some(date(2024, 3, 15)));
        assert_eq!(parse_date("15.03.2024"), Some(date(2024, 3, 15)));
        assert_eq!(parse_date("2024-03-15"), Some(date(2024, 3, 15)));
        // Day/month first, month/day when that is impossible
        assert_eq!(parse_date("03/04/2024"), Some(date(2024, 4, 3)));
        assert_eq!(parse_date("03/15/2024"), Some(date(2024, 3, 15)));
    }

    #[test]
    fn test_two_digit_year() {
        assert_eq!(parse_date("15.01.24"), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("15.01.99"), Some(date(1999, 1, 15)));
    }

    #[test]
    fn test_invalid_dates() {
        assert_eq!(parse_date("32/13/2024"), None);
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("15/03/202"), None);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_month_names() {
        assert_eq!(parse_date("15 במרץ 2024"), Some(date(2024, 3, 15)));
        assert_eq!(parse_date("1 ינואר 2023"), Some(date(2023, 1, 1)));
        assert_eq!(parse_date("7 March 2024"), Some(date(2024, 3, 7)));
        assert_eq!(parse_date("7 Sep. 2024"), Some(date(2024, 9, 7)));
    }

    #[test]
    fn test_labeled_date_wins() {
        let text = "הודפס 01/01/2024\nתאריך: 15/03/2024";
        let result = DateExtractor::new().extract(text).unwrap();
        assert_eq!(result.value, date(2024, 3, 15));
        assert_eq!(result.kind, MatchKind::Pattern);
    }

    #[test]
    fn test_unlabeled_date_is_fallback() {
        let result = DateExtractor::new().extract("קופה 3  14/02/2024  12:30").unwrap();
        assert_eq!(result.value, date(2024, 2, 14));
        assert_eq!(result.kind, MatchKind::Fallback);
    }

    #[test]
    fn test_no_date() {
        assert_eq!(extract_date("סה\"כ 117.00"), None);
    }
}
