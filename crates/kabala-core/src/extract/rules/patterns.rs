//! Common regex patterns for receipt extraction.
//!
//! Labels are matched in Hebrew and English; quotation marks inside Hebrew
//! acronyms may be ASCII (`"`, `'`) or gershayim/geresh (`״`, `׳`).

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Tax registration number (9 digits, separators allowed)
    pub static ref TAX_ID_LABELED: Regex = Regex::new(
        r#"(?i)(?:ע["״'׳.]?\s?מ\.?|ח["״'׳.]?\s?פ\.?|עוסק\s+(?:מורשה|פטור)|מס(?:פר)?['׳]?\s+עוסק|\bvat\s*(?:no|number|id)\b|\btax\s*id\b|\bcompany\s*(?:no|id)\b|\breg(?:istration)?\.?\s*no\b)\.?[\s:#]*(\d(?:[-\s]?\d){8})\b"#
    ).unwrap();

    pub static ref TAX_ID_STANDALONE: Regex = Regex::new(
        r"\b(\d{9})\b"
    ).unwrap();

    // Document number
    pub static ref DOCUMENT_NUMBER_HE: Regex = Regex::new(
        r#"(?:חשבונית(?:[ \t]+מס)?(?:[ \t]+קבלה)?|קבלה|תעודת[ \t]+משלוח|(?:מספר|מס['׳"״.]?)[ \t]*(?:חשבונית|קבלה|מסמך))(?:[ \t]*(?:מספר|מס['׳"״.]?|#))?[ \t]*:?[ \t]*([A-Za-z0-9][A-Za-z0-9/\-]*)"#
    ).unwrap();

    pub static ref DOCUMENT_NUMBER_EN: Regex = Regex::new(
        r"(?i)\b(?:invoice|receipt|document|doc|bill)(?:[ \t]+(?:no|number|num)\.?|[ \t]*#)[ \t]*:?[ \t]*([A-Za-z0-9][A-Za-z0-9/\-]*)"
    ).unwrap();

    // Dates
    pub static ref DATE_LABELED: Regex = Regex::new(
        r"(?i)(?:תאריך(?:[ \t]+(?:הפקה|מסמך|חשבונית|קבלה|עסקה))?|\bdate\b|\bissued?(?:[ \t]+on)?\b)[ \t]*:?[ \t]*(\d{1,4}[./\-]\d{1,2}[./\-]\d{2,4})\b"
    ).unwrap();

    pub static ref DATE_NUMERIC: Regex = Regex::new(
        r"\b(\d{1,4}[./\-]\d{1,2}[./\-]\d{2,4})\b"
    ).unwrap();

    pub static ref DATE_HEBREW_LONG: Regex = Regex::new(
        r"(\d{1,2})\s+ב?(ינואר|פברואר|מרץ|מרס|אפריל|מאי|יוני|יולי|אוגוסט|ספטמבר|אוקטובר|נובמבר|דצמבר)\s+(\d{4})"
    ).unwrap();

    pub static ref DATE_ENGLISH_LONG: Regex = Regex::new(
        r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b"
    ).unwrap();

    // Amounts (1,234.56 / 1234,56 / 117)
    pub static ref AMOUNT_PATTERN: Regex = Regex::new(
        r"\b(\d{1,3}(?:[,\u{00a0}\u{202f}]?\d{3})*[.,]\d{2})\b"
    ).unwrap();

    // Totals. Integer amounts are accepted after a total label only.
    pub static ref TOTAL_LABELED: Regex = Regex::new(
        r#"(?i)(?:סה["״'׳]?כ(?:[ \t]+(?:לתשלום|כולל[ \t]+מע["״'׳]?מ|כללי))?|סך[ \t]+הכל(?:[ \t]+לתשלום)?|לתשלום|סכום[ \t]+(?:כולל|לתשלום|סופי)|\bgrand[ \t]+total\b|\btotal(?:[ \t]+(?:due|amount|to[ \t]+pay|incl\.?[ \t]*(?:vat|tax)|including[ \t]+(?:vat|tax)))?\b|\bamount[ \t]+due\b|\bbalance[ \t]+due\b)[ \t]*:?[ \t]*(?:₪|ש["״]?ח|nis|ils|\$)?[ \t]*(\d{1,3}(?:[,\u{00a0}]?\d{3})*(?:[.,]\d{1,2})?)\b"#
    ).unwrap();

    pub static ref PRE_TAX_LABELED: Regex = Regex::new(
        r#"(?i)(?:(?:סה["״'׳]?כ[ \t]+)?(?:לפני|ללא|לא[ \t]+כולל)[ \t]+מע["״'׳]?מ|סכום[ \t]+ביניים|\bsub[ \t]*-?[ \t]*total\b|\btotal[ \t]+(?:before|excl\.?|excluding)[ \t]+(?:vat|tax)\b|\bamount[ \t]+before[ \t]+(?:vat|tax)\b|\bnet(?:[ \t]+amount)?\b)[ \t]*:?[ \t]*(?:₪|ש["״]?ח|nis|ils|\$)?[ \t]*(\d{1,3}(?:[,\u{00a0}]?\d{3})*[.,]\d{2})\b"#
    ).unwrap();

    pub static ref TAX_LABELED: Regex = Regex::new(
        r#"(?i)(?:מע["״'׳]?מ|\bvat\b|\btax\b)(?:[ \t]*\(?[ \t]*\d{1,2}(?:\.\d+)?[ \t]*%[ \t]*\)?)?[ \t]*:?[ \t]*(?:₪|ש["״]?ח|nis|ils|\$)?[ \t]*(\d{1,3}(?:[,\u{00a0}]?\d{3})*[.,]\d{2})\b"#
    ).unwrap();

    // Vendor name on a labelled line
    pub static ref VENDOR_LABELED: Regex = Regex::new(
        r"(?im)^[ \t]*(?:שם[ \t]+(?:העסק|החברה|הספק|בית[ \t]+העסק)|ספק|עסק|vendor|merchant|store|seller|supplier|company)[ \t]*:[ \t]*(\S.*?)[ \t]*$"
    ).unwrap();

    // Phone numbers, used to reject vendor-name candidates
    pub static ref PHONE: Regex = Regex::new(
        r"(?:\+972[\s\-]?|0)\d{1,2}[\s\-]?\d{3}[\s\-]?\d{4}"
    ).unwrap();
}

/// Words that disqualify a tax-amount match when they appear earlier on the same line.
pub const TAX_EXCLUDED_PREFIXES: &[&str] = &[
    "לפני", "ללא", "כולל", "before", "excl", "incl", "excluding", "including", "sub",
];

/// Normalized words marking a line as a label rather than a vendor name.
pub const NON_VENDOR_WORDS: &[&str] = &[
    "חשבונית", "קבלה", "מקור", "העתק", "תאריך", "סהכ", "לתשלום", "מעמ", "עמ", "חפ",
    "עוסק", "טלפון", "טל", "פקס", "כתובת", "receipt", "invoice", "tax", "date", "total",
    "tel", "phone", "fax", "copy", "original", "vat", "cashier", "קופה", "קופאי",
];
