//! Receipt field extraction module.

mod parser;
pub mod rules;

pub use parser::{Extraction, ReceiptParser, extract_fields};
pub use rules::{ExtractionMatch, FieldExtractor};
