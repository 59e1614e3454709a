//! Error types for the kabala-core library.

use thiserror::Error;

use crate::models::receipt::{FieldName, ReceiptStatus};

/// Main error type for the kabala library.
///
/// Soft validation findings are never errors; they travel as a
/// [`ValidationReport`](crate::validation::ValidationReport) next to a
/// successful result.
#[derive(Error, Debug)]
pub enum KabalaError {
    /// The receipt does not exist or belongs to another user.
    #[error("receipt not found: {0}")]
    NotFound(String),

    /// A state change that the lifecycle does not allow.
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: ReceiptStatus,
        to: ReceiptStatus,
    },

    /// Field edits are only accepted in `review` or `duplicate`.
    #[error("receipt in status {status} cannot be edited")]
    EditNotAllowed { status: ReceiptStatus },

    /// Approval requires fields that are still empty.
    #[error("missing required fields: {}", join_fields(.0))]
    MissingRequiredFields(Vec<FieldName>),

    /// Input rejected before any processing started.
    #[error("malformed {field}: {reason}")]
    MalformedInput { field: String, reason: String },

    /// Category id is not part of the category list.
    #[error("unknown category: {0}")]
    UnknownCategory(i64),

    /// Persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// OCR engine error that escaped the retry loop.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background pipeline task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl KabalaError {
    /// Shorthand for [`KabalaError::MalformedInput`].
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::EditNotAllowed { .. } => "edit_not_allowed",
            Self::MissingRequiredFields(_) => "missing_required_fields",
            Self::MalformedInput { .. } => "malformed_input",
            Self::UnknownCategory(_) => "unknown_category",
            Self::Store(_) => "store_error",
            Self::Ocr(_) => "ocr_error",
            Self::Io(_) => "io_error",
            Self::Task(_) => "task_failed",
        }
    }

    /// Display-ready message in the user's language.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "הקבלה לא נמצאה".to_string(),
            Self::IllegalTransition { from, to } => format!(
                "לא ניתן להעביר קבלה מסטטוס \"{}\" לסטטוס \"{}\"",
                from.display_label(),
                to.display_label()
            ),
            Self::EditNotAllowed { status } => format!(
                "לא ניתן לערוך קבלה בסטטוס \"{}\"",
                status.display_label()
            ),
            Self::MissingRequiredFields(fields) => format!(
                "חסרים שדות חובה: {}",
                fields
                    .iter()
                    .map(|f| f.display_label())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::MalformedInput { field, reason } => {
                format!("ערך לא תקין בשדה {}: {}", field, reason)
            }
            Self::UnknownCategory(id) => format!("קטגוריה {} אינה קיימת", id),
            Self::Store(_) | Self::Io(_) | Self::Task(_) => {
                "אירעה שגיאה פנימית, נסו שוב מאוחר יותר".to_string()
            }
            Self::Ocr(e) => format!("זיהוי הטקסט נכשל: {}", e),
        }
    }
}

fn join_fields(fields: &[FieldName]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by a [`ReceiptStore`](crate::store::ReceiptStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON column could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored value could not be parsed back.
    #[error("corrupt column {column}: {value}")]
    Corrupt { column: String, value: String },

    /// Connection lock was poisoned by a panicking writer.
    #[error("connection lock poisoned")]
    Poisoned,
}

/// Errors related to the external OCR engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OcrError {
    /// The engine reported a failure.
    #[error("engine failure: {0}")]
    Engine(String),

    /// A single attempt exceeded its time budget.
    #[error("attempt timed out after {0} ms")]
    Timeout(u64),

    /// All attempts were used up; carries the last failure message.
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Result type for the kabala library.
pub type Result<T> = std::result::Result<T, KabalaError>;
