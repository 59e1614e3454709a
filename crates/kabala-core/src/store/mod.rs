//! Receipt persistence.
//!
//! Every read is scoped to an owner: a receipt that belongs to someone else
//! is reported exactly like one that does not exist.

pub mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::models::receipt::{EditEntry, Receipt, ReceiptStatus};

/// Storage backend for receipts and their edit history.
pub trait ReceiptStore: Send + Sync {
    /// Insert a new receipt.
    fn insert(&self, receipt: &Receipt) -> Result<(), StoreError>;

    /// Fetch one receipt of `owner_id`.
    fn get(&self, owner_id: &str, id: &str) -> Result<Option<Receipt>, StoreError>;

    /// All receipts of `owner_id`, oldest first.
    fn list(&self, owner_id: &str) -> Result<Vec<Receipt>, StoreError>;

    /// Receipts of `owner_id` dated between `from` and `to` inclusive,
    /// oldest first.
    fn list_in_window(
        &self,
        owner_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Receipt>, StoreError>;

    /// Overwrite a stored receipt and append `edits` in one transaction.
    ///
    /// The row is only written while its stored status is still `expected`.
    /// Returns `false` when no receipt with that id, owner and status exists;
    /// nothing is written in that case.
    fn save(
        &self,
        receipt: &Receipt,
        expected: ReceiptStatus,
        edits: &[EditEntry],
    ) -> Result<bool, StoreError>;

    /// Edit history of one receipt, newest first.
    fn history(&self, owner_id: &str, receipt_id: &str) -> Result<Vec<EditEntry>, StoreError>;

    /// Delete a receipt together with its history.
    fn delete(&self, owner_id: &str, id: &str) -> Result<bool, StoreError>;
}
