//! SQLite implementation of [`ReceiptStore`].

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{ReceiptStore, schema};
use crate::error::StoreError;
use crate::models::receipt::{
    Artifact, EditEntry, FieldName, Receipt, ReceiptFields, ReceiptStatus,
};

const RECEIPT_COLUMNS: &str = "id, owner_id, artifact_ref, artifact_filename, artifact_size, \
     artifact_content_type, vendor_name, tax_id, document_number, document_date, total_amount, \
     tax_amount, pre_tax_amount, category_id, notes, field_confidence, raw_extraction, status, \
     processing_error, is_duplicate, duplicate_of, created_at, updated_at, \
     processing_started_at, processing_completed_at, approved_at";

const INSERT_RECEIPT: &str = "INSERT INTO receipts (id, owner_id, artifact_ref, artifact_filename, \
     artifact_size, artifact_content_type, vendor_name, tax_id, document_number, document_date, \
     total_amount, tax_amount, pre_tax_amount, category_id, notes, field_confidence, \
     raw_extraction, status, processing_error, is_duplicate, duplicate_of, created_at, \
     updated_at, processing_started_at, processing_completed_at, approved_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, \
     ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)";

const UPDATE_RECEIPT: &str = "UPDATE receipts SET artifact_ref = ?3, artifact_filename = ?4, \
     artifact_size = ?5, artifact_content_type = ?6, vendor_name = ?7, tax_id = ?8, \
     document_number = ?9, document_date = ?10, total_amount = ?11, tax_amount = ?12, \
     pre_tax_amount = ?13, category_id = ?14, notes = ?15, field_confidence = ?16, \
     raw_extraction = ?17, status = ?18, processing_error = ?19, is_duplicate = ?20, \
     duplicate_of = ?21, created_at = ?22, updated_at = ?23, processing_started_at = ?24, \
     processing_completed_at = ?25, approved_at = ?26
     WHERE id = ?1 AND owner_id = ?2 AND status = ?27";

/// Receipt store backed by a single SQLite connection.
///
/// Access is serialized through a mutex; SQLite serializes writes anyway.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        info!("Opened receipt store at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        schema::configure(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_receipts(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<Receipt>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, ReceiptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    }
}

impl ReceiptStore for SqliteStore {
    fn insert(&self, receipt: &Receipt) -> Result<(), StoreError> {
        let row = ReceiptRow::from_receipt(receipt)?;
        let conn = self.lock()?;
        conn.execute(INSERT_RECEIPT, row.params().as_slice())?;
        debug!("Inserted receipt {}", receipt.id);
        Ok(())
    }

    fn get(&self, owner_id: &str, id: &str) -> Result<Option<Receipt>, StoreError> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                &format!(
                    "SELECT {} FROM receipts WHERE owner_id = ?1 AND id = ?2",
                    RECEIPT_COLUMNS
                ),
                params![owner_id, id],
                ReceiptRow::from_row,
            )
            .optional()?
        };
        row.map(ReceiptRow::into_receipt).transpose()
    }

    fn list(&self, owner_id: &str) -> Result<Vec<Receipt>, StoreError> {
        self.query_receipts(
            &format!(
                "SELECT {} FROM receipts WHERE owner_id = ?1 ORDER BY created_at, id",
                RECEIPT_COLUMNS
            ),
            &[&owner_id],
        )
    }

    fn list_in_window(
        &self,
        owner_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Receipt>, StoreError> {
        self.query_receipts(
            &format!(
                "SELECT {} FROM receipts
                 WHERE owner_id = ?1 AND document_date BETWEEN ?2 AND ?3
                 ORDER BY created_at, id",
                RECEIPT_COLUMNS
            ),
            &[&owner_id, &date_text(from), &date_text(to)],
        )
    }

    fn save(
        &self,
        receipt: &Receipt,
        expected: ReceiptStatus,
        edits: &[EditEntry],
    ) -> Result<bool, StoreError> {
        let row = ReceiptRow::from_receipt(receipt)?;
        let expected = expected.as_str();
        let mut params = row.params().to_vec();
        params.push(&expected);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(UPDATE_RECEIPT, params.as_slice())?;
        if updated == 0 {
            debug!("Receipt {} is no longer {}, not saved", receipt.id, expected);
            return Ok(false);
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO receipt_edits
                 (receipt_id, user_id, field, old_value, new_value, edited_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for edit in edits {
                stmt.execute(params![
                    edit.receipt_id,
                    edit.user_id,
                    edit.field.as_str(),
                    edit.old_value,
                    edit.new_value,
                    timestamp_text(edit.edited_at),
                ])?;
            }
        }

        tx.commit()?;
        debug!(
            "Saved receipt {} ({}) with {} edit entries",
            receipt.id,
            receipt.status,
            edits.len()
        );
        Ok(true)
    }

    fn history(&self, owner_id: &str, receipt_id: &str) -> Result<Vec<EditEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT e.receipt_id, e.user_id, e.field, e.old_value, e.new_value, e.edited_at
             FROM receipt_edits e
             JOIN receipts r ON r.id = e.receipt_id
             WHERE r.owner_id = ?1 AND e.receipt_id = ?2
             ORDER BY e.edited_at DESC, e.id DESC",
        )?;

        let rows = stmt
            .query_map(params![owner_id, receipt_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(receipt_id, user_id, field, old_value, new_value, edited_at)| {
                Ok(EditEntry {
                    field: FieldName::parse(&field).ok_or_else(|| corrupt("field", &field))?,
                    edited_at: parse_timestamp(&edited_at)
                        .ok_or_else(|| corrupt("edited_at", &edited_at))?,
                    receipt_id,
                    user_id,
                    old_value,
                    new_value,
                })
            })
            .collect()
    }

    fn delete(&self, owner_id: &str, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM receipts WHERE owner_id = ?1 AND id = ?2",
            params![owner_id, id],
        )?;
        debug!("Deleted receipt {} ({} rows)", id, deleted);
        Ok(deleted > 0)
    }
}

/// Column values of one `receipts` row, in [`RECEIPT_COLUMNS`] order.
struct ReceiptRow {
    id: String,
    owner_id: String,
    artifact_ref: String,
    artifact_filename: Option<String>,
    artifact_size: Option<i64>,
    artifact_content_type: Option<String>,
    vendor_name: Option<String>,
    tax_id: Option<String>,
    document_number: Option<String>,
    document_date: Option<String>,
    total_amount: Option<String>,
    tax_amount: Option<String>,
    pre_tax_amount: Option<String>,
    category_id: Option<i64>,
    notes: Option<String>,
    field_confidence: String,
    raw_extraction: Option<String>,
    status: String,
    processing_error: Option<String>,
    is_duplicate: bool,
    duplicate_of: Option<String>,
    created_at: String,
    updated_at: String,
    processing_started_at: Option<String>,
    processing_completed_at: Option<String>,
    approved_at: Option<String>,
}

impl ReceiptRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            artifact_ref: row.get(2)?,
            artifact_filename: row.get(3)?,
            artifact_size: row.get(4)?,
            artifact_content_type: row.get(5)?,
            vendor_name: row.get(6)?,
            tax_id: row.get(7)?,
            document_number: row.get(8)?,
            document_date: row.get(9)?,
            total_amount: row.get(10)?,
            tax_amount: row.get(11)?,
            pre_tax_amount: row.get(12)?,
            category_id: row.get(13)?,
            notes: row.get(14)?,
            field_confidence: row.get(15)?,
            raw_extraction: row.get(16)?,
            status: row.get(17)?,
            processing_error: row.get(18)?,
            is_duplicate: row.get(19)?,
            duplicate_of: row.get(20)?,
            created_at: row.get(21)?,
            updated_at: row.get(22)?,
            processing_started_at: row.get(23)?,
            processing_completed_at: row.get(24)?,
            approved_at: row.get(25)?,
        })
    }

    fn from_receipt(receipt: &Receipt) -> Result<Self, StoreError> {
        let fields = &receipt.fields;
        let raw_extraction = receipt
            .raw_extraction
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            id: receipt.id.clone(),
            owner_id: receipt.owner_id.clone(),
            artifact_ref: receipt.artifact.reference.clone(),
            artifact_filename: receipt.artifact.filename.clone(),
            artifact_size: receipt
                .artifact
                .size_bytes
                .and_then(|size| i64::try_from(size).ok()),
            artifact_content_type: receipt.artifact.content_type.clone(),
            vendor_name: fields.vendor_name.clone(),
            tax_id: fields.tax_id.clone(),
            document_number: fields.document_number.clone(),
            document_date: fields.document_date.map(date_text),
            total_amount: fields.total_amount.map(|d| d.to_string()),
            tax_amount: fields.tax_amount.map(|d| d.to_string()),
            pre_tax_amount: fields.pre_tax_amount.map(|d| d.to_string()),
            category_id: fields.category_id,
            notes: fields.notes.clone(),
            field_confidence: serde_json::to_string(&receipt.field_confidence)?,
            raw_extraction,
            status: receipt.status.as_str().to_string(),
            processing_error: receipt.processing_error.clone(),
            is_duplicate: receipt.is_duplicate,
            duplicate_of: receipt.duplicate_of.clone(),
            created_at: timestamp_text(receipt.created_at),
            updated_at: timestamp_text(receipt.updated_at),
            processing_started_at: receipt.processing_started_at.map(timestamp_text),
            processing_completed_at: receipt.processing_completed_at.map(timestamp_text),
            approved_at: receipt.approved_at.map(timestamp_text),
        })
    }

    fn params(&self) -> [&dyn ToSql; 26] {
        [
            &self.id,
            &self.owner_id,
            &self.artifact_ref,
            &self.artifact_filename,
            &self.artifact_size,
            &self.artifact_content_type,
            &self.vendor_name,
            &self.tax_id,
            &self.document_number,
            &self.document_date,
            &self.total_amount,
            &self.tax_amount,
            &self.pre_tax_amount,
            &self.category_id,
            &self.notes,
            &self.field_confidence,
            &self.raw_extraction,
            &self.status,
            &self.processing_error,
            &self.is_duplicate,
            &self.duplicate_of,
            &self.created_at,
            &self.updated_at,
            &self.processing_started_at,
            &self.processing_completed_at,
            &self.approved_at,
        ]
    }

    fn into_receipt(self) -> Result<Receipt, StoreError> {
        let status =
            ReceiptStatus::parse(&self.status).ok_or_else(|| corrupt("status", &self.status))?;
        let raw_extraction = self
            .raw_extraction
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Receipt {
            artifact: Artifact {
                reference: self.artifact_ref,
                filename: self.artifact_filename,
                size_bytes: self.artifact_size.and_then(|size| u64::try_from(size).ok()),
                content_type: self.artifact_content_type,
            },
            fields: ReceiptFields {
                vendor_name: self.vendor_name,
                tax_id: self.tax_id,
                document_number: self.document_number,
                document_date: parse_column("document_date", self.document_date, parse_date)?,
                total_amount: parse_column("total_amount", self.total_amount, parse_decimal)?,
                tax_amount: parse_column("tax_amount", self.tax_amount, parse_decimal)?,
                pre_tax_amount: parse_column(
                    "pre_tax_amount",
                    self.pre_tax_amount,
                    parse_decimal,
                )?,
                category_id: self.category_id,
                notes: self.notes,
            },
            field_confidence: serde_json::from_str(&self.field_confidence)?,
            raw_extraction,
            status,
            processing_error: self.processing_error,
            is_duplicate: self.is_duplicate,
            duplicate_of: self.duplicate_of,
            created_at: parse_timestamp(&self.created_at)
                .ok_or_else(|| corrupt("created_at", &self.created_at))?,
            updated_at: parse_timestamp(&self.updated_at)
                .ok_or_else(|| corrupt("updated_at", &self.updated_at))?,
            processing_started_at: parse_column(
                "processing_started_at",
                self.processing_started_at,
                parse_timestamp,
            )?,
            processing_completed_at: parse_column(
                "processing_completed_at",
                self.processing_completed_at,
                parse_timestamp,
            )?,
            approved_at: parse_column("approved_at", self.approved_at, parse_timestamp)?,
            id: self.id,
            owner_id: self.owner_id,
        })
    }
}

fn corrupt(column: &str, value: &str) -> StoreError {
    StoreError::Corrupt {
        column: column.to_string(),
        value: value.to_string(),
    }
}

fn parse_column<T>(
    column: &str,
    value: Option<String>,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, StoreError> {
    value
        .map(|v| parse(&v).ok_or_else(|| corrupt(column, &v)))
        .transpose()
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s).ok()
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn receipt(id: &str, owner: &str) -> Receipt {
        let mut r = Receipt::new(id, owner, Artifact::new(format!("mem://{}", id)));
        r.status = ReceiptStatus::Review;
        r.fields.vendor_name = Some("קפה קפה".to_string());
        r.fields.document_date = NaiveDate::from_ymd_opt(2024, 3, 15);
        r.fields.total_amount = Some(Decimal::new(11700, 2));
        r
    }

    fn edit(receipt_id: &str, field: FieldName, at: DateTime<Utc>) -> EditEntry {
        EditEntry {
            receipt_id: receipt_id.to_string(),
            user_id: "u1".to_string(),
            field,
            old_value: "(ריק)".to_string(),
            new_value: "x".to_string(),
            edited_at: at,
        }
    }

    #[test]
    fn test_insert_and_get_preserve_every_column() {
        let store = store();
        let mut r = receipt("r1", "u1");
        r.artifact.filename = Some("r1.jpg".to_string());
        r.artifact.size_bytes = Some(2048);
        r.artifact.content_type = Some("image/jpeg".to_string());
        r.fields.tax_id = Some("512345678".to_string());
        r.fields.tax_amount = Some(Decimal::new(1700, 2));
        r.fields.pre_tax_amount = Some(Decimal::new(10000, 2));
        r.fields.category_id = Some(3);
        r.field_confidence.insert(FieldName::VendorName, 0.8);
        r.field_confidence.insert(FieldName::TotalAmount, 0.95);
        r.raw_extraction = Some(json!({"text_length": 42}));
        r.processing_completed_at = Some(Utc::now());

        store.insert(&r).unwrap();
        let loaded = store.get("u1", "r1").unwrap().unwrap();

        assert_eq!(loaded.fields, r.fields);
        assert_eq!(loaded.artifact, r.artifact);
        assert_eq!(loaded.field_confidence, r.field_confidence);
        assert_eq!(loaded.raw_extraction, r.raw_extraction);
        assert_eq!(loaded.status, ReceiptStatus::Review);
        assert_eq!(loaded.created_at, r.created_at);
        assert_eq!(loaded.processing_completed_at, r.processing_completed_at);
        assert_eq!(loaded.fields.total_amount.unwrap().to_string(), "117.00");
    }

    #[test]
    fn test_reads_are_owner_scoped() {
        let store = store();
        store.insert(&receipt("r1", "u1")).unwrap();

        assert!(store.get("u2", "r1").unwrap().is_none());
        assert!(store.list("u2").unwrap().is_empty());
        assert!(!store.delete("u2", "r1").unwrap());
        assert!(!store.save(&receipt("r1", "u2"), ReceiptStatus::Review, &[]).unwrap());
        assert!(store.get("u1", "r1").unwrap().is_some());
    }

    #[test]
    fn test_save_writes_fields_and_history_together() {
        let store = store();
        let mut r = receipt("r1", "u1");
        store.insert(&r).unwrap();

        let t0 = Utc::now();
        r.fields.notes = Some("lunch".to_string());
        store
            .save(&r, ReceiptStatus::Review, &[edit("r1", FieldName::Notes, t0)])
            .unwrap();
        store
            .save(
                &r,
                ReceiptStatus::Review,
                &[edit("r1", FieldName::Category, t0 + Duration::seconds(5))],
            )
            .unwrap();

        let loaded = store.get("u1", "r1").unwrap().unwrap();
        assert_eq!(loaded.fields.notes.as_deref(), Some("lunch"));

        let history = store.history("u1", "r1").unwrap();
        let fields: Vec<_> = history.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec![FieldName::Category, FieldName::Notes]);
        assert!(store.history("u2", "r1").unwrap().is_empty());
    }

    #[test]
    fn test_save_of_missing_receipt_writes_nothing() {
        let store = store();
        let r = receipt("ghost", "u1");
        let saved = store
            .save(&r, ReceiptStatus::Review, &[edit("ghost", FieldName::Notes, Utc::now())])
            .unwrap();
        assert!(!saved);

        let conn = store.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM receipt_edits", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_save_rejects_changed_status() {
        let store = store();
        let r = receipt("r1", "u1");
        store.insert(&r).unwrap();

        let mut approved = r.clone();
        approved.status = ReceiptStatus::Approved;
        approved.approved_at = Some(Utc::now());
        assert!(store.save(&approved, ReceiptStatus::Review, &[]).unwrap());

        // A write based on the earlier review copy
        let mut stale = r.clone();
        stale.fields.notes = Some("late edit".to_string());
        let saved = store
            .save(&stale, ReceiptStatus::Review, &[edit("r1", FieldName::Notes, Utc::now())])
            .unwrap();
        assert!(!saved);

        let loaded = store.get("u1", "r1").unwrap().unwrap();
        assert_eq!(loaded.status, ReceiptStatus::Approved);
        assert!(loaded.approved_at.is_some());
        assert_eq!(loaded.fields.notes, None);
        assert!(store.history("u1", "r1").unwrap().is_empty());
    }

    #[test]
    fn test_delete_cascades_to_history() {
        let store = store();
        let r = receipt("r1", "u1");
        store.insert(&r).unwrap();
        store
            .save(&r, ReceiptStatus::Review, &[edit("r1", FieldName::Notes, Utc::now())])
            .unwrap();

        assert!(store.delete("u1", "r1").unwrap());
        assert!(store.get("u1", "r1").unwrap().is_none());

        let conn = store.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM receipt_edits", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_list_in_window() {
        let store = store();
        for (id, day) in [("a", 13), ("b", 14), ("c", 15), ("d", 16), ("e", 17)] {
            let mut r = receipt(id, "u1");
            r.fields.document_date = NaiveDate::from_ymd_opt(2024, 3, day);
            store.insert(&r).unwrap();
        }
        let mut undated = receipt("undated", "u1");
        undated.fields.document_date = None;
        store.insert(&undated).unwrap();

        let from = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();
        let mut ids: Vec<_> = store
            .list_in_window("u1", from, to)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert_eq!(store.list("u1").unwrap().len(), 6);
    }

    #[test]
    fn test_corrupt_column_is_reported() {
        let store = store();
        store.insert(&receipt("r1", "u1")).unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute("UPDATE receipts SET total_amount = 'abc' WHERE id = 'r1'", [])
                .unwrap();
        }

        let err = store.get("u1", "r1").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref column, .. } if column == "total_amount"));
    }
}
