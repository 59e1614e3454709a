//! SQLite schema.

use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;

/// Current schema version, tracked in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS receipts (
    id                       TEXT PRIMARY KEY,
    owner_id                 TEXT NOT NULL,
    artifact_ref             TEXT NOT NULL,
    artifact_filename        TEXT,
    artifact_size            INTEGER,
    artifact_content_type    TEXT,
    vendor_name              TEXT,
    tax_id                   TEXT,
    document_number          TEXT,
    document_date            TEXT,
    total_amount             TEXT,
    tax_amount               TEXT,
    pre_tax_amount           TEXT,
    category_id              INTEGER,
    notes                    TEXT,
    field_confidence         TEXT NOT NULL DEFAULT '{}',
    raw_extraction           TEXT,
    status                   TEXT NOT NULL,
    processing_error         TEXT,
    is_duplicate             INTEGER NOT NULL DEFAULT 0,
    duplicate_of             TEXT,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL,
    processing_started_at    TEXT,
    processing_completed_at  TEXT,
    approved_at              TEXT
);

CREATE INDEX IF NOT EXISTS idx_receipts_owner_date
    ON receipts(owner_id, document_date);

CREATE TABLE IF NOT EXISTS receipt_edits (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    receipt_id  TEXT NOT NULL REFERENCES receipts(id) ON DELETE CASCADE,
    user_id     TEXT NOT NULL,
    field       TEXT NOT NULL,
    old_value   TEXT NOT NULL,
    new_value   TEXT NOT NULL,
    edited_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_receipt_edits_receipt
    ON receipt_edits(receipt_id, edited_at);
";

/// Enable per-connection pragmas.
pub fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

/// Bring the schema up to [`SCHEMA_VERSION`].
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < 1 {
        debug!("Applying schema v1");
        conn.execute_batch(SCHEMA_V1)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
    }

    Ok(())
}
