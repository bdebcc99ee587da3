//! Receipt repository for SQLite persistence.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};

use super::{connect, parse_datetime, Result};
use crate::models::{Receipt, ReceiptPatch};

/// Search filters for receipts. All filters are optional and combine with AND.
#[derive(Debug, Clone, Default)]
pub struct ReceiptFilter {
    /// Earliest transaction date, inclusive.
    pub date_from: Option<NaiveDate>,
    /// Latest transaction date, inclusive.
    pub date_to: Option<NaiveDate>,
    /// Case-insensitive vendor substring.
    pub vendor: Option<String>,
    /// Minimum amount, inclusive.
    pub min_amount: Option<f64>,
    /// Maximum amount, inclusive.
    pub max_amount: Option<f64>,
}

impl ReceiptFilter {
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.vendor.is_none()
            && self.min_amount.is_none()
            && self.max_amount.is_none()
    }
}

/// SQLite-backed receipt repository.
pub struct ReceiptRepository {
    db_path: PathBuf,
}

impl ReceiptRepository {
    /// Create a new repository, initializing the schema if needed.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS receipts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                vendor TEXT NOT NULL,
                amount REAL NOT NULL,
                description TEXT NOT NULL,
                issuer TEXT NOT NULL,
                recipient TEXT,
                has_revenue_stamp INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                file_path TEXT,
                ocr_text TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_date ON receipts(date);
            CREATE INDEX IF NOT EXISTS idx_receipts_vendor ON receipts(vendor);
            "#,
        )?;
        Ok(())
    }

    /// Insert a receipt and return its new ID.
    pub fn add(&self, receipt: &Receipt) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO receipts
                (date, vendor, amount, description, issuer, recipient,
                 has_revenue_stamp, created_at, updated_at, file_path, ocr_text)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                receipt.date.format("%Y-%m-%d").to_string(),
                receipt.vendor,
                receipt.amount,
                receipt.description,
                receipt.issuer,
                receipt.recipient,
                receipt.has_revenue_stamp,
                receipt.created_at.to_rfc3339(),
                receipt.updated_at.to_rfc3339(),
                receipt.file_path.as_ref().map(|p| p.display().to_string()),
                receipt.ocr_text,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a receipt by ID.
    pub fn get(&self, id: i64) -> Result<Option<Receipt>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM receipts WHERE id = ?1",
            RECEIPT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], row_to_receipt)?;
        rows.next().transpose()
    }

    /// Apply a partial update. Returns false when the ID does not exist.
    pub fn update(&self, id: i64, patch: &ReceiptPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(self.get(id)?.is_some());
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(date) = patch.date {
            sets.push("date = ?");
            values.push(Box::new(date.format("%Y-%m-%d").to_string()));
        }
        if let Some(ref vendor) = patch.vendor {
            sets.push("vendor = ?");
            values.push(Box::new(vendor.clone()));
        }
        if let Some(amount) = patch.amount {
            sets.push("amount = ?");
            values.push(Box::new(amount));
        }
        if let Some(ref description) = patch.description {
            sets.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(ref issuer) = patch.issuer {
            sets.push("issuer = ?");
            values.push(Box::new(issuer.clone()));
        }
        if let Some(ref recipient) = patch.recipient {
            sets.push("recipient = ?");
            values.push(Box::new(recipient.clone()));
        }
        if let Some(stamp) = patch.has_revenue_stamp {
            sets.push("has_revenue_stamp = ?");
            values.push(Box::new(stamp));
        }

        sets.push("updated_at = ?");
        values.push(Box::new(Utc::now().to_rfc3339()));
        values.push(Box::new(id));

        let sql = format!(
            "UPDATE receipts SET {} WHERE id = ?",
            sets.join(", ")
        );

        let conn = self.connect()?;
        let changed = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(changed > 0)
    }

    /// Delete a receipt. Returns false when the ID does not exist.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute("DELETE FROM receipts WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Search receipts, newest transaction date first.
    pub fn search(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(date_from) = filter.date_from {
            conditions.push("date >= ?");
            values.push(Box::new(date_from.format("%Y-%m-%d").to_string()));
        }
        if let Some(date_to) = filter.date_to {
            conditions.push("date <= ?");
            values.push(Box::new(date_to.format("%Y-%m-%d").to_string()));
        }
        if let Some(ref vendor) = filter.vendor {
            conditions.push("lower(vendor) LIKE '%' || lower(?) || '%'");
            values.push(Box::new(vendor.clone()));
        }
        if let Some(min) = filter.min_amount {
            conditions.push("amount >= ?");
            values.push(Box::new(min));
        }
        if let Some(max) = filter.max_amount {
            conditions.push("amount <= ?");
            values.push(Box::new(max));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM receipts{} ORDER BY date DESC, id DESC",
            RECEIPT_COLUMNS, where_clause
        );

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), row_to_receipt)?;
        rows.collect()
    }

    /// Get all receipts, newest transaction date first.
    pub fn get_all(&self) -> Result<Vec<Receipt>> {
        self.search(&ReceiptFilter::default())
    }

    /// Total number of stored receipts.
    pub fn count(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM receipts", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

const RECEIPT_COLUMNS: &str = "id, date, vendor, amount, description, issuer, recipient, \
     has_revenue_stamp, created_at, updated_at, file_path, ocr_text";

fn row_to_receipt(row: &Row) -> rusqlite::Result<Receipt> {
    let date_str: String = row.get(1)?;
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    let file_path: Option<String> = row.get(10)?;

    Ok(Receipt {
        id: row.get(0)?,
        date,
        vendor: row.get(2)?,
        amount: row.get(3)?,
        description: row.get(4)?,
        issuer: row.get(5)?,
        recipient: row.get(6)?,
        has_revenue_stamp: row.get(7)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
        file_path: file_path.map(PathBuf::from),
        ocr_text: row.get(11)?,
    })
}
