//! Receipt models.
//!
//! A `Receipt` is the validated, typed record produced by the extraction
//! pipeline and persisted to the database. A `ReceiptDraft` holds the
//! unvalidated candidate fields returned by the field structuring layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A validated expense receipt record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Database row ID. 0 until inserted.
    pub id: i64,
    /// Transaction date.
    pub date: NaiveDate,
    /// Vendor the transaction was made with.
    pub vendor: String,
    /// Transaction amount in yen. Non-negative.
    pub amount: f64,
    /// What the transaction was for. May be empty.
    pub description: String,
    /// Party that issued the receipt.
    pub issuer: String,
    /// Addressee written on the receipt, if any.
    pub recipient: Option<String>,
    /// Whether a revenue stamp is present. `None` means the source gave
    /// no evidence either way.
    pub has_revenue_stamp: Option<bool>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last modified.
    pub updated_at: DateTime<Utc>,
    /// Path to the ingested source file, if kept.
    pub file_path: Option<PathBuf>,
    /// Raw fused OCR text the record was extracted from, kept for review.
    pub ocr_text: Option<String>,
}

impl Receipt {
    /// Create a new record with storage metadata defaulted.
    pub fn new(
        date: NaiveDate,
        vendor: String,
        amount: f64,
        description: String,
        issuer: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Set by database
            date,
            vendor,
            amount,
            description,
            issuer,
            recipient: None,
            has_revenue_stamp: None,
            created_at: now,
            updated_at: now,
            file_path: None,
            ocr_text: None,
        }
    }
}

/// Candidate fields out of the field structuring layer, before validation.
///
/// Every field is optional: the language model may omit any of them, and
/// the validator is responsible for deciding which absences are defects.
/// `amount` is already coerced to a number by the structuring layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptDraft {
    pub date: Option<String>,
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub issuer: Option<String>,
    pub recipient: Option<String>,
    /// Tri-state: `Some(true)`/`Some(false)` only on explicit evidence in
    /// the model response, `None` otherwise. Never defaulted to false.
    pub has_revenue_stamp: Option<bool>,
}

/// Partial update for an existing receipt. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ReceiptPatch {
    pub date: Option<NaiveDate>,
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub issuer: Option<String>,
    pub recipient: Option<String>,
    pub has_revenue_stamp: Option<bool>,
}

impl ReceiptPatch {
    /// Check whether the patch changes anything.
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.vendor.is_none()
            && self.amount.is_none()
            && self.description.is_none()
            && self.issuer.is_none()
            && self.recipient.is_none()
            && self.has_revenue_stamp.is_none()
    }
}
