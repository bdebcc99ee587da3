//! Candidate-field validation.
//!
//! Enforces the record contract: required fields present, amount a
//! non-negative number, date in a recognized notation. Every defect is
//! collected so a reviewer sees the complete list in one pass instead of
//! fixing fields one resubmission at a time.

use chrono::NaiveDate;

use crate::models::{Receipt, ReceiptDraft};
use crate::utils::normalize_fullwidth;

/// A single defective field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefect {
    /// Field name as it appears in the extraction output.
    pub field: &'static str,
    /// What is wrong with it.
    pub problem: String,
}

impl std::fmt::Display for FieldDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// Validation failure listing every missing or malformed field.
#[derive(Debug)]
pub struct ValidationError {
    pub defects: Vec<FieldDefect>,
}

impl ValidationError {
    /// Whether a particular field is among the defects.
    pub fn names_field(&self, field: &str) -> bool {
        self.defects.iter().any(|d| d.field == field)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid record: ")?;
        for (i, defect) in self.defects.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", defect)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Date notations accepted after full-width normalization.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Parse a transaction date.
///
/// Accepts ISO `2024-01-15`, `2024/1/15`, `2024.1.15`, and Japanese
/// `2024年1月15日`, with full-width digits normalized first.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let normalized = normalize_fullwidth(text);
    let trimmed = normalized.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Validate candidate fields into a typed record.
///
/// On failure the error enumerates every defect, not just the first.
pub fn validate(draft: &ReceiptDraft) -> Result<Receipt, ValidationError> {
    let mut defects = Vec::new();

    let date = match draft.date.as_deref() {
        None => {
            defects.push(FieldDefect {
                field: "date",
                problem: "missing".to_string(),
            });
            None
        }
        Some(raw) => match parse_date(raw) {
            Some(d) => Some(d),
            None => {
                defects.push(FieldDefect {
                    field: "date",
                    problem: format!("unrecognized date: {:?}", raw),
                });
                None
            }
        },
    };

    let vendor = match draft.vendor.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            defects.push(FieldDefect {
                field: "vendor",
                problem: "missing".to_string(),
            });
            None
        }
    };

    let amount = match draft.amount {
        None => {
            defects.push(FieldDefect {
                field: "amount",
                problem: "missing or not a number".to_string(),
            });
            None
        }
        Some(a) if !a.is_finite() => {
            defects.push(FieldDefect {
                field: "amount",
                problem: "not a finite number".to_string(),
            });
            None
        }
        Some(a) if a < 0.0 => {
            defects.push(FieldDefect {
                field: "amount",
                problem: format!("negative: {}", a),
            });
            None
        }
        Some(a) => Some(a),
    };

    let description = match draft.description.clone() {
        Some(d) => Some(d),
        None => {
            defects.push(FieldDefect {
                field: "description",
                problem: "missing".to_string(),
            });
            None
        }
    };

    let issuer = match draft.issuer.as_deref().map(str::trim) {
        Some(i) if !i.is_empty() => Some(i.to_string()),
        _ => {
            defects.push(FieldDefect {
                field: "issuer",
                problem: "missing".to_string(),
            });
            None
        }
    };

    if !defects.is_empty() {
        return Err(ValidationError { defects });
    }

    // All unwraps guarded by the defect check above
    let mut receipt = Receipt::new(
        date.unwrap(),
        vendor.unwrap(),
        amount.unwrap(),
        description.unwrap(),
        issuer.unwrap(),
    );
    receipt.recipient = draft
        .recipient
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from);
    receipt.has_revenue_stamp = draft.has_revenue_stamp;

    Ok(receipt)
}
