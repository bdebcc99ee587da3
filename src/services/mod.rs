//! Service layer.
//!
//! Business logic separated from CLI concerns: the document-to-record
//! pipeline and report generation.

mod process;
mod report;

pub use process::{ProcessError, ProcessedReceipt, ReceiptPipeline};
pub use report::{AnnualSummary, MonthlySummary, ReportGenerator};
