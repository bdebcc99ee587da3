//! Domain models.

mod receipt;

pub use receipt::{Receipt, ReceiptDraft, ReceiptPatch};
