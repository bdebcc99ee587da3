//! Repository layer for SQLite persistence.

mod receipt;

pub use receipt::{ReceiptFilter, ReceiptRepository};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, rusqlite::Error>;

/// Open a connection with the pragmas every repository relies on.
fn connect(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
