//! Spend report generation and CSV export.
//!
//! Aggregates stored receipts into monthly and annual summaries and writes
//! CSV exports with a UTF-8 BOM so spreadsheet applications detect the
//! encoding of the Japanese headers.

use chrono::Datelike;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::models::Receipt;

/// CSV column headers, matching the receipt fields operators review.
const CSV_HEADERS: &[&str] = &["日付", "取引先", "金額", "内容", "発行者", "宛名", "収入印紙"];

/// Monthly spend summary.
#[derive(Debug)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    /// Total spend across the month.
    pub total: f64,
    /// Number of transactions.
    pub count: usize,
    /// Per-vendor totals, largest first.
    pub vendor_totals: Vec<(String, f64)>,
    /// The receipts in the period, newest first.
    pub receipts: Vec<Receipt>,
}

impl MonthlySummary {
    /// Period label, e.g. `2024年1月`.
    pub fn period(&self) -> String {
        format!("{}年{}月", self.year, self.month)
    }
}

/// Annual spend summary.
#[derive(Debug)]
pub struct AnnualSummary {
    pub year: i32,
    /// Total spend across the year.
    pub total: f64,
    /// Number of transactions.
    pub count: usize,
    /// Per-month totals for months with any spend.
    pub monthly_totals: BTreeMap<u32, f64>,
    /// Per-vendor totals, largest first.
    pub vendor_totals: Vec<(String, f64)>,
}

/// Generates reports over a set of receipts.
pub struct ReportGenerator {
    receipts: Vec<Receipt>,
}

impl ReportGenerator {
    pub fn new(receipts: Vec<Receipt>) -> Self {
        Self { receipts }
    }

    /// Summarize one month.
    pub fn monthly(&self, year: i32, month: u32) -> MonthlySummary {
        let selected: Vec<Receipt> = self
            .receipts
            .iter()
            .filter(|r| r.date.year() == year && r.date.month() == month)
            .cloned()
            .collect();

        MonthlySummary {
            year,
            month,
            total: selected.iter().map(|r| r.amount).sum(),
            count: selected.len(),
            vendor_totals: vendor_totals(&selected),
            receipts: selected,
        }
    }

    /// Summarize one year.
    pub fn annual(&self, year: i32) -> AnnualSummary {
        let selected: Vec<&Receipt> = self
            .receipts
            .iter()
            .filter(|r| r.date.year() == year)
            .collect();

        let mut monthly_totals: BTreeMap<u32, f64> = BTreeMap::new();
        for receipt in &selected {
            *monthly_totals.entry(receipt.date.month()).or_insert(0.0) += receipt.amount;
        }

        let owned: Vec<Receipt> = selected.iter().map(|r| (*r).clone()).collect();

        AnnualSummary {
            year,
            total: selected.iter().map(|r| r.amount).sum(),
            count: selected.len(),
            monthly_totals,
            vendor_totals: vendor_totals(&owned),
        }
    }

    /// Export all receipts as CSV.
    ///
    /// The file starts with a UTF-8 BOM; the stamp column renders 有/無 and
    /// stays empty when the source gave no evidence either way.
    pub fn export_csv(&self, path: &Path) -> csv::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(b"\xEF\xBB\xBF")?;
        self.write_csv(&mut file)
    }

    /// Write CSV rows to any writer (no BOM).
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(CSV_HEADERS)?;

        for receipt in &self.receipts {
            let stamp = match receipt.has_revenue_stamp {
                Some(true) => "有",
                Some(false) => "無",
                None => "",
            };
            csv_writer.write_record([
                receipt.date.format("%Y-%m-%d").to_string().as_str(),
                receipt.vendor.as_str(),
                format_amount(receipt.amount).as_str(),
                receipt.description.as_str(),
                receipt.issuer.as_str(),
                receipt.recipient.as_deref().unwrap_or(""),
                stamp,
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

/// Per-vendor totals, largest first, ties broken by vendor name.
fn vendor_totals(receipts: &[Receipt]) -> Vec<(String, f64)> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for receipt in receipts {
        *totals.entry(receipt.vendor.clone()).or_insert(0.0) += receipt.amount;
    }
    let mut sorted: Vec<(String, f64)> = totals.into_iter().collect();
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Render an amount without a trailing `.0` for whole yen.
fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{}", amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn receipt(vendor: &str, date: (i32, u32, u32), amount: f64) -> Receipt {
        Receipt::new(
            NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            vendor.to_string(),
            amount,
            "消耗品".to_string(),
            vendor.to_string(),
        )
    }

    fn sample_set() -> Vec<Receipt> {
        vec![
            receipt("文具店", (2024, 1, 10), 1000.0),
            receipt("文具店", (2024, 1, 25), 500.0),
            receipt("書店", (2024, 1, 30), 2000.0),
            receipt("書店", (2024, 3, 5), 1500.0),
            receipt("文具店", (2023, 12, 28), 700.0),
        ]
    }

    #[test]
    fn test_monthly_summary() {
        let gen = ReportGenerator::new(sample_set());
        let summary = gen.monthly(2024, 1);

        assert_eq!(summary.period(), "2024年1月");
        assert_eq!(summary.count, 3);
        assert_eq!(summary.total, 3500.0);
        assert_eq!(
            summary.vendor_totals,
            vec![("書店".to_string(), 2000.0), ("文具店".to_string(), 1500.0)]
        );
    }

    #[test]
    fn test_monthly_summary_empty_month() {
        let gen = ReportGenerator::new(sample_set());
        let summary = gen.monthly(2024, 7);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.total, 0.0);
        assert!(summary.vendor_totals.is_empty());
    }

    #[test]
    fn test_annual_summary() {
        let gen = ReportGenerator::new(sample_set());
        let summary = gen.annual(2024);

        assert_eq!(summary.count, 4);
        assert_eq!(summary.total, 5000.0);
        assert_eq!(summary.monthly_totals.get(&1), Some(&3500.0));
        assert_eq!(summary.monthly_totals.get(&3), Some(&1500.0));
        assert!(!summary.monthly_totals.contains_key(&12));
        assert_eq!(summary.vendor_totals[0].0, "書店");
    }

    #[test]
    fn test_csv_export_bom_and_headers() {
        let mut receipts = vec![receipt("文具店", (2024, 1, 10), 1000.0)];
        receipts[0].has_revenue_stamp = Some(true);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        ReportGenerator::new(receipts).export_csv(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], b"\xEF\xBB\xBF");

        let content = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "日付,取引先,金額,内容,発行者,宛名,収入印紙");
        assert_eq!(lines.next().unwrap(), "2024-01-10,文具店,1000,消耗品,文具店,,有");
    }

    #[test]
    fn test_csv_unknown_stamp_renders_empty() {
        let receipts = vec![receipt("文具店", (2024, 1, 10), 1000.0)];
        let mut buf = Vec::new();
        ReportGenerator::new(receipts).write_csv(&mut buf).unwrap();
        let content = String::from_utf8(buf).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert!(row.ends_with(",,"), "stamp column not empty: {}", row);
        assert!(!row.contains("無"));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1000.0), "1000");
        assert_eq!(format_amount(1234.5), "1234.5");
    }
}
