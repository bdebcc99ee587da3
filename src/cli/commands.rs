//! CLI commands implementation.

use std::path::{Path, PathBuf};

use chrono::Datelike;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{load_settings, LoadOptions, Settings};
use crate::models::ReceiptPatch;
use crate::ocr::{check_binary, NeuralEngine, OcrEngine, TesseractEngine};
use crate::repository::{ReceiptFilter, ReceiptRepository};
use crate::services::{ProcessError, ReceiptPipeline, ReportGenerator};
use crate::validate::parse_date;

#[derive(Parser)]
#[command(name = "keihi")]
#[command(about = "Receipt OCR extraction and expense database for tax filing")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Process receipt files (images or PDFs) and store the extracted records
    Ingest {
        /// Receipt files to process
        files: Vec<PathBuf>,
        /// Extract and print without storing
        #[arg(long)]
        dry_run: bool,
        /// Print the raw OCR text alongside the record
        #[arg(long)]
        show_text: bool,
    },

    /// List stored receipts
    Ls {
        /// Limit number of results
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show one receipt in full
    Show {
        /// Receipt ID
        id: i64,
        /// Include the raw OCR text
        #[arg(long)]
        text: bool,
    },

    /// Edit fields of a stored receipt
    Edit {
        /// Receipt ID
        id: i64,
        /// Transaction date (e.g. 2024-01-15 or 2024年1月15日)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        issuer: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
        /// Revenue stamp present (true/false)
        #[arg(long)]
        stamp: Option<bool>,
    },

    /// Delete a receipt
    Rm {
        /// Receipt ID
        id: i64,
        /// Skip confirmation prompt
        #[arg(long)]
        confirm: bool,
    },

    /// Search receipts by date range, vendor, or amount
    Search {
        /// Earliest date, inclusive
        #[arg(long)]
        from: Option<String>,
        /// Latest date, inclusive
        #[arg(long)]
        to: Option<String>,
        /// Vendor substring (case-insensitive)
        #[arg(long)]
        vendor: Option<String>,
        /// Minimum amount
        #[arg(long)]
        min: Option<f64>,
        /// Maximum amount
        #[arg(long)]
        max: Option<f64>,
    },

    /// Generate spend reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Export all receipts as CSV (UTF-8 with BOM)
    Export {
        /// Output file path
        output: PathBuf,
    },

    /// Check if required OCR tools and credentials are available
    OcrCheck,

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Monthly spend summary
    Monthly {
        year: i32,
        month: u32,
        /// Also export the month's receipts as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Annual spend summary
    Annual {
        year: i32,
        /// Also export the year's receipts as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(LoadOptions {
        config_path: cli.config.clone(),
        data_dir: cli.data_dir.clone(),
    });

    match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::Ingest {
            files,
            dry_run,
            show_text,
        } => cmd_ingest(&settings, &files, dry_run, show_text).await,
        Commands::Ls { limit, format } => cmd_ls(&settings, limit, &format),
        Commands::Show { id, text } => cmd_show(&settings, id, text),
        Commands::Edit {
            id,
            date,
            vendor,
            amount,
            description,
            issuer,
            recipient,
            stamp,
        } => cmd_edit(
            &settings,
            id,
            date.as_deref(),
            vendor,
            amount,
            description,
            issuer,
            recipient,
            stamp,
        ),
        Commands::Rm { id, confirm } => cmd_rm(&settings, id, confirm),
        Commands::Search {
            from,
            to,
            vendor,
            min,
            max,
        } => cmd_search(&settings, from.as_deref(), to.as_deref(), vendor, min, max),
        Commands::Report { command } => match command {
            ReportCommands::Monthly { year, month, csv } => {
                cmd_report_monthly(&settings, year, month, csv.as_deref())
            }
            ReportCommands::Annual { year, csv } => {
                cmd_report_annual(&settings, year, csv.as_deref())
            }
        },
        Commands::Export { output } => cmd_export(&settings, &output),
        Commands::OcrCheck => cmd_ocr_check(&settings),
        Commands::Status => cmd_status(&settings),
    }
}

fn open_repository(settings: &Settings) -> anyhow::Result<ReceiptRepository> {
    if !settings.database_exists() {
        anyhow::bail!("Database not initialized. Run 'keihi init' first.");
    }
    Ok(ReceiptRepository::new(&settings.database_path())?)
}

fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let _repo = ReceiptRepository::new(&settings.database_path())?;

    println!(
        "{} Initialized keihi in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    if settings.llm.api_key.is_none() {
        println!(
            "{} GEMINI_API_KEY is not set; 'keihi ingest' will refuse to run until it is",
            style("!").yellow()
        );
    }

    Ok(())
}

async fn cmd_ingest(
    settings: &Settings,
    files: &[PathBuf],
    dry_run: bool,
    show_text: bool,
) -> anyhow::Result<()> {
    if files.is_empty() {
        println!("{} No files given", style("✗").red());
        return Ok(());
    }

    let repo = if dry_run {
        None
    } else {
        settings.ensure_directories()?;
        Some(ReceiptRepository::new(&settings.database_path())?)
    };

    // Credential check happens here, before any file is touched
    let pipeline = ReceiptPipeline::with_defaults(
        settings.engine_config(),
        settings.llm.clone(),
        settings.ocr.raster_dpi,
    )
    .map_err(|e| anyhow::anyhow!("{}", e))?;

    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for file in files {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message(format!("Processing {}...", file.display()));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let result = pipeline.process_document(file).await;
        pb.finish_and_clear();

        match result {
            Ok(mut processed) => {
                if show_text {
                    println!("{}", style("--- OCR text ---").dim());
                    println!("{}", processed.raw_text);
                    println!("{}", style("----------------").dim());
                }

                if let Some(ref repo) = repo {
                    // Keep a copy of the source file with the record
                    match store_receipt_file(settings, file) {
                        Ok(stored) => processed.receipt.file_path = Some(stored),
                        Err(e) => tracing::warn!("Could not copy {}: {}", file.display(), e),
                    }
                    let id = repo.add(&processed.receipt)?;
                    processed.receipt.id = id;
                    println!(
                        "{} {} → #{} {} {} ¥{}",
                        style("✓").green(),
                        file.display(),
                        id,
                        processed.receipt.date,
                        processed.receipt.vendor,
                        processed.receipt.amount
                    );
                } else {
                    println!("{} {} (dry run)", style("✓").green(), file.display());
                    print_receipt(&processed.receipt, false);
                }
                succeeded += 1;
            }
            Err(e) => {
                failed += 1;
                print_process_error(file, &e);
            }
        }
    }

    if files.len() > 1 {
        println!(
            "\n{} {} processed, {} failed",
            style("→").cyan(),
            succeeded,
            failed
        );
    }

    if failed > 0 {
        anyhow::bail!("{} file(s) failed", failed);
    }
    Ok(())
}

/// Explain a pipeline failure, distinguishing retryable service faults.
fn print_process_error(file: &Path, error: &ProcessError) {
    println!("{} {}: {}", style("✗").red(), file.display(), error);
    match error {
        ProcessError::Structuring(e) if e.is_retryable() => {
            println!(
                "  {} transient service fault; retry with 'keihi ingest {}'",
                style("→").dim(),
                file.display()
            );
        }
        ProcessError::Structuring(_) => {
            println!(
                "  {} run with --show-text to review the OCR output manually",
                style("→").dim()
            );
        }
        ProcessError::Validation(_) => {
            println!(
                "  {} the receipt was read but required fields are missing; fix the scan or enter it manually",
                style("→").dim()
            );
        }
        _ => {}
    }
}

/// Copy an ingested file into the receipts directory.
fn store_receipt_file(settings: &Settings, file: &Path) -> std::io::Result<PathBuf> {
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "receipt".to_string());

    let mut dest = settings.receipts_dir.join(&filename);
    let mut counter = 1u32;
    while dest.exists() {
        dest = settings.receipts_dir.join(format!("{}-{}", counter, filename));
        counter += 1;
    }

    std::fs::copy(file, &dest)?;
    Ok(dest)
}

fn cmd_ls(settings: &Settings, limit: usize, format: &str) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let mut receipts = repo.get_all()?;
    receipts.truncate(limit);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&receipts)?);
        return Ok(());
    }

    if receipts.is_empty() {
        println!("{} No receipts stored yet", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Receipts").bold());
    println!("{}", "-".repeat(72));
    println!(
        "{:<6} {:<12} {:<24} {:>10}  {}",
        "ID", "Date", "Vendor", "Amount", "Description"
    );
    println!("{}", "-".repeat(72));

    for receipt in &receipts {
        println!(
            "{:<6} {:<12} {:<24} {:>10}  {}",
            receipt.id,
            receipt.date.to_string(),
            truncate(&receipt.vendor, 23),
            format!("¥{}", receipt.amount),
            truncate(&receipt.description, 20)
        );
    }

    Ok(())
}

fn cmd_show(settings: &Settings, id: i64, text: bool) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let Some(receipt) = repo.get(id)? else {
        println!("{} Receipt #{} not found", style("✗").red(), id);
        return Ok(());
    };

    print_receipt(&receipt, true);

    if text {
        println!("\n{}", style("OCR text:").bold());
        match receipt.ocr_text {
            Some(ref t) => println!("{}", t),
            None => println!("{}", style("(not stored)").dim()),
        }
    }

    Ok(())
}

fn print_receipt(receipt: &crate::models::Receipt, with_meta: bool) {
    if receipt.id > 0 {
        println!("\n{}", style(format!("Receipt #{}", receipt.id)).bold());
    }
    println!("{:<16} {}", "Date:", receipt.date);
    println!("{:<16} {}", "Vendor:", receipt.vendor);
    println!("{:<16} ¥{}", "Amount:", receipt.amount);
    println!("{:<16} {}", "Description:", receipt.description);
    println!("{:<16} {}", "Issuer:", receipt.issuer);
    if let Some(ref recipient) = receipt.recipient {
        println!("{:<16} {}", "Recipient:", recipient);
    }
    match receipt.has_revenue_stamp {
        Some(true) => println!("{:<16} yes", "Revenue stamp:"),
        Some(false) => println!("{:<16} no", "Revenue stamp:"),
        None => {}
    }
    if with_meta {
        if let Some(ref path) = receipt.file_path {
            println!("{:<16} {}", "File:", path.display());
        }
        println!(
            "{:<16} {}",
            "Added:",
            receipt.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_edit(
    settings: &Settings,
    id: i64,
    date: Option<&str>,
    vendor: Option<String>,
    amount: Option<f64>,
    description: Option<String>,
    issuer: Option<String>,
    recipient: Option<String>,
    stamp: Option<bool>,
) -> anyhow::Result<()> {
    let parsed_date = match date {
        Some(raw) => match parse_date(raw) {
            Some(d) => Some(d),
            None => {
                println!("{} Unrecognized date: {}", style("✗").red(), raw);
                return Ok(());
            }
        },
        None => None,
    };

    if let Some(a) = amount {
        if a < 0.0 {
            println!("{} Amount must be non-negative", style("✗").red());
            return Ok(());
        }
    }

    let patch = ReceiptPatch {
        date: parsed_date,
        vendor,
        amount,
        description,
        issuer,
        recipient,
        has_revenue_stamp: stamp,
    };

    if patch.is_empty() {
        println!("{} Nothing to change", style("!").yellow());
        return Ok(());
    }

    let repo = open_repository(settings)?;
    if repo.update(id, &patch)? {
        println!("{} Updated receipt #{}", style("✓").green(), id);
    } else {
        println!("{} Receipt #{} not found", style("✗").red(), id);
    }

    Ok(())
}

fn cmd_rm(settings: &Settings, id: i64, confirm: bool) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let repo = open_repository(settings)?;
    let Some(receipt) = repo.get(id)? else {
        println!("{} Receipt #{} not found", style("✗").red(), id);
        return Ok(());
    };

    if !confirm {
        print!(
            "Delete #{} {} {} ¥{}? [y/N] ",
            id, receipt.date, receipt.vendor, receipt.amount
        );
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{} Cancelled", style("!").yellow());
            return Ok(());
        }
    }

    repo.delete(id)?;
    println!("{} Deleted receipt #{}", style("✓").green(), id);
    Ok(())
}

fn cmd_search(
    settings: &Settings,
    from: Option<&str>,
    to: Option<&str>,
    vendor: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
) -> anyhow::Result<()> {
    let date_from = match from {
        Some(raw) => match parse_date(raw) {
            Some(d) => Some(d),
            None => {
                println!("{} Unrecognized date: {}", style("✗").red(), raw);
                return Ok(());
            }
        },
        None => None,
    };
    let date_to = match to {
        Some(raw) => match parse_date(raw) {
            Some(d) => Some(d),
            None => {
                println!("{} Unrecognized date: {}", style("✗").red(), raw);
                return Ok(());
            }
        },
        None => None,
    };

    let filter = ReceiptFilter {
        date_from,
        date_to,
        vendor,
        min_amount: min,
        max_amount: max,
    };

    let repo = open_repository(settings)?;
    let results = repo.search(&filter)?;

    if results.is_empty() {
        println!("{} No matching receipts", style("!").yellow());
        return Ok(());
    }

    println!(
        "\n{}",
        style(format!("{} matching receipts", results.len())).bold()
    );
    println!("{}", "-".repeat(72));
    for receipt in &results {
        println!(
            "{:<6} {:<12} {:<24} {:>10}  {}",
            receipt.id,
            receipt.date.to_string(),
            truncate(&receipt.vendor, 23),
            format!("¥{}", receipt.amount),
            truncate(&receipt.description, 20)
        );
    }

    Ok(())
}

fn cmd_report_monthly(
    settings: &Settings,
    year: i32,
    month: u32,
    csv: Option<&Path>,
) -> anyhow::Result<()> {
    if !(1..=12).contains(&month) {
        anyhow::bail!("Month must be 1-12");
    }

    let repo = open_repository(settings)?;
    let generator = ReportGenerator::new(repo.get_all()?);
    let summary = generator.monthly(year, month);

    println!("\n{}", style(format!("Monthly Report: {}", summary.period())).bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} ¥{}", "Total spend:", summary.total);
    println!("{:<20} {}", "Transactions:", summary.count);

    if !summary.vendor_totals.is_empty() {
        println!("\n{}", style("By vendor:").cyan());
        for (vendor, total) in &summary.vendor_totals {
            println!("  {:<26} ¥{}", truncate(vendor, 25), total);
        }
    }

    if let Some(path) = csv {
        ReportGenerator::new(summary.receipts).export_csv(path)?;
        println!("\n{} Exported CSV to {}", style("✓").green(), path.display());
    }

    Ok(())
}

fn cmd_report_annual(settings: &Settings, year: i32, csv: Option<&Path>) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let receipts = repo.get_all()?;
    let generator = ReportGenerator::new(receipts.clone());
    let summary = generator.annual(year);

    println!("\n{}", style(format!("Annual Report: {}年", year)).bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} ¥{}", "Total spend:", summary.total);
    println!("{:<20} {}", "Transactions:", summary.count);

    if !summary.monthly_totals.is_empty() {
        println!("\n{}", style("By month:").cyan());
        for (month, total) in &summary.monthly_totals {
            println!("  {:<26} ¥{}", format!("{}月", month), total);
        }
    }

    if !summary.vendor_totals.is_empty() {
        println!("\n{}", style("By vendor:").cyan());
        for (vendor, total) in &summary.vendor_totals {
            println!("  {:<26} ¥{}", truncate(vendor, 25), total);
        }
    }

    if let Some(path) = csv {
        let year_receipts: Vec<_> = receipts
            .into_iter()
            .filter(|r| r.date.year() == year)
            .collect();
        ReportGenerator::new(year_receipts).export_csv(path)?;
        println!("\n{} Exported CSV to {}", style("✓").green(), path.display());
    }

    Ok(())
}

fn cmd_export(settings: &Settings, output: &Path) -> anyhow::Result<()> {
    let repo = open_repository(settings)?;
    let receipts = repo.get_all()?;
    let count = receipts.len();

    ReportGenerator::new(receipts).export_csv(output)?;
    println!(
        "{} Exported {} receipts to {}",
        style("✓").green(),
        count,
        output.display()
    );
    Ok(())
}

fn cmd_ocr_check(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("OCR Tool Status").bold());
    println!("{}", "-".repeat(50));

    println!("\n{}", style("External tools:").cyan());
    for tool in ["tesseract", "pdftoppm"] {
        let status = if check_binary(tool) {
            style("✓ found").green()
        } else {
            style("✗ not found").red()
        };
        println!("  {:<15} {}", tool, status);
    }

    println!("\n{}", style("Engines:").cyan());

    let tesseract = TesseractEngine::with_config(settings.engine_config());
    let tesseract_status = if tesseract.is_available() {
        style("✓ available").green()
    } else {
        style("✗ not available").red()
    };
    println!("  {:<15} {}", "Tesseract", tesseract_status);
    if !tesseract.is_available() {
        println!("                  {}", style(tesseract.availability_hint()).dim());
    }

    let neural = NeuralEngine::with_config(settings.engine_config());
    println!("  {:<15} {}", "Neural", style("✓ available").green());
    println!("                  {}", style(neural.availability_hint()).dim());

    println!("\n{}", style("Structuring:").cyan());
    if settings.llm.api_key.is_some() {
        println!(
            "  {:<15} {}",
            "Gemini",
            style(format!("✓ configured ({})", settings.llm.model)).green()
        );
    } else {
        println!("  {:<15} {}", "Gemini", style("✗ GEMINI_API_KEY not set").red());
        println!(
            "                  {}",
            style("Get an API key from https://ai.google.dev/").dim()
        );
    }

    Ok(())
}

fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("keihi Status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Data directory:", settings.data_dir.display());

    if !settings.database_exists() {
        println!(
            "{} Database not initialized. Run 'keihi init' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    let repo = ReceiptRepository::new(&settings.database_path())?;
    println!("{:<20} {}", "Receipts:", repo.count()?);

    let receipts = repo.get_all()?;
    if let Some(latest) = receipts.first() {
        println!("{:<20} {}", "Latest:", latest.date);
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
