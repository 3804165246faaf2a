use anyhow::{Result, anyhow};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use expense_ledger::{
    ExpenseRecord, LedgerStore, PeriodKey, PeriodReport, RecordId,
    config::Config,
    csv_writer::StdOutCSVWriter,
    digest::{self, DigestOutcome, StdoutSink},
    models::parse_date,
    traits::CSVExport,
};

const DEFAULT_LOG_DIRECTIVE: &str = "expense_ledger=info";

#[derive(Parser)]
#[command(name = "expense-ledger", about = "Track monthly expenses in a CSV file")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ledger file, overrides `ledger_path` from the configuration
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new expense
    Add {
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        category: String,
        /// Defaults to today
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Print entries as CSV
    List {
        /// Restrict to one month, YYYY-MM
        #[arg(long)]
        period: Option<PeriodKey>,
    },
    /// Remove an entry
    Delete {
        #[arg(long, conflicts_with = "index", required_unless_present = "index")]
        id: Option<u64>,
        /// Position in the full listing, starting at 0
        #[arg(long)]
        index: Option<usize>,
    },
    /// Print a month's totals as CSV
    Summary {
        #[arg(long)]
        period: Option<PeriodKey>,
    },
    /// Send the month-end digest
    Digest {
        #[arg(long)]
        period: Option<PeriodKey>,
        /// Send even if today is not the last day of the period
        #[arg(long)]
        force: bool,
    },
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("invalid date `{raw}`, expected YYYY-MM-DD"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let path = cli.file.unwrap_or_else(|| config.ledger_path.clone());
    let store = LedgerStore::open(&path);

    let report = store.load()?;
    if report.skipped() > 0 {
        for row in &report.skipped_rows {
            warn!(line = row.line, reason = %row.reason, "row ignored");
        }
    }
    let snapshot = report.snapshot;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Add {
            amount,
            category,
            date,
            note,
        } => {
            if !config.is_known_category(&category) {
                warn!(%category, "category is not in the configured list");
            }
            let record = ExpenseRecord::new(date.unwrap_or(today), category, amount, note);
            let snapshot = store.append(record)?;
            info!(entries = snapshot.len(), "saved");
        }
        Commands::List { period } => {
            let mut writer = StdOutCSVWriter::new();
            match period {
                Some(key) => PeriodReport::compute(&snapshot, key)?.export(RefCell::new(&mut writer))?,
                None => snapshot.export(RefCell::new(&mut writer))?,
            }
        }
        Commands::Delete { id, index } => {
            let snapshot = match (id, index) {
                (Some(id), _) => store.delete_by_id(RecordId::new(id))?,
                (None, Some(index)) => store.delete_at(&snapshot, index)?,
                (None, None) => Err(anyhow!("either --id or --index is required"))?,
            };
            info!(entries = snapshot.len(), "deleted");
        }
        Commands::Summary { period } => {
            let key = period.unwrap_or_else(|| PeriodKey::containing(today));
            let report = PeriodReport::compute(&snapshot, key)?;
            let mut writer = StdOutCSVWriter::new();
            report.summary().export(RefCell::new(&mut writer))?;
        }
        Commands::Digest { period, force } => {
            let key = period.unwrap_or_else(|| PeriodKey::containing(today));
            let report = PeriodReport::compute(&snapshot, key)?;
            if !config.digest.should_run(force) {
                info!("digest disabled in configuration");
                return Ok(());
            }
            let any_day = config.digest.any_day(force);
            let mut sink = StdoutSink;
            match digest::dispatch(&mut sink, &report, today, &config.currency_symbol, any_day) {
                DigestOutcome::Sent | DigestOutcome::NotDue => {}
                DigestOutcome::Failed(reason) => warn!(%reason, "digest not sent"),
            }
        }
    }

    Ok(())
}
