//! Monthly expense ledger: a CSV-backed store of expense records plus the
//! per-month views and summaries computed from it.

pub mod backend;
mod codec;
pub mod config;
pub mod csv_writer;
pub mod digest;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod period;
pub mod traits;

pub use backend::{FileBackend, MemoryBackend};
pub use errors::{LedgerError, ValidationError};
pub use ledger::LedgerStore;
pub use models::{ExpenseRecord, LedgerEntry, LedgerSnapshot, LoadReport, RecordId, SkippedRow};
pub use period::{PeriodKey, PeriodReport, PeriodSummary, filter_period, summarize};
