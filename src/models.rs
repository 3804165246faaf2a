use std::{fmt, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use getset::{CopyGetters, Getters};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Column names of the backing file, in write order.
pub const HEADER: [&str; 5] = ["Date", "Category", "Amount", "Note", "Id"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

fn display_amount<S>(x: &Decimal, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&x.to_string())
}

/// Stable identity of a ledger entry, assigned by the store at append time.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub const fn new(value: u64) -> Self {
        RecordId(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        RecordId(self.0.saturating_add(1))
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One expense as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct ExpenseRecord {
    #[getset(get_copy = "pub")]
    date: NaiveDate,
    #[getset(get = "pub")]
    category: String,
    #[getset(get_copy = "pub")]
    amount: Decimal,
    #[getset(get = "pub")]
    note: String,
}

impl ExpenseRecord {
    pub fn new(
        date: NaiveDate,
        category: impl Into<String>,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Self {
        ExpenseRecord {
            date,
            category: category.into(),
            amount,
            note: note.into(),
        }
    }

    /// Checks the field invariants a record must satisfy before it is stored.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(ValidationError::NegativeAmount(self.amount));
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::EmptyCategory);
        }
        Ok(())
    }
}

/// A record together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct LedgerEntry {
    #[getset(get_copy = "pub")]
    id: RecordId,
    #[getset(get = "pub")]
    record: ExpenseRecord,
}

impl LedgerEntry {
    pub fn new(id: RecordId, record: ExpenseRecord) -> Self {
        LedgerEntry { id, record }
    }

    pub fn into_record(self) -> ExpenseRecord {
        self.record
    }

    pub fn row(&self) -> EntryRow<'_> {
        EntryRow {
            date: self.record.date,
            category: &self.record.category,
            amount: self.record.amount,
            note: &self.record.note,
            id: self.id,
        }
    }
}

/// Serialized shape of an entry, one CSV row.
#[derive(Debug, Serialize)]
pub struct EntryRow<'a> {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Category")]
    category: &'a str,
    #[serde(rename = "Amount", serialize_with = "display_amount")]
    amount: Decimal,
    #[serde(rename = "Note")]
    note: &'a str,
    #[serde(rename = "Id")]
    id: RecordId,
}

/// Immutable, cheaply cloned view of the ledger at one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    entries: Arc<Vec<LedgerEntry>>,
    revision: u64,
}

impl LedgerSnapshot {
    pub fn new(entries: Vec<LedgerEntry>, revision: u64) -> Self {
        LedgerSnapshot {
            entries: Arc::new(entries),
            revision,
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LedgerEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LedgerEntry> {
        self.entries.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &ExpenseRecord> {
        self.entries.iter().map(LedgerEntry::record)
    }

    /// Incremented on every successful mutation of the owning store.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn position_of(&self, id: RecordId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn find(&self, id: RecordId) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

impl<'a> IntoIterator for &'a LedgerSnapshot {
    type Item = &'a LedgerEntry;
    type IntoIter = std::slice::Iter<'a, LedgerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A row dropped during load, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: String,
}

/// Result of a load: the snapshot plus the rows that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub snapshot: LedgerSnapshot,
    pub skipped_rows: Vec<SkippedRow>,
    /// True when the backing file did not exist and was created by this load.
    pub created: bool,
}

impl LoadReport {
    pub fn skipped(&self) -> usize {
        self.skipped_rows.len()
    }
}

/// Parses a calendar date from any of the layouts the ledger file has been seen with.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    {
        return Some(date);
    }
    if let Some(dt) = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(dt.date());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Parses a decimal amount, accepting scientific notation as a fallback.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}
