use std::{cell::RefCell, collections::BTreeMap, fmt, str::FromStr};

use anyhow::Result as AnyResult;
use chrono::{Datelike, Months, NaiveDate};
use getset::{CopyGetters, Getters};
use rust_decimal::prelude::*;
use serde::Serialize;

use crate::{
    errors::{LedgerError, Result},
    models::{ExpenseRecord, LedgerEntry, LedgerSnapshot},
    traits::{CSVExport, CSVWrite},
};

/// A calendar month used as the reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, CopyGetters)]
pub struct PeriodKey {
    #[getset(get_copy = "pub")]
    year: i32,
    #[getset(get_copy = "pub")]
    month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        let key = PeriodKey { year, month };
        match NaiveDate::from_ymd_opt(year, month, 1) {
            Some(_) => Ok(key),
            None => Err(LedgerError::InvalidPeriod { year, month }),
        }
    }

    /// The period a date falls in.
    pub fn containing(date: NaiveDate) -> Self {
        PeriodKey {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // Validated on construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let first = self.first_day();
        first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// True when `date` is the final calendar day of this period.
    pub fn is_last_day(&self, date: NaiveDate) -> bool {
        date == self.last_day()
    }

    pub fn succ(&self) -> Self {
        Self::containing(self.last_day().succ_opt().unwrap_or(NaiveDate::MAX))
    }

    pub fn pred(&self) -> Self {
        Self::containing(self.first_day().pred_opt().unwrap_or(NaiveDate::MIN))
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LedgerError::InvalidPeriodFormat(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        PeriodKey::new(year, month)
    }
}

/// Keeps the entries dated inside `key`, in snapshot order.
pub fn filter_period(snapshot: &LedgerSnapshot, key: PeriodKey) -> Vec<&LedgerEntry> {
    snapshot
        .iter()
        .filter(|entry| key.contains(entry.record().date()))
        .collect()
}

/// Totals derived from a set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters, CopyGetters)]
pub struct PeriodSummary {
    #[getset(get_copy = "pub")]
    total: Decimal,
    #[getset(get_copy = "pub")]
    count: usize,
    #[getset(get = "pub")]
    by_category: BTreeMap<String, Decimal>,
    #[getset(get = "pub")]
    by_day: Vec<(NaiveDate, Decimal)>,
}

impl PeriodSummary {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fraction of the total spent in `category`, or `None` when nothing was spent.
    pub fn category_share(&self, category: &str) -> Option<Decimal> {
        if self.total.is_zero() {
            return None;
        }
        let subtotal = self.by_category.get(category).copied().unwrap_or_default();
        subtotal.checked_div(self.total)
    }

    /// Categories ordered by subtotal, largest first; ties keep name order.
    pub fn ranked_categories(&self) -> Vec<(&str, Decimal)> {
        let mut ranked: Vec<(&str, Decimal)> = self
            .by_category
            .iter()
            .map(|(label, amount)| (label.as_str(), *amount))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

/// Sums the records overall, per category and per day.
pub fn summarize<'a, I>(records: I) -> Result<PeriodSummary>
where
    I: IntoIterator<Item = &'a ExpenseRecord>,
{
    let mut total = Decimal::ZERO;
    let mut count = 0;
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut by_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();

    for record in records {
        let amount = record.amount();
        total = total
            .checked_add(amount)
            .ok_or(LedgerError::ValueOverflow)?;
        count += 1;

        let subtotal = by_category.entry(record.category().clone()).or_default();
        *subtotal = subtotal
            .checked_add(amount)
            .ok_or(LedgerError::ValueOverflow)?;

        let daily = by_day.entry(record.date()).or_default();
        *daily = daily.checked_add(amount).ok_or(LedgerError::ValueOverflow)?;
    }

    Ok(PeriodSummary {
        total,
        count,
        by_category,
        by_day: by_day.into_iter().collect(),
    })
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    kind: &'static str,
    key: &'a str,
    #[serde(serialize_with = "two_decimals")]
    amount: Decimal,
}

fn two_decimals<S>(x: &Decimal, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&format!("{:.2}", x.round_dp(2)))
}

impl CSVExport for PeriodSummary {
    fn export(&self, writer: RefCell<&mut impl CSVWrite>) -> AnyResult<()> {
        writer.borrow_mut().write_record(&SummaryRow {
            kind: "total",
            key: "",
            amount: self.total,
        })?;
        for (category, amount) in &self.by_category {
            writer.borrow_mut().write_record(&SummaryRow {
                kind: "category",
                key: category,
                amount: *amount,
            })?;
        }
        for (date, amount) in &self.by_day {
            let key = date.to_string();
            writer.borrow_mut().write_record(&SummaryRow {
                kind: "day",
                key: &key,
                amount: *amount,
            })?;
        }
        Ok(())
    }
}

/// A period's entries and summary, tied to the snapshot revision they came from.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct PeriodReport {
    #[getset(get_copy = "pub")]
    key: PeriodKey,
    #[getset(get_copy = "pub")]
    revision: u64,
    #[getset(get = "pub")]
    entries: Vec<LedgerEntry>,
    #[getset(get = "pub")]
    summary: PeriodSummary,
}

impl PeriodReport {
    pub fn compute(snapshot: &LedgerSnapshot, key: PeriodKey) -> Result<Self> {
        let entries: Vec<LedgerEntry> = filter_period(snapshot, key).into_iter().cloned().collect();
        let summary = summarize(entries.iter().map(LedgerEntry::record))?;
        Ok(PeriodReport {
            key,
            revision: snapshot.revision(),
            entries,
            summary,
        })
    }

    /// False once the store has moved past the snapshot this report was built from.
    pub fn is_current(&self, snapshot: &LedgerSnapshot) -> bool {
        self.revision == snapshot.revision()
    }
}

impl CSVExport for PeriodReport {
    fn export(&self, writer: RefCell<&mut impl CSVWrite>) -> AnyResult<()> {
        for entry in &self.entries {
            writer.borrow_mut().write_record(&entry.row())?;
        }
        Ok(())
    }
}

impl CSVExport for LedgerSnapshot {
    fn export(&self, writer: RefCell<&mut impl CSVWrite>) -> AnyResult<()> {
        for entry in self {
            writer.borrow_mut().write_record(&entry.row())?;
        }
        Ok(())
    }
}
