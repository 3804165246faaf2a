use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    models::LedgerEntry,
    period::{PeriodKey, PeriodReport, PeriodSummary},
    traits::DigestSink,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestOutcome {
    Sent,
    /// Not the last day of the period and the send was not forced.
    NotDue,
    /// The sink refused the message; the ledger is unaffected.
    Failed(String),
}

fn money(currency: &str, amount: Decimal) -> String {
    format!("{currency}{:.2}", amount.round_dp(2))
}

/// Renders the month-end message for a period. Amounts are rounded half to
/// even at the cent.
pub fn compose(
    key: PeriodKey,
    summary: &PeriodSummary,
    entries: &[LedgerEntry],
    currency: &str,
) -> String {
    let mut out = format!(
        "Expense summary for {key}\nTotal: {}\n",
        money(currency, summary.total())
    );

    if summary.is_empty() {
        out.push_str("No expenses recorded.\n");
        return out;
    }

    out.push_str("\nBy category:\n");
    for (category, amount) in summary.ranked_categories() {
        out.push_str(&format!("- {category}: {}\n", money(currency, amount)));
    }

    out.push_str("\nEntries:\n");
    for entry in entries {
        let record = entry.record();
        out.push_str(&format!(
            "{} {} {}",
            record.date(),
            record.category(),
            money(currency, record.amount())
        ));
        if !record.note().is_empty() {
            out.push_str(&format!(" ({})", record.note()));
        }
        out.push('\n');
    }
    out
}

/// Sends the digest for `report` when `today` closes its period, or always when
/// `force` is set. Sink failures are reported in the outcome and never raised.
pub fn dispatch(
    sink: &mut impl DigestSink,
    report: &PeriodReport,
    today: NaiveDate,
    currency: &str,
    force: bool,
) -> DigestOutcome {
    let key = report.key();
    if !force && !key.is_last_day(today) {
        info!(period = %key, %today, "digest not due");
        return DigestOutcome::NotDue;
    }

    let message = compose(key, report.summary(), report.entries(), currency);
    match sink.deliver(&message) {
        Ok(()) => {
            info!(period = %key, "digest delivered");
            DigestOutcome::Sent
        }
        Err(err) => {
            warn!(period = %key, %err, "digest delivery failed");
            DigestOutcome::Failed(err.to_string())
        }
    }
}

/// Prints digests to standard output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl DigestSink for StdoutSink {
    fn deliver(&mut self, message: &str) -> anyhow::Result<()> {
        print!("{message}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::LedgerStore,
        models::{ExpenseRecord, LedgerSnapshot},
    };
    use anyhow::{Result, anyhow, bail};
    use rust_decimal::prelude::*;

    #[derive(Default)]
    struct RecordingSink {
        messages: Vec<String>,
        fail: bool,
    }

    impl DigestSink for RecordingSink {
        fn deliver(&mut self, message: &str) -> Result<()> {
            if self.fail {
                bail!("bot unreachable");
            }
            self.messages.push(message.to_string());
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d).ok_or(anyhow!("bad date"))
    }

    fn march_store() -> Result<(LedgerStore, LedgerSnapshot)> {
        let store = LedgerStore::in_memory();
        store.load()?;
        store.append(ExpenseRecord::new(date(2024, 3, 1)?, "Food", dec!(10), "lunch"))?;
        store.append(ExpenseRecord::new(date(2024, 3, 1)?, "Rent", dec!(50), ""))?;
        let snapshot = store.append(ExpenseRecord::new(date(2024, 3, 2)?, "Food", dec!(5), ""))?;
        Ok((store, snapshot))
    }

    #[test]
    fn test_compose_lists_categories_by_amount() -> Result<()> {
        let (_, snapshot) = march_store()?;
        let report = PeriodReport::compute(&snapshot, PeriodKey::new(2024, 3)?)?;
        let text = compose(report.key(), report.summary(), report.entries(), "$");

        assert!(text.starts_with("Expense summary for 2024-03\nTotal: $65.00\n"));
        let rent = text.find("- Rent: $50.00").ok_or(anyhow!("rent line"))?;
        let food = text.find("- Food: $15.00").ok_or(anyhow!("food line"))?;
        assert!(rent < food);
        assert!(text.contains("2024-03-01 Food $10.00 (lunch)"));
        Ok(())
    }

    #[test]
    fn test_compose_empty_period() -> Result<()> {
        let report = PeriodReport::compute(&LedgerSnapshot::default(), PeriodKey::new(2024, 4)?)?;
        let text = compose(report.key(), report.summary(), report.entries(), "€");
        assert_eq!(text, "Expense summary for 2024-04\nTotal: €0.00\nNo expenses recorded.\n");
        Ok(())
    }

    #[test]
    fn test_compose_rounds_sub_cent_amounts() -> Result<()> {
        let store = LedgerStore::in_memory();
        store.load()?;
        store.append(ExpenseRecord::new(date(2024, 3, 5)?, "Food", dec!(1.235), ""))?;
        let snapshot = store.append(ExpenseRecord::new(date(2024, 3, 6)?, "Food", dec!(2.999), ""))?;
        let report = PeriodReport::compute(&snapshot, PeriodKey::new(2024, 3)?)?;
        let text = compose(report.key(), report.summary(), report.entries(), "$");

        assert!(text.contains("Total: $4.23\n"));
        assert!(text.contains("- Food: $4.23\n"));
        assert!(text.contains("2024-03-05 Food $1.24\n"));
        assert!(text.contains("2024-03-06 Food $3.00\n"));
        Ok(())
    }

    #[test]
    fn test_dispatch_only_on_last_day() -> Result<()> {
        let (_, snapshot) = march_store()?;
        let report = PeriodReport::compute(&snapshot, PeriodKey::new(2024, 3)?)?;
        let mut sink = RecordingSink::default();

        assert_eq!(
            dispatch(&mut sink, &report, date(2024, 3, 30)?, "$", false),
            DigestOutcome::NotDue
        );
        assert!(sink.messages.is_empty());

        assert_eq!(
            dispatch(&mut sink, &report, date(2024, 3, 31)?, "$", false),
            DigestOutcome::Sent
        );
        assert_eq!(
            dispatch(&mut sink, &report, date(2024, 3, 2)?, "$", true),
            DigestOutcome::Sent
        );
        assert_eq!(sink.messages.len(), 2);
        Ok(())
    }

    #[test]
    fn test_failed_delivery_leaves_ledger_alone() -> Result<()> {
        let (store, snapshot) = march_store()?;
        let report = PeriodReport::compute(&snapshot, PeriodKey::new(2024, 3)?)?;
        let mut sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };

        let outcome = dispatch(&mut sink, &report, date(2024, 3, 31)?, "$", false);
        assert_eq!(outcome, DigestOutcome::Failed("bot unreachable".to_string()));
        assert_eq!(store.snapshot(), snapshot);
        Ok(())
    }
}
