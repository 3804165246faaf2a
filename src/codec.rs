use std::{collections::HashSet, io};

use csv::{ByteRecord, ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{debug, warn};

use crate::models::{
    ExpenseRecord, HEADER, LedgerEntry, RecordId, SkippedRow, parse_amount, parse_date,
};

/// Rows recovered from a ledger file, before the store takes ownership.
#[derive(Debug, Default)]
pub(crate) struct Decoded {
    pub entries: Vec<LedgerEntry>,
    pub skipped: Vec<SkippedRow>,
    /// Skipped rows, rearranged into the canonical column order, to be written
    /// back untouched on the next rewrite.
    pub preserved: Vec<ByteRecord>,
    /// Highest id handed out, whether read from the file or freshly assigned.
    pub last_id: RecordId,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    date: usize,
    category: usize,
    amount: usize,
    note: Option<usize>,
    id: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let columns = Columns {
            date: find(HEADER[0]).unwrap_or(0),
            category: find(HEADER[1]).unwrap_or(1),
            amount: find(HEADER[2]).unwrap_or(2),
            note: find(HEADER[3]).or(Some(3)),
            id: find(HEADER[4]),
        };
        debug!(?columns, "resolved ledger columns");
        columns
    }

    fn required_width(&self) -> usize {
        self.date.max(self.category).max(self.amount) + 1
    }

    /// Rearranges a raw row into `HEADER` order, leaving absent cells empty.
    fn canonical(&self, row: &ByteRecord) -> ByteRecord {
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or_default();
        ByteRecord::from(vec![
            cell(Some(self.date)),
            cell(Some(self.category)),
            cell(Some(self.amount)),
            cell(self.note),
            cell(self.id),
        ])
    }
}

fn parse_row(row: &StringRecord, columns: &Columns) -> Result<(Option<u64>, ExpenseRecord), String> {
    if row.len() < columns.required_width() {
        return Err(format!(
            "expected at least {} fields, found {}",
            columns.required_width(),
            row.len()
        ));
    }
    let field = |idx: usize| row.get(idx).unwrap_or("");

    let raw_date = field(columns.date);
    let date = parse_date(raw_date).ok_or_else(|| format!("unparseable date `{raw_date}`"))?;

    let raw_amount = field(columns.amount);
    let amount =
        parse_amount(raw_amount).ok_or_else(|| format!("non-numeric amount `{raw_amount}`"))?;

    let note = columns.note.map(field).unwrap_or("");
    let record = ExpenseRecord::new(date, field(columns.category), amount, note);
    record.validate().map_err(|err| err.to_string())?;

    let id = columns
        .id
        .and_then(|idx| row.get(idx))
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|id| *id > 0);

    Ok((id, record))
}

/// Parses the content of a ledger file.
///
/// Content problems never fail the whole decode: offending rows are left out of
/// the entries, reported, and kept verbatim for the next write. Only an
/// underlying read error is returned as an error.
pub(crate) fn decode(bytes: &[u8]) -> io::Result<Decoded> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(err) if err.is_io_error() => return Err(err.into()),
        Err(_) => StringRecord::from(HEADER.to_vec()),
    };
    let columns = Columns::resolve(&headers);

    let mut parsed = Vec::new();
    let mut skipped = Vec::new();
    let mut preserved = Vec::new();
    for result in reader.byte_records() {
        let raw = match result {
            Ok(raw) => raw,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or_default();
                warn!(line, %err, "skipping undecodable ledger row");
                skipped.push(SkippedRow {
                    line,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let line = raw.position().map(|p| p.line()).unwrap_or_default();
        if raw.iter().all(|f| f.trim_ascii().is_empty()) {
            continue;
        }
        let outcome = StringRecord::from_byte_record(raw.clone())
            .map_err(|_| "row is not valid UTF-8".to_string())
            .and_then(|row| parse_row(&row, &columns));
        match outcome {
            Ok(item) => parsed.push(item),
            Err(reason) => {
                warn!(line, %reason, "skipping malformed ledger row");
                skipped.push(SkippedRow { line, reason });
                preserved.push(columns.canonical(&raw));
            }
        }
    }

    let mut decoded = assign_ids(parsed, skipped);
    decoded.preserved = preserved;
    Ok(decoded)
}

/// Keeps ids read from the file where they are unique and hands out fresh
/// ones, above every id seen, to rows without a usable id.
fn assign_ids(parsed: Vec<(Option<u64>, ExpenseRecord)>, skipped: Vec<SkippedRow>) -> Decoded {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(parsed.len());
    for (id, record) in parsed {
        let id = id.filter(|id| seen.insert(*id));
        kept.push((id, record));
    }

    let mut last_id = RecordId::new(seen.iter().copied().max().unwrap_or(0));
    let entries = kept
        .into_iter()
        .map(|(id, record)| {
            let id = match id {
                Some(id) => RecordId::new(id),
                None => {
                    last_id = last_id.next();
                    debug!(id = %last_id, "assigned id to ledger row");
                    last_id
                }
            };
            LedgerEntry::new(id, record)
        })
        .collect();

    Decoded {
        entries,
        skipped,
        preserved: Vec::new(),
        last_id,
    }
}

/// Serializes entries into the canonical file layout: header row, one row per
/// entry in order, then the preserved unreadable rows as they were read.
pub(crate) fn encode(entries: &[LedgerEntry], preserved: &[ByteRecord]) -> io::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for entry in entries {
        writer.serialize(entry.row())?;
    }
    for row in preserved {
        writer.write_byte_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| io::Error::other(err.to_string()))
}
