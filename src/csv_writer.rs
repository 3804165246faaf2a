use crate::traits::CSVWrite;
use anyhow::Result;
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::io::{self, Stdout, Write};

/// Writes serializable rows as CSV into any `io::Write`, header taken from the
/// first row's field names.
pub struct CsvSink<W: Write> {
    writer: Writer<W>,
}

pub type StdOutCSVWriter = CsvSink<Stdout>;

impl StdOutCSVWriter {
    pub fn new() -> Self {
        CsvSink::from_writer(io::stdout())
    }
}

impl Default for StdOutCSVWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(inner: W) -> Self {
        CsvSink {
            writer: WriterBuilder::new().from_writer(inner),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!(err.to_string()))
    }
}

impl<W: Write> CSVWrite for CsvSink<W> {
    fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        self.writer.serialize(record)?;
        Ok(self.writer.flush()?)
    }
}
