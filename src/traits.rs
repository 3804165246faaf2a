use std::cell::RefCell;

use anyhow::Result;
use serde::Serialize;

/// CSVWrite trait provides a method to write a record to a CSV sink.
pub trait CSVWrite {
    /// Writes a record to a CSV sink.
    ///
    /// # Arguments
    /// * `record` - The record to write that is Serializable.
    ///
    /// # Returns
    /// A Result indicating success or failure.
    fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()>;
}

/// CSVExport trait provides a method to export rows into a CSV sink.
pub trait CSVExport {
    /// Exports every row.
    ///
    /// # Arguments
    /// * `writer` - The writer to write the rows to.
    ///
    /// # Returns
    /// A Result indicating success or failure.
    fn export(&self, writer: RefCell<&mut impl CSVWrite>) -> Result<()>;
}

/// Durable byte storage behind a ledger store.
///
/// `read` distinguishes an absent file (`Ok(None)`) from one that exists but
/// cannot be read. `write` must replace the whole content or leave the
/// previous content untouched.
pub trait LedgerBackend: Send {
    fn read(&self) -> std::io::Result<Option<Vec<u8>>>;

    fn write(&mut self, contents: &[u8]) -> std::io::Result<()>;

    /// Human readable location used in errors and logs.
    fn location(&self) -> std::path::PathBuf;
}

/// Receiver of month-end digests, e.g. a chat bot or mailer.
pub trait DigestSink {
    /// Delivers a rendered digest message.
    ///
    /// # Arguments
    /// * `message` - The plain-text message.
    ///
    /// # Returns
    /// A Result indicating success or failure.
    fn deliver(&mut self, message: &str) -> Result<()>;
}
