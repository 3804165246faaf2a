use std::{io, path::PathBuf};

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::RecordId;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("i/o failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("index {index} out of range for snapshot of {len} records")]
    OutOfRange { index: usize, len: usize },

    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    #[error("invalid period {year}-{month:02}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("cannot parse period `{0}`, expected YYYY-MM")]
    InvalidPeriodFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("value overflow")]
    ValueOverflow,
}

/// Field invariant violations detected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(Decimal),

    #[error("category must not be empty")]
    EmptyCategory,

    #[error("record id {0} appears more than once")]
    DuplicateId(RecordId),

    #[error("record id must be positive")]
    ZeroId,
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::Validation(_))
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, LedgerError::OutOfRange { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, LedgerError::Io { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
