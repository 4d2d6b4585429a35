//! Log reading, validation, and plain-text reporting
//!
//! The inverse of [`crate::recorder`]: parses the two CSV logs back into
//! typed rows, checks the snapshot and monotonicity invariants, and
//! summarises each snapshot.

mod reader;
mod report;

pub use reader::{CacheLog, MemoryLog, Snapshot};
pub use report::{CacheSummary, Report, SnapshotSummary};

use std::io;
use thiserror::Error;

use crate::recorder::LogKind;

/// Errors raised while reading or validating a log.
#[derive(Debug, Error)]
pub enum LogError {
    /// Reading the log failed
    #[error("failed to read {log}: {source}")]
    Io {
        /// Log being read
        log: LogKind,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// First line is not the expected header
    #[error("{log}: expected header '{expected}', found '{found}'")]
    HeaderMismatch {
        /// Log being read
        log: LogKind,
        /// Header the log should start with
        expected: &'static str,
        /// What was actually there
        found: String,
    },

    /// A row could not be parsed
    #[error("{log} line {line}: {reason}")]
    Malformed {
        /// Log being read
        log: LogKind,
        /// 1-based line number (header is line 1)
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// Rows at the end of the memory log are not closed by a sentinel
    #[error("memory log ends with {rows} row(s) not terminated by END")]
    UnterminatedSnapshot {
        /// Number of dangling rows
        rows: usize,
    },

    /// A cache counter went down
    #[error("cache log row {row}: {counter} decreased from {previous} to {current}")]
    CounterRegression {
        /// 0-based data row index
        row: usize,
        /// Column name
        counter: &'static str,
        /// Value in the previous row
        previous: u64,
        /// Value in this row
        current: u64,
    },
}
