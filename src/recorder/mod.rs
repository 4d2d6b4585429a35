//! Event recorder
//!
//! Appends allocator snapshots and cache counters to two independent
//! CSV logs. Rows are only ever appended; each one is flushed as soon as
//! it is written so a crashed run still leaves a readable prefix.

mod record;
mod writer;

pub use record::{
    CacheStats, MemoryEvent, MemoryRecord, CACHE_LOG_HEADER, MEMORY_LOG_HEADER,
    SNAPSHOT_SENTINEL,
};
pub use writer::{EventRecorder, FileRecorder};

use std::fmt;
use std::io;
use thiserror::Error;

/// File name of the memory log inside an output directory.
pub const MEMORY_LOG_FILE: &str = "memory_log.csv";

/// File name of the cache log inside an output directory.
pub const CACHE_LOG_FILE: &str = "cache_log.csv";

/// Which of the two logs an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Allocator snapshot log.
    Memory,
    /// Cache counter log.
    Cache,
}

impl LogKind {
    /// Default file name for this log.
    pub fn file_name(self) -> &'static str {
        match self {
            LogKind::Memory => MEMORY_LOG_FILE,
            LogKind::Cache => CACHE_LOG_FILE,
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Memory => f.write_str("memory log"),
            LogKind::Cache => f.write_str("cache log"),
        }
    }
}

/// Errors surfaced by the recorder.
///
/// Storage failures are the only failure mode; nothing is retried.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Writing or flushing one of the sinks failed.
    #[error("failed to write {log}: {source}")]
    Io {
        /// Log whose sink failed
        log: LogKind,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl RecorderError {
    pub(crate) fn io(log: LogKind) -> impl FnOnce(io::Error) -> Self {
        move |source| RecorderError::Io { log, source }
    }
}
