use std::io::BufRead;

use super::LogError;
use crate::recorder::{
    CacheStats, LogKind, MemoryEvent, MemoryRecord, CACHE_LOG_HEADER, MEMORY_LOG_HEADER,
    SNAPSHOT_SENTINEL,
};

/// Allocator state at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Snapshot {
    /// Block rows in log order
    pub blocks: Vec<MemoryEvent>,
}

/// Parsed memory log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryLog {
    /// Snapshots closed by a sentinel, in log order
    pub snapshots: Vec<Snapshot>,
    /// Trailing rows with no sentinel after them
    pub incomplete: Vec<MemoryEvent>,
}

impl MemoryLog {
    /// Parse a memory log, header included.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, LogError> {
        let mut log = MemoryLog::default();
        let mut current = Vec::new();

        for (line_no, line) in data_lines(reader, LogKind::Memory, MEMORY_LOG_HEADER)? {
            let record = parse_memory_line(&line?).map_err(|reason| LogError::Malformed {
                log: LogKind::Memory,
                line: line_no,
                reason,
            })?;
            match record {
                MemoryRecord::Block(event) => current.push(event),
                MemoryRecord::SnapshotEnd => log.snapshots.push(Snapshot {
                    blocks: std::mem::take(&mut current),
                }),
            }
        }

        log.incomplete = current;
        Ok(log)
    }

    /// Check that every row belongs to a terminated snapshot.
    pub fn validate(&self) -> Result<(), LogError> {
        if self.incomplete.is_empty() {
            Ok(())
        } else {
            Err(LogError::UnterminatedSnapshot {
                rows: self.incomplete.len(),
            })
        }
    }

    /// Number of block rows across complete snapshots.
    pub fn data_rows(&self) -> usize {
        self.snapshots.iter().map(|s| s.blocks.len()).sum()
    }
}

/// Parsed cache log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheLog {
    /// One entry per recorded operation
    pub rows: Vec<CacheStats>,
}

impl CacheLog {
    /// Parse a cache log, header included.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, LogError> {
        let mut rows = Vec::new();
        for (line_no, line) in data_lines(reader, LogKind::Cache, CACHE_LOG_HEADER)? {
            let stats = parse_cache_row(&line?).map_err(|reason| LogError::Malformed {
                log: LogKind::Cache,
                line: line_no,
                reason,
            })?;
            rows.push(stats);
        }
        Ok(Self { rows })
    }

    /// Check that no counter decreases between consecutive rows.
    pub fn validate(&self) -> Result<(), LogError> {
        for (row, pair) in self.rows.windows(2).enumerate() {
            if let Some((counter, previous, current)) = pair[1].first_regression(&pair[0]) {
                return Err(LogError::CounterRegression {
                    row: row + 1,
                    counter,
                    previous,
                    current,
                });
            }
        }
        Ok(())
    }

    /// Counters after the last operation.
    pub fn last(&self) -> Option<&CacheStats> {
        self.rows.last()
    }
}

/// Check the header and yield `(line_number, line)` for every non-blank data line.
fn data_lines<R: BufRead>(
    reader: R,
    log: LogKind,
    expected: &'static str,
) -> Result<impl Iterator<Item = (usize, Result<String, LogError>)>, LogError> {
    let mut lines = reader.lines().enumerate();
    let header = match lines.next() {
        Some((_, line)) => line.map_err(|source| LogError::Io { log, source })?,
        None => String::new(),
    };
    if normalize_header(&header) != expected {
        return Err(LogError::HeaderMismatch {
            log,
            expected,
            found: header,
        });
    }

    Ok(lines
        .map(move |(idx, line)| (idx + 1, line.map_err(|source| LogError::Io { log, source })))
        .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty())))
}

fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
}

/// A sentinel is `END` alone, or `END` followed only by empty columns.
fn parse_memory_line(line: &str) -> Result<MemoryRecord, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields[0] == SNAPSHOT_SENTINEL {
        return match fields[1..].iter().find(|field| !field.is_empty()) {
            None => Ok(MemoryRecord::SnapshotEnd),
            Some(field) => Err(format!("sentinel row carries data '{field}'")),
        };
    }

    let [address, size, is_free] = fields.as_slice() else {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    };

    let address = parse_address(address)?;
    let size = size
        .parse::<u64>()
        .map_err(|_| format!("invalid size '{size}'"))?;
    let is_free = match *is_free {
        "1" | "true" | "True" => true,
        "0" | "false" | "False" => false,
        other => return Err(format!("invalid Is_Free value '{other}'")),
    };
    Ok(MemoryRecord::Block(MemoryEvent::new(address, size, is_free)))
}

fn parse_address(field: &str) -> Result<u64, String> {
    let parsed = match field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => field.parse::<u64>(),
    };
    parsed.map_err(|_| format!("invalid address '{field}'"))
}

fn parse_cache_row(line: &str) -> Result<CacheStats, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [hits, misses, evictions] = fields.as_slice() else {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    };
    let parse = |name: &str, value: &str| {
        value
            .parse::<u64>()
            .map_err(|_| format!("invalid {name} '{value}'"))
    };
    Ok(CacheStats::new(
        parse("Cache_Hits", *hits)?,
        parse("Cache_Misses", *misses)?,
        parse("Cache_Evictions", *evictions)?,
    ))
}
