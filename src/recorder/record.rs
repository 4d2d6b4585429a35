use std::fmt;

/// Literal written to the `Address` column to close a snapshot.
pub const SNAPSHOT_SENTINEL: &str = "END";

/// Header line of the memory log.
pub const MEMORY_LOG_HEADER: &str = "Address,Size,Is_Free";

/// Header line of the cache log.
pub const CACHE_LOG_HEADER: &str = "Cache_Hits,Cache_Misses,Cache_Evictions";

/// One block of allocator state as written to the memory log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MemoryEvent {
    /// Offset of the block header inside the arena.
    pub address: u64,
    /// Payload size in bytes (header excluded).
    pub size: u64,
    /// Whether the block is currently free.
    pub is_free: bool,
}

impl MemoryEvent {
    /// Construct a new block record.
    pub fn new(address: u64, size: u64, is_free: bool) -> Self {
        Self {
            address,
            size,
            is_free,
        }
    }
}

impl fmt::Display for MemoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x},{},{}",
            self.address,
            self.size,
            u8::from(self.is_free)
        )
    }
}

/// A single line of the memory log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MemoryRecord {
    /// Block state row.
    Block(MemoryEvent),
    /// Sentinel row terminating a snapshot.
    SnapshotEnd,
}

impl fmt::Display for MemoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryRecord::Block(event) => fmt::Display::fmt(event, f),
            MemoryRecord::SnapshotEnd => f.write_str(SNAPSHOT_SENTINEL),
        }
    }
}

/// Cumulative cache counters, one row of the cache log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheStats {
    /// Accesses that found a valid line with a matching tag.
    pub hits: u64,
    /// Accesses that had to (re)fill a line.
    pub misses: u64,
    /// Misses that displaced a valid line.
    pub evictions: u64,
}

impl CacheStats {
    /// Construct counters from raw values.
    pub fn new(hits: u64, misses: u64, evictions: u64) -> Self {
        Self {
            hits,
            misses,
            evictions,
        }
    }

    /// Total number of accesses observed.
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of accesses that hit, or `0.0` before any access.
    pub fn hit_rate(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }

    /// Name of the first counter that is lower than in `previous`, if any.
    pub fn first_regression(&self, previous: &CacheStats) -> Option<(&'static str, u64, u64)> {
        [
            ("Cache_Hits", previous.hits, self.hits),
            ("Cache_Misses", previous.misses, self.misses),
            ("Cache_Evictions", previous.evictions, self.evictions),
        ]
        .into_iter()
        .find(|(_, before, after)| after < before)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.hits, self.misses, self.evictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_rows_render_like_the_log() {
        assert_eq!(MemoryEvent::new(0x10, 4, false).to_string(), "0x10,4,0");
        assert_eq!(MemoryEvent::new(0, 1_048_544, true).to_string(), "0x0,1048544,1");
        assert_eq!(MemoryRecord::SnapshotEnd.to_string(), "END");
    }

    #[test]
    fn regression_reports_first_decreasing_counter() {
        let previous = CacheStats::new(2, 1, 1);
        assert_eq!(CacheStats::new(2, 2, 1).first_regression(&previous), None);
        assert_eq!(
            CacheStats::new(2, 0, 0).first_regression(&previous),
            Some(("Cache_Misses", 1, 0))
        );
    }

    #[test]
    fn hit_rate_handles_empty_stats() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        assert!((CacheStats::new(3, 1, 0).hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
