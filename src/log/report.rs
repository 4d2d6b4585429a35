use std::fmt::Write as _;

use super::{CacheLog, MemoryLog, Snapshot};
use crate::allocator::ArenaStats;
use crate::recorder::CacheStats;

/// Usage figures for one memory snapshot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SnapshotSummary {
    /// 1-based snapshot number
    pub index: usize,
    /// Block-level totals
    pub arena: ArenaStats,
    /// Share of free bytes outside the largest free block
    pub fragmentation: f64,
}

impl SnapshotSummary {
    fn from_snapshot(index: usize, snapshot: &Snapshot) -> Self {
        let arena = ArenaStats::from_blocks(snapshot.blocks.iter().map(|b| (b.size, b.is_free)));
        Self {
            index,
            arena,
            fragmentation: arena.fragmentation(),
        }
    }
}

/// Cache behaviour over the whole run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheSummary {
    /// Number of recorded operations
    pub operations: usize,
    /// Counters after the last operation
    pub last: CacheStats,
    /// Hits over accesses
    pub hit_rate: f64,
}

/// Plain-text digest of a memory log and a cache log.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Report {
    /// One entry per complete snapshot
    pub snapshots: Vec<SnapshotSummary>,
    /// Cache totals
    pub cache: CacheSummary,
}

impl Report {
    /// Summarise parsed logs. Incomplete trailing rows are ignored.
    pub fn new(memory: &MemoryLog, cache: &CacheLog) -> Self {
        let snapshots = memory
            .snapshots
            .iter()
            .enumerate()
            .map(|(idx, snapshot)| SnapshotSummary::from_snapshot(idx + 1, snapshot))
            .collect();

        let last = cache.last().copied().unwrap_or_default();
        Self {
            snapshots,
            cache: CacheSummary {
                operations: cache.rows.len(),
                last,
                hit_rate: last.hit_rate(),
            },
        }
    }

    /// Render as an aligned text table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Memory snapshots: {}", self.snapshots.len());
        let _ = writeln!(
            out,
            "{:>8} {:>7} {:>12} {:>12} {:>6} {:>12} {:>6}",
            "snapshot", "blocks", "used", "free", "holes", "largest", "frag"
        );
        for s in &self.snapshots {
            let _ = writeln!(
                out,
                "{:>8} {:>7} {:>12} {:>12} {:>6} {:>12} {:>5.1}%",
                s.index,
                s.arena.blocks,
                s.arena.used_bytes,
                s.arena.free_bytes,
                s.arena.free_blocks,
                s.arena.largest_free,
                s.fragmentation * 100.0
            );
        }

        let c = &self.cache;
        let _ = writeln!(out, "Cache operations: {}", c.operations);
        let _ = writeln!(
            out,
            "  hits={} misses={} evictions={} hit_rate={:.1}%",
            c.last.hits,
            c.last.misses,
            c.last.evictions,
            c.hit_rate * 100.0
        );
        out
    }
}
