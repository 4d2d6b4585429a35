//! Direct-mapped cache simulator
//!
//! Each address maps to exactly one line: `(address / line_size) % lines`.
//! The tag is `address / cache_size`. Counters are cumulative and never
//! decrease, which is what makes the cache log monotonic.

use bitvec::prelude::*;
use thiserror::Error;
use tracing::trace;

use crate::recorder::CacheStats;

/// Errors raised when building a cache.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Line size is zero, larger than the cache, or does not divide it
    #[error("cache size {cache_size} must be a non-zero multiple of line size {line_size}")]
    InvalidGeometry {
        /// Requested capacity in bytes
        cache_size: u64,
        /// Requested line size in bytes
        line_size: u64,
    },
}

/// Result of a single cache access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// Valid line with matching tag
    Hit,
    /// Line was empty and has been filled
    Miss,
    /// Line held another tag, which was displaced
    Eviction {
        /// Tag that was evicted
        evicted_tag: u64,
    },
}

impl AccessOutcome {
    /// Whether the access was served from the cache.
    pub fn is_hit(&self) -> bool {
        matches!(self, AccessOutcome::Hit)
    }
}

/// Direct-mapped cache with one tag per line
#[derive(Debug)]
pub struct DirectMappedCache {
    cache_size: u64,
    line_size: u64,
    /// Valid bit per line
    valid: BitVec,
    tags: Vec<u64>,
    stats: CacheStats,
}

impl DirectMappedCache {
    /// Create an empty cache.
    pub fn new(cache_size: u64, line_size: u64) -> Result<Self, CacheError> {
        Self::check_geometry(cache_size, line_size)?;
        let lines = (cache_size / line_size) as usize;
        Ok(Self {
            cache_size,
            line_size,
            valid: bitvec![0; lines],
            tags: vec![0; lines],
            stats: CacheStats::default(),
        })
    }

    /// At least one line, and lines tile the cache exactly.
    pub fn check_geometry(cache_size: u64, line_size: u64) -> Result<(), CacheError> {
        if line_size == 0 || cache_size < line_size || cache_size % line_size != 0 {
            return Err(CacheError::InvalidGeometry {
                cache_size,
                line_size,
            });
        }
        Ok(())
    }

    /// Number of lines.
    pub fn lines(&self) -> usize {
        self.tags.len()
    }

    /// Line index an address maps to.
    pub fn line_index(&self, address: u64) -> usize {
        ((address / self.line_size) % self.lines() as u64) as usize
    }

    /// Tag stored for an address.
    pub fn tag(&self, address: u64) -> u64 {
        address / self.cache_size
    }

    /// Look up `address`, filling its line on a miss.
    pub fn access(&mut self, address: u64) -> AccessOutcome {
        let line = self.line_index(address);
        let tag = self.tag(address);

        let outcome = if self.valid[line] {
            if self.tags[line] == tag {
                AccessOutcome::Hit
            } else {
                AccessOutcome::Eviction {
                    evicted_tag: self.tags[line],
                }
            }
        } else {
            AccessOutcome::Miss
        };

        match outcome {
            AccessOutcome::Hit => self.stats.hits += 1,
            AccessOutcome::Miss => self.stats.misses += 1,
            AccessOutcome::Eviction { .. } => {
                self.stats.evictions += 1;
                self.stats.misses += 1;
            }
        }
        if !outcome.is_hit() {
            self.valid.set(line, true);
            self.tags[line] = tag;
        }

        trace!(address, line, tag, ?outcome, "cache access");
        outcome
    }

    /// Cumulative counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of lines currently holding data.
    pub fn occupied_lines(&self) -> usize {
        self.valid.count_ones()
    }
}
