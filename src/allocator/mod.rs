//! Best-fit allocator simulator
//!
//! Models a fixed arena carved into header-prefixed blocks. Blocks are
//! kept in address order and always tile the arena exactly, so a
//! snapshot is simply the block list.

mod best_fit;

pub use best_fit::{Allocation, BestFitAllocator, Block};

use thiserror::Error;

/// Errors that can occur while allocating or freeing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocatorError {
    /// Arena too small to hold one header plus payload
    #[error("arena size {arena_size} must exceed header size {header_size}")]
    InvalidArena {
        /// Requested arena size
        arena_size: u64,
        /// Requested per-block header size
        header_size: u64,
    },

    /// Zero-byte requests are rejected
    #[error("zero-sized allocation requested")]
    ZeroSize,

    /// No free block is large enough
    #[error("out of memory: no free block holds {requested} bytes (largest free block: {largest_free})")]
    OutOfMemory {
        /// Requested payload size
        requested: u64,
        /// Largest free payload available at the time
        largest_free: u64,
    },

    /// Handle does not point at the start of any block
    #[error("no block starts at offset {offset:#x}")]
    UnknownBlock {
        /// Block offset carried by the handle
        offset: u64,
    },

    /// Block was already free
    #[error("double free of block at offset {offset:#x}")]
    DoubleFree {
        /// Block offset carried by the handle
        offset: u64,
    },
}

/// Aggregate usage figures for the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArenaStats {
    /// Number of blocks (free and used)
    pub blocks: usize,
    /// Payload bytes held by allocated blocks
    pub used_bytes: u64,
    /// Payload bytes held by free blocks
    pub free_bytes: u64,
    /// Number of free blocks
    pub free_blocks: usize,
    /// Largest single free payload
    pub largest_free: u64,
}

impl ArenaStats {
    /// Summarise a block list.
    pub fn from_blocks<I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = (u64, bool)>,
    {
        let mut stats = ArenaStats::default();
        for (size, is_free) in blocks {
            stats.blocks += 1;
            if is_free {
                stats.free_bytes += size;
                stats.free_blocks += 1;
                stats.largest_free = stats.largest_free.max(size);
            } else {
                stats.used_bytes += size;
            }
        }
        stats
    }

    /// External fragmentation: share of free bytes outside the largest free block.
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            0.0
        } else {
            1.0 - self.largest_free as f64 / self.free_bytes as f64
        }
    }
}
