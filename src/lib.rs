//! # Allocator and cache event logs
//!
//! This library simulates a best-fit free-list allocator and a
//! direct-mapped cache, and records what they do as two append-only CSV
//! logs for an external reporting tool.
//!
//! ## Logs
//!
//! 1. **`memory_log.csv`**: `Address,Size,Is_Free` rows, one per block, with
//!    an `END` row closing each snapshot of the arena
//! 2. **`cache_log.csv`**: `Cache_Hits,Cache_Misses,Cache_Evictions`
//!    cumulative counters, one row per cache access
//!
//! Every allocator operation touches the cache at the block's offset,
//! appends one cache row, then appends one full snapshot.
//!
//! ## Usage Example
//!
//! ```no_run
//! use heaplog::{EventRecorder, SimulationConfig, Simulator, Workload};
//!
//! let recorder = EventRecorder::create(".")?;
//! let mut sim = Simulator::new(SimulationConfig::default(), recorder)?;
//! let summary = sim.run(&Workload::demo())?;
//! assert_eq!(summary.snapshots, 5);
//! sim.finish()?;
//! # Ok::<(), heaplog::SimulationError>(())
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod allocator; // Best-fit arena
pub mod cache; // Direct-mapped cache
pub mod log; // Log reader, validation, report
pub mod recorder; // Append-only CSV sinks
pub mod workload; // Scripted alloc/free steps

// Re-exports for convenience
pub use allocator::{Allocation, AllocatorError, ArenaStats, BestFitAllocator};
pub use cache::{AccessOutcome, CacheError, DirectMappedCache};
pub use log::{CacheLog, LogError, MemoryLog, Report};
pub use recorder::{CacheStats, EventRecorder, FileRecorder, MemoryEvent, RecorderError};
pub use workload::{Step, Workload, WorkloadError};

use std::collections::HashMap;
use std::io::Write;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Geometry of the simulated arena and cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Arena size in bytes
    pub arena_size: u64,

    /// Bookkeeping bytes in front of every block
    pub header_size: u64,

    /// Total cache capacity in bytes
    pub cache_size: u64,

    /// Bytes per cache line
    pub line_size: u64,
}

impl Default for SimulationConfig {
    /// 1 MiB arena, 32-byte headers, 1 KiB cache of 64-byte lines.
    fn default() -> Self {
        Self {
            arena_size: 1024 * 1024,
            header_size: 32,
            cache_size: 1024,
            line_size: 64,
        }
    }
}

impl SimulationConfig {
    /// Override the arena size.
    pub fn with_arena_size(mut self, arena_size: u64) -> Self {
        self.arena_size = arena_size;
        self
    }

    /// Override the block header size.
    pub fn with_header_size(mut self, header_size: u64) -> Self {
        self.header_size = header_size;
        self
    }

    /// Override the cache geometry.
    pub fn with_cache(mut self, cache_size: u64, line_size: u64) -> Self {
        self.cache_size = cache_size;
        self.line_size = line_size;
        self
    }

    /// Number of cache lines.
    pub fn cache_lines(&self) -> u64 {
        self.cache_size / self.line_size.max(1)
    }

    /// Reject geometries the simulators cannot represent.
    pub fn validate(&self) -> Result<(), SimulationError> {
        BestFitAllocator::check_geometry(self.arena_size, self.header_size)
            .map_err(invalid_config)?;
        DirectMappedCache::check_geometry(self.cache_size, self.line_size)
            .map_err(invalid_config)?;
        Ok(())
    }
}

fn invalid_config(err: impl std::fmt::Display) -> SimulationError {
    SimulationError::InvalidConfig(err.to_string())
}

/// Errors that can occur during simulation
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Geometry rejected by [`SimulationConfig::validate`]
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Allocator refused a request
    #[error(transparent)]
    Allocator(#[from] AllocatorError),

    /// Writing a log failed
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    /// Workload script could not be parsed or checked
    #[error("invalid workload: {0}")]
    Workload(#[from] WorkloadError),
}

/// Outcome of [`Simulator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps in the workload
    pub steps: usize,
    /// Successful allocations
    pub allocations: usize,
    /// Successful frees
    pub frees: usize,
    /// Allocation steps the allocator refused
    pub failed_allocations: usize,
    /// Free steps whose handle was never granted
    pub skipped_frees: usize,
    /// Snapshots written so far
    pub snapshots: usize,
    /// Cache counters after the run
    pub cache: CacheStats,
    /// Arena usage after the run
    pub arena: ArenaStats,
}

/// Drives the allocator and cache and feeds the recorder
///
/// Each successful operation produces exactly one cache row and one
/// snapshot, so the two logs advance in lockstep.
#[derive(Debug)]
pub struct Simulator<W: Write> {
    config: SimulationConfig,
    allocator: BestFitAllocator,
    cache: DirectMappedCache,
    recorder: EventRecorder<W>,
}

impl<W: Write> Simulator<W> {
    /// Create a simulator after validating `config`.
    pub fn new(config: SimulationConfig, recorder: EventRecorder<W>) -> Result<Self, SimulationError> {
        let allocator =
            BestFitAllocator::new(config.arena_size, config.header_size).map_err(invalid_config)?;
        let cache =
            DirectMappedCache::new(config.cache_size, config.line_size).map_err(invalid_config)?;
        info!(
            arena_size = config.arena_size,
            header_size = config.header_size,
            cache_lines = config.cache_lines(),
            "simulator initialised"
        );
        Ok(Self {
            allocator,
            cache,
            config,
            recorder,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Allocator state.
    pub fn allocator(&self) -> &BestFitAllocator {
        &self.allocator
    }

    /// Cache state.
    pub fn cache(&self) -> &DirectMappedCache {
        &self.cache
    }

    /// Allocate, touch the cache, and log both.
    ///
    /// A refused allocation logs nothing.
    pub fn allocate(&mut self, size: u64) -> Result<Allocation, SimulationError> {
        let allocation = self.allocator.allocate(size)?;
        self.observe(allocation.block_offset())?;
        Ok(allocation)
    }

    /// Free, touch the cache, and log both, then coalesce.
    ///
    /// The snapshot shows the released block on its own row; merging with
    /// free neighbours is visible from the next snapshot on.
    pub fn free(&mut self, allocation: Allocation) -> Result<(), SimulationError> {
        let offset = self.allocator.release(allocation)?;
        let recorded = self.observe(offset);
        self.allocator.coalesce(offset);
        recorded
    }

    fn observe(&mut self, block_offset: u64) -> Result<(), SimulationError> {
        let outcome = self.cache.access(block_offset);
        debug!(block_offset, ?outcome, "recording operation");
        self.recorder.record_cache_stats(&self.cache.stats())?;
        self.recorder.record_snapshot(&self.allocator.snapshot())?;
        Ok(())
    }

    /// Execute every step of `workload`.
    ///
    /// Refused allocations and frees of never-granted handles are skipped
    /// with a warning; storage failures abort the run.
    pub fn run(&mut self, workload: &Workload) -> Result<RunSummary, SimulationError> {
        let mut live: HashMap<&str, Allocation> = HashMap::new();
        let mut summary = RunSummary {
            steps: workload.len(),
            allocations: 0,
            frees: 0,
            failed_allocations: 0,
            skipped_frees: 0,
            snapshots: 0,
            cache: CacheStats::default(),
            arena: ArenaStats::default(),
        };

        for step in workload.steps() {
            match step {
                Step::Alloc { name, size } => match self.allocate(*size) {
                    Ok(allocation) => {
                        live.insert(name.as_str(), allocation);
                        summary.allocations += 1;
                    }
                    Err(SimulationError::Allocator(err)) => {
                        warn!(%name, size, error = %err, "allocation refused");
                        summary.failed_allocations += 1;
                    }
                    Err(err) => return Err(err),
                },
                Step::Free { name } => match live.remove(name.as_str()) {
                    Some(allocation) => {
                        self.free(allocation)?;
                        summary.frees += 1;
                    }
                    None => {
                        warn!(%name, "free of a handle that was never granted");
                        summary.skipped_frees += 1;
                    }
                },
            }
        }

        summary.snapshots = self.recorder.snapshots();
        summary.cache = self.cache.stats();
        summary.arena = self.allocator.stats();
        info!(
            allocations = summary.allocations,
            frees = summary.frees,
            failed = summary.failed_allocations,
            snapshots = summary.snapshots,
            "workload finished"
        );
        Ok(summary)
    }

    /// Parse a workload script and run it.
    pub fn run_script(&mut self, script: &str) -> Result<RunSummary, SimulationError> {
        let workload: Workload = script.parse()?;
        self.run(&workload)
    }

    /// Flush the logs and return the sinks as `(memory, cache)`.
    pub fn finish(self) -> Result<(W, W), SimulationError> {
        Ok(self.recorder.finish()?)
    }
}
