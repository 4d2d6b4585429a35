use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::{
    CacheStats, LogKind, MemoryEvent, MemoryRecord, RecorderError, CACHE_LOG_HEADER,
    MEMORY_LOG_HEADER,
};

/// Recorder writing to buffered files on disk.
pub type FileRecorder = EventRecorder<BufWriter<File>>;

/// Append-only writer for the memory and cache logs.
///
/// Each sink is owned exclusively by the recorder until [`finish`](Self::finish)
/// hands it back.
#[derive(Debug)]
pub struct EventRecorder<W: Write> {
    memory: W,
    cache: W,
    last_cache: Option<CacheStats>,
    memory_rows: usize,
    snapshots: usize,
    cache_rows: usize,
}

impl FileRecorder {
    /// Create (or truncate) `memory_log.csv` and `cache_log.csv` inside `dir`.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self, RecorderError> {
        let dir = dir.as_ref();
        let open = |log: LogKind| {
            File::create(dir.join(log.file_name()))
                .map(BufWriter::new)
                .map_err(RecorderError::io(log))
        };
        let memory = open(LogKind::Memory)?;
        let cache = open(LogKind::Cache)?;
        debug!(dir = %dir.display(), "opened log files");
        Self::new(memory, cache)
    }
}

impl<W: Write> EventRecorder<W> {
    /// Wrap two sinks and write the CSV headers to both.
    pub fn new(memory: W, cache: W) -> Result<Self, RecorderError> {
        let mut recorder = Self {
            memory,
            cache,
            last_cache: None,
            memory_rows: 0,
            snapshots: 0,
            cache_rows: 0,
        };
        write_line(&mut recorder.memory, LogKind::Memory, MEMORY_LOG_HEADER)?;
        write_line(&mut recorder.cache, LogKind::Cache, CACHE_LOG_HEADER)?;
        Ok(recorder)
    }

    /// Append one block row to the memory log.
    pub fn record_memory_event(
        &mut self,
        address: u64,
        size: u64,
        is_free: bool,
    ) -> Result<(), RecorderError> {
        let record = MemoryRecord::Block(MemoryEvent::new(address, size, is_free));
        write_line(&mut self.memory, LogKind::Memory, &record)?;
        self.memory_rows += 1;
        Ok(())
    }

    /// Append the sentinel row closing the current snapshot.
    pub fn record_memory_snapshot_end(&mut self) -> Result<(), RecorderError> {
        write_line(&mut self.memory, LogKind::Memory, &MemoryRecord::SnapshotEnd)?;
        self.snapshots += 1;
        Ok(())
    }

    /// Append a whole snapshot: every block followed by the sentinel.
    pub fn record_snapshot<'a, I>(&mut self, blocks: I) -> Result<(), RecorderError>
    where
        I: IntoIterator<Item = &'a MemoryEvent>,
    {
        for block in blocks {
            self.record_memory_event(block.address, block.size, block.is_free)?;
        }
        self.record_memory_snapshot_end()
    }

    /// Append one row of cumulative counters to the cache log.
    ///
    /// A row whose counters go backwards is still written; the log reader
    /// is where that invariant is enforced.
    pub fn record_cache_op(
        &mut self,
        hits: u64,
        misses: u64,
        evictions: u64,
    ) -> Result<(), RecorderError> {
        let stats = CacheStats::new(hits, misses, evictions);
        if let Some(previous) = &self.last_cache {
            if let Some((counter, before, after)) = stats.first_regression(previous) {
                warn!(counter, before, after, "cache counter decreased");
            }
        }
        write_line(&mut self.cache, LogKind::Cache, &stats)?;
        self.last_cache = Some(stats);
        self.cache_rows += 1;
        Ok(())
    }

    /// Append a [`CacheStats`] row.
    pub fn record_cache_stats(&mut self, stats: &CacheStats) -> Result<(), RecorderError> {
        self.record_cache_op(stats.hits, stats.misses, stats.evictions)
    }

    /// Number of block rows written so far.
    pub fn memory_rows(&self) -> usize {
        self.memory_rows
    }

    /// Number of completed snapshots.
    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    /// Number of cache rows written so far.
    pub fn cache_rows(&self) -> usize {
        self.cache_rows
    }

    /// Flush both sinks and return them as `(memory, cache)`.
    pub fn finish(mut self) -> Result<(W, W), RecorderError> {
        self.memory.flush().map_err(RecorderError::io(LogKind::Memory))?;
        self.cache.flush().map_err(RecorderError::io(LogKind::Cache))?;
        debug!(
            snapshots = self.snapshots,
            memory_rows = self.memory_rows,
            cache_rows = self.cache_rows,
            "recorder finished"
        );
        Ok((self.memory, self.cache))
    }
}

fn write_line<W: Write, T: std::fmt::Display + ?Sized>(
    sink: &mut W,
    log: LogKind,
    line: &T,
) -> Result<(), RecorderError> {
    writeln!(sink, "{line}")
        .and_then(|_| sink.flush())
        .map_err(RecorderError::io(log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn render(sink: Vec<u8>) -> String {
        String::from_utf8(sink).expect("logs are UTF-8")
    }

    #[test]
    fn two_snapshots_yield_two_sentinels_and_four_rows() {
        let mut recorder = EventRecorder::new(Vec::new(), Vec::new()).unwrap();
        for _ in 0..2 {
            recorder.record_memory_event(0x10, 4, false).unwrap();
            recorder.record_memory_event(0x14, 8, true).unwrap();
            recorder.record_memory_snapshot_end().unwrap();
        }
        assert_eq!(recorder.snapshots(), 2);
        assert_eq!(recorder.memory_rows(), 4);

        let (memory, _) = recorder.finish().unwrap();
        let memory = render(memory);
        let lines: Vec<_> = memory.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Address,Size,Is_Free",
                "0x10,4,0",
                "0x14,8,1",
                "END",
                "0x10,4,0",
                "0x14,8,1",
                "END",
            ]
        );
    }

    #[test]
    fn cache_rows_follow_header() {
        let mut recorder = EventRecorder::new(Vec::new(), Vec::new()).unwrap();
        recorder.record_cache_op(1, 0, 0).unwrap();
        recorder.record_cache_op(1, 1, 0).unwrap();
        recorder.record_cache_op(2, 1, 1).unwrap();
        assert_eq!(recorder.cache_rows(), 3);

        let (_, cache) = recorder.finish().unwrap();
        assert_eq!(
            render(cache),
            "Cache_Hits,Cache_Misses,Cache_Evictions\n1,0,0\n1,1,0\n2,1,1\n"
        );
    }

    #[test]
    fn decreasing_counters_are_still_appended() {
        let mut recorder = EventRecorder::new(Vec::new(), Vec::new()).unwrap();
        recorder.record_cache_op(3, 3, 3).unwrap();
        recorder.record_cache_op(1, 1, 1).unwrap();
        let (_, cache) = recorder.finish().unwrap();
        assert!(render(cache).ends_with("3,3,3\n1,1,1\n"));
    }

    #[derive(Debug)]
    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn storage_failure_is_surfaced() {
        let err = EventRecorder::new(FailingSink, FailingSink).unwrap_err();
        match err {
            RecorderError::Io { log, source } => {
                assert_eq!(log, LogKind::Memory);
                assert_eq!(source.to_string(), "disk full");
            }
        }
    }
}
