use std::fs;
use std::path::PathBuf;

use heaplog::{EventRecorder, SimulationConfig, Simulator, Workload};

/// Set to rewrite golden logs from the current output.
const BLESS_VAR: &str = "HEAPLOG_BLESS";

fn golden_path(name: &str) -> PathBuf {
    [env!("CARGO_MANIFEST_DIR"), "tests", "snapshots", name]
        .iter()
        .collect()
}

/// Compare a rendered log against `tests/snapshots/<name>` row by row.
///
/// Logs are line-oriented, so a mismatch names the first differing row
/// rather than dumping both files.
#[allow(dead_code)]
pub fn assert_snapshot(name: &str, actual: &str) {
    let path = golden_path(name);
    if std::env::var_os(BLESS_VAR).is_some() {
        fs::create_dir_all(path.parent().expect("golden file has a parent"))
            .expect("create golden directory");
        fs::write(&path, actual).expect("write golden log");
        return;
    }

    let expected = fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("golden log {} unreadable: {err}", path.display()));
    let expected: Vec<&str> = expected.lines().collect();
    let actual: Vec<&str> = actual.lines().collect();

    if let Some(row) = (0..expected.len().max(actual.len()))
        .find(|&row| expected.get(row) != actual.get(row))
    {
        panic!(
            "{name} differs at line {}: expected {:?}, got {:?} ({} vs {} lines). Rerun with {BLESS_VAR}=1 to accept.",
            row + 1,
            expected.get(row),
            actual.get(row),
            expected.len(),
            actual.len()
        );
    }
}

/// Run a workload into in-memory sinks and return `(memory_log, cache_log)`.
#[allow(dead_code)]
pub fn run_in_memory(config: SimulationConfig, workload: &Workload) -> (String, String) {
    let recorder = EventRecorder::new(Vec::new(), Vec::new()).expect("headers write to Vec");
    let mut simulator = Simulator::new(config, recorder).expect("valid config");
    simulator.run(workload).expect("workload runs");
    let (memory, cache) = simulator.finish().expect("flush succeeds");
    (
        String::from_utf8(memory).expect("memory log is UTF-8"),
        String::from_utf8(cache).expect("cache log is UTF-8"),
    )
}
