use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use heaplog::recorder::{CACHE_LOG_FILE, MEMORY_LOG_FILE};
use heaplog::{CacheLog, EventRecorder, MemoryLog, Report, SimulationConfig, Simulator, Workload};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "heaplog", about = "Allocator and cache simulator with CSV event logs")]
struct Cli {
    /// Log debug detail to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workload and write memory_log.csv and cache_log.csv.
    Run {
        /// Directory receiving the two logs.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Workload script (`alloc <name> <size>` / `free <name>` per line).
        /// Runs the built-in demo scenario when omitted.
        #[arg(long)]
        workload: Option<PathBuf>,
        #[command(flatten)]
        geometry: GeometryArgs,
    },
    /// Check the snapshot and counter invariants of existing logs.
    Check(LogPaths),
    /// Print a per-snapshot and cache summary of existing logs.
    Report(LogPaths),
}

#[derive(Args, Debug)]
struct GeometryArgs {
    /// Arena size in bytes.
    #[arg(long, default_value_t = 1024 * 1024)]
    arena_size: u64,
    /// Per-block header size in bytes.
    #[arg(long, default_value_t = 32)]
    header_size: u64,
    /// Cache capacity in bytes.
    #[arg(long, default_value_t = 1024)]
    cache_size: u64,
    /// Cache line size in bytes.
    #[arg(long, default_value_t = 64)]
    line_size: u64,
}

impl GeometryArgs {
    fn config(&self) -> SimulationConfig {
        SimulationConfig::default()
            .with_arena_size(self.arena_size)
            .with_header_size(self.header_size)
            .with_cache(self.cache_size, self.line_size)
    }
}

#[derive(Args, Debug)]
struct LogPaths {
    /// Directory holding memory_log.csv and cache_log.csv.
    #[arg(long, default_value = ".")]
    dir: PathBuf,
    /// Explicit memory log path (defaults to <dir>/memory_log.csv).
    #[arg(long)]
    memory_log: Option<PathBuf>,
    /// Explicit cache log path (defaults to <dir>/cache_log.csv).
    #[arg(long)]
    cache_log: Option<PathBuf>,
}

impl LogPaths {
    fn memory(&self) -> PathBuf {
        self.memory_log
            .clone()
            .unwrap_or_else(|| self.dir.join(MEMORY_LOG_FILE))
    }

    fn cache(&self) -> PathBuf {
        self.cache_log
            .clone()
            .unwrap_or_else(|| self.dir.join(CACHE_LOG_FILE))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            out_dir,
            workload,
            geometry,
        } => run_workload(out_dir, workload, geometry.config())?,
        Commands::Check(paths) => run_check(&paths)?,
        Commands::Report(paths) => run_report(&paths)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "heaplog=debug" } else { "heaplog=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_workload(
    out_dir: PathBuf,
    workload_path: Option<PathBuf>,
    config: SimulationConfig,
) -> Result<()> {
    let workload = match &workload_path {
        Some(path) => {
            let script = fs::read_to_string(path)
                .with_context(|| format!("failed to read workload {}", path.display()))?;
            script
                .parse::<Workload>()
                .with_context(|| format!("invalid workload {}", path.display()))?
        }
        None => Workload::demo(),
    };

    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let recorder = EventRecorder::create(&out_dir)
        .with_context(|| format!("failed to open logs in {}", out_dir.display()))?;
    let mut simulator =
        Simulator::new(config, recorder).context("failed to initialise simulator")?;

    let summary = simulator.run(&workload).context("workload failed")?;
    simulator.finish().context("failed to flush logs")?;

    println!(
        "steps={}\tallocations={}\tfrees={}\tfailed={}\tsnapshots={}",
        summary.steps,
        summary.allocations,
        summary.frees,
        summary.failed_allocations,
        summary.snapshots
    );
    println!(
        "cache: hits={}\tmisses={}\tevictions={}\tused={}\tfree={}",
        summary.cache.hits,
        summary.cache.misses,
        summary.cache.evictions,
        summary.arena.used_bytes,
        summary.arena.free_bytes
    );
    Ok(())
}

fn load_logs(paths: &LogPaths) -> Result<(MemoryLog, CacheLog)> {
    let memory_path = paths.memory();
    let cache_path = paths.cache();
    let memory = MemoryLog::parse(open(&memory_path)?)
        .with_context(|| format!("failed to parse {}", memory_path.display()))?;
    let cache = CacheLog::parse(open(&cache_path)?)
        .with_context(|| format!("failed to parse {}", cache_path.display()))?;
    Ok((memory, cache))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn run_check(paths: &LogPaths) -> Result<()> {
    let (memory, cache) = load_logs(paths)?;
    let mut failures = Vec::new();
    if let Err(err) = memory.validate() {
        failures.push(err.to_string());
    }
    if let Err(err) = cache.validate() {
        failures.push(err.to_string());
    }

    println!(
        "memory: snapshots={}\trows={}\ncache: rows={}",
        memory.snapshots.len(),
        memory.data_rows(),
        cache.rows.len()
    );
    if !failures.is_empty() {
        bail!("log check failed:\n  {}", failures.join("\n  "));
    }
    println!("OK");
    Ok(())
}

fn run_report(paths: &LogPaths) -> Result<()> {
    let (memory, cache) = load_logs(paths)?;
    print!("{}", Report::new(&memory, &cache).render());
    Ok(())
}
