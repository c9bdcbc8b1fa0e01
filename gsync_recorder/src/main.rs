//! # gtimer — GPIO Signal Time Recorder
//!
//! Recorder role of the two-device phase-lock pair. Watches the input
//! line wired to the peer device's pulse output and stamps every rising
//! edge into the shared slot, where the local `gsync` process reads it as
//! the peer's last reported wakeup.

use clap::Parser;
use gsync_common::config::FileConfig;
use gsync_common::{rt, shutdown};
use gsync_gpio::{Edge, LineId, open_line};
use gsync_recorder::cycle::RecorderLoop;
use gsync_shm::SharedSlot;
use std::path::PathBuf;
use std::process;
use tracing::{Level as LogLevel, error, info};
use tracing_subscriber::EnvFilter;

/// gtimer — GPIO signal time recorder (recorder role)
#[derive(Parser, Debug)]
#[command(name = "gtimer")]
#[command(version)]
#[command(about = "Timestamps peer GPIO pulses into shared memory for the local gsync process")]
struct Args {
    /// Input GPIO line: "<chip>:<offset>" (character device) or a
    /// positive legacy export number (sysfs).
    line: Option<String>,

    /// Shared memory key, shared with the local gsync process.
    shmem_key: Option<i32>,

    /// Optional TOML config file supplying defaults for the above.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Apply SCHED_FIFO with this priority.
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Pin the process to this CPU core.
    #[arg(long)]
    cpu_core: Option<usize>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("gtimer shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let line_spec = args
        .line
        .clone()
        .or(file.line)
        .ok_or("missing LINE argument")?;
    let line_id: LineId = line_spec.parse()?;

    let shmem_key = args
        .shmem_key
        .or(file.shmem_key)
        .ok_or("missing SHMEM_KEY argument")?;

    shutdown::install_handler()?;

    rt::configure_mem_for_rt();
    rt::rt_schedule(args.cpu_core, args.rt_priority)?;

    // Usually the first of the local pair to start, and therefore the
    // slot creator; either order works.
    let slot = SharedSlot::open(shmem_key)?;

    // Watch for the peer's rising pulse edges. Edge configuration forces
    // input direction.
    let mut line = open_line(&line_id, "gtimer")?;
    line.set_edge_mode(Edge::Rising)?;

    info!("gtimer starting: line={line_id}, key={shmem_key}");

    let mut runner = RecorderLoop::new(line, slot, shutdown::flag());
    runner.run()?;

    let stats = runner.stats();
    info!(
        "stopped after {} edges ({} interrupted waits)",
        stats.edges, stats.interruptions
    );

    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        LogLevel::DEBUG
    } else {
        LogLevel::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
