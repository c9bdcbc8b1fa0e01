//! # gsync — GPIO Based Synchronizer
//!
//! Oscillator role of the two-device phase-lock pair. Pulses the output
//! line once per cycle and pulls its own phase toward the peer's reported
//! wakeups through a two-participant Kuramoto model.
//!
//! The reciprocal `gtimer` process on this device records the *peer
//! device's* pulses into the shared slot read here.

use clap::Parser;
use gsync_common::config::{DEFAULT_COUPLING_CONST, DEFAULT_FREQUENCY_HZ, FileConfig};
use gsync_common::{rt, shutdown};
use gsync_gpio::{Direction, Level, LineId, open_line};
use gsync_oscillator::cycle::OscillatorLoop;
use gsync_oscillator::kuramoto::KuramotoSync;
use gsync_shm::SharedSlot;
use std::path::PathBuf;
use std::process;
use tracing::{Level as LogLevel, error, info};
use tracing_subscriber::EnvFilter;

/// gsync — GPIO based synchronizer (oscillator role)
#[derive(Parser, Debug)]
#[command(name = "gsync")]
#[command(version)]
#[command(about = "Keeps this device's task loop phase-locked to its peer via GPIO pulses")]
struct Args {
    /// Output GPIO line: "<chip>:<offset>" (character device) or a
    /// positive legacy export number (sysfs).
    line: Option<String>,

    /// Shared memory key, shared with the local gtimer process.
    shmem_key: Option<i32>,

    /// Sync task frequency in Hz (positive integer).
    #[arg(short = 'f', long)]
    frequency: Option<i32>,

    /// Kuramoto coupling constant (positive real).
    #[arg(short = 'k', long = "coupling-const")]
    coupling_const: Option<f64>,

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

    info!("gsync shutdown complete");
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

    let frequency = args
        .frequency
        .or(file.frequency_hz)
        .unwrap_or(DEFAULT_FREQUENCY_HZ);
    let coupling = args
        .coupling_const
        .or(file.coupling_constant)
        .unwrap_or(DEFAULT_COUPLING_CONST);

    // SIGINT only raises the shutdown flag; every loop notices it at the
    // next iteration boundary.
    shutdown::install_handler()?;

    rt::configure_mem_for_rt();
    rt::rt_schedule(args.cpu_core, args.rt_priority)?;

    // Attach to the slot the local gtimer process fills with the peer
    // device's wakeups. Launch order between the two does not matter.
    let slot = SharedSlot::open(shmem_key)?;

    // The wakeup pulse line starts low; each cycle raises then lowers it.
    let mut line = open_line(&line_id, "gsync")?;
    line.set_direction(Direction::Output)?;
    line.set_value(Level::Low)?;

    let sync = KuramotoSync::new(frequency, coupling)?;
    info!(
        "gsync starting: line={line_id}, key={shmem_key}, frequency={}Hz, K={}",
        sync.frequency_hz(),
        sync.coupling_constant()
    );

    let mut runner = OscillatorLoop::new(line, slot, sync, shutdown::flag());
    runner.run()?;

    let stats = runner.stats();
    info!(
        "stopped after {} cycles ({} coupled, {} free-running, max wake latency {}ns)",
        stats.cycles, stats.coupled, stats.free_running, stats.max_wake_latency_ns
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
