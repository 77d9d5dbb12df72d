//! dispatchsim - Run block dispatcher simulations.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::Level;

use dispatch_sim::{
    init_tracing, CoreId, DoneSampling, Latency, Scenario, ScenarioFile, Simulator, TraceStats,
};

/// Run block dispatcher simulations.
///
/// Flags override values from `--config`.
#[derive(Parser)]
#[command(name = "dispatchsim")]
struct Cli {
    /// Path to a TOML scenario file.
    #[arg(short = 'f', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of cores in the pool.
    #[arg(short, long)]
    cores: Option<u32>,

    /// Number of blocks in the kernel.
    #[arg(short, long)]
    blocks: Option<u32>,

    /// Warps per block, forwarded to each core on start.
    #[arg(short, long)]
    warps_per_block: Option<u32>,

    /// Start-to-done latency: "N", "MIN..MAX" or "never".
    #[arg(long, value_name = "TICKS")]
    run_ticks: Option<Latency>,

    /// Reset-request-to-acknowledge latency: "N", "MIN..MAX" or "never".
    #[arg(long, value_name = "TICKS")]
    reset_ticks: Option<Latency>,

    /// How core done/ack signals are sampled: "pulse" or "level".
    #[arg(long)]
    done_sampling: Option<DoneSampling>,

    /// PRNG seed for latency draws.
    #[arg(long, env = "DISPATCH_SIM_SEED")]
    seed: Option<u32>,

    /// Watchdog bound in ticks (0 disables the watchdog).
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Print trace events to stderr.
    #[arg(long)]
    dump_trace: bool,

    /// Write the trace as JSON to a file.
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Enable verbose output. Specify multiple times to increase verbosity.
    /// Ignored when RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn build_scenario(cli: &Cli) -> Result<Scenario> {
    let mut builder = Scenario::builder();

    if let Some(path) = &cli.config {
        let file = ScenarioFile::load(path)?;
        builder = file
            .apply(builder)
            .with_context(|| format!("invalid scenario in {}", path.display()))?;
    }

    if let Some(n) = cli.cores {
        builder = builder.cores(n);
    }
    if let Some(n) = cli.blocks {
        builder = builder.blocks(n);
    }
    if let Some(n) = cli.warps_per_block {
        builder = builder.warps_per_block(n);
    }
    if let Some(latency) = cli.run_ticks {
        builder = builder.run_ticks(latency);
    }
    if let Some(latency) = cli.reset_ticks {
        builder = builder.reset_ticks(latency);
    }
    if let Some(sampling) = cli.done_sampling {
        builder = builder.done_sampling(sampling);
    }
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    match cli.max_ticks {
        Some(0) => builder = builder.no_watchdog(),
        Some(n) => builder = builder.max_ticks(Some(n)),
        None => {}
    }

    Ok(builder.build()?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    init_tracing(level);

    let scenario = build_scenario(&cli)?;
    let nr_cores = scenario.nr_cores;
    let total_blocks = scenario.total_blocks();

    let trace = Simulator::new(scenario).run();

    if cli.dump_trace {
        trace.dump();
    }

    if let Some(path) = &cli.json {
        let json = serde_json::to_string_pretty(&trace.to_json())?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    }

    let stats = TraceStats::from_trace(&trace);
    println!(
        "cores={nr_cores} blocks={total_blocks} ticks={} exit={}",
        trace.ticks(),
        trace.exit_kind()
    );
    for (i, core) in stats.cores.iter().enumerate() {
        println!(
            "  core{i:<3} blocks={:<5} busy={:<7} util={:.1}%",
            core.blocks,
            core.busy_ticks,
            stats.utilization(CoreId(i as u32)) * 100.0
        );
    }
    println!("  block latency:   {}", stats.block_latency);
    println!("  reclaim latency: {}", stats.reclaim_latency);

    if trace.has_error() {
        bail!("simulation failed: {}", trace.exit_kind());
    }
    Ok(())
}
