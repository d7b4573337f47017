//! Host runner for the SDRAM integrity engine.
//!
//! Builds an engine configuration from an optional JSON file plus command-line
//! overrides, drives it against the simulated DMA controller and prints the
//! final report and a host status line.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use integrity_core::sim::DEFAULT_MAX_EVENTS;
use integrity_core::{
    drive, EngineConfig, FaultEntry, FaultTrigger, IntegrityEngine, PassAccounting, SimConfig,
    SimulatedDma,
};

/// Binary name.
pub const APP_NAME: &str = "sdram-integrity";

/// Faults scheduled by `--inject` when no explicit `--fault` is given.
const DEFAULT_INJECTED_FAULTS: usize = 5;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AccountingArg {
    /// Undo the wrap caused by rewriting the last block.
    Adjust,
    /// Count every wrap.
    CountAll,
}

impl From<AccountingArg> for PassAccounting {
    fn from(arg: AccountingArg) -> Self {
        match arg {
            AccountingArg::Adjust => Self::AdjustOnWrap,
            AccountingArg::CountAll => Self::CountEveryWrap,
        }
    }
}

/// Fill external memory with a sentinel, verify it through CRC-checked DMA
/// reads and rewrite corrupted blocks.
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(version)]
struct Cli {
    /// JSON engine configuration; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Region size in 32-bit elements
    #[arg(long)]
    region_words: Option<usize>,

    /// Payload elements per block transfer
    #[arg(long)]
    block_words: Option<usize>,

    /// Guard elements after each block
    #[arg(long)]
    guard_words: Option<usize>,

    /// Read passes to complete
    #[arg(long)]
    passes: Option<u32>,

    /// Enable fault injection (evenly spread first-pass faults unless --fault is given)
    #[arg(long)]
    inject: bool,

    /// Scheduled fault, `<every|pass:N|read:N>@<offset>[=<value>]`; implies --inject
    #[arg(long = "fault", value_name = "ENTRY")]
    faults: Vec<FaultEntry>,

    /// Pass counter behaviour when the last block of a pass is rewritten
    #[arg(long, value_enum)]
    pass_accounting: Option<AccountingArg>,

    /// Tick period of the simulated runtime in microseconds
    #[arg(long, default_value_t = SimConfig::default().tick_period_us)]
    tick_us: u64,

    /// Latency of one simulated block transfer in microseconds
    #[arg(long, default_value_t = SimConfig::default().transfer_latency_us)]
    latency_us: u64,

    /// Give up after this many events
    #[arg(long, default_value_t = DEFAULT_MAX_EVENTS)]
    max_events: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn spread_faults(region_words: usize) -> Vec<FaultEntry> {
    (0..DEFAULT_INJECTED_FAULTS)
        .map(|index| {
            let offset = (2 * index + 1) * region_words / (2 * DEFAULT_INJECTED_FAULTS);
            FaultEntry::new(FaultTrigger::Pass(0), offset)
        })
        .collect()
}

fn engine_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Some(region_words) = cli.region_words {
        config.region_words = region_words;
    }
    if let Some(block_words) = cli.block_words {
        config.block_words = block_words;
    }
    if let Some(guard_words) = cli.guard_words {
        config.guard_words = guard_words;
    }
    if let Some(passes) = cli.passes {
        config.pass_target = passes;
    }
    if let Some(accounting) = cli.pass_accounting {
        config.pass_accounting = accounting.into();
    }

    if cli.faults.is_empty() {
        if cli.inject {
            let schedule = spread_faults(config.region_words);
            config = config.with_faults(schedule);
        }
    } else {
        config = config.with_faults(cli.faults.clone());
    }

    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    let config = engine_config(&cli)?;
    let mut engine = IntegrityEngine::initialize(config).context("engine startup failed")?;
    let mut dma = SimulatedDma::new(SimConfig {
        tick_period_us: cli.tick_us,
        transfer_latency_us: cli.latency_us,
    });

    let events = drive(&mut engine, &mut dma, cli.max_events)?;
    tracing::info!(events, sim_ms = dma.clock().now_ms(), "run complete");

    let status = engine.on_message_event();
    let report = engine.teardown();
    if cli.json {
        let output = serde_json::json!({ "report": report, "status": status });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{report}");
        println!("status {status}");
    }

    Ok(())
}
