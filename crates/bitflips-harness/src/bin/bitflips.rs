//! CLI binary for the bitflips SEU engine.
//!
//! # Usage
//!
//! ```bash
//! # Inject 0.5 faults/KB/tick into the regions of a scenario
//! bitflips run --scenario matrix.json --fault-rate 0.5 --verbose
//!
//! # Start disarmed, Poisson fault counts, fixed seed
//! bitflips run --scenario matrix.json --inject-faults no --poisson --seed 7
//!
//! # Show float regions' flips as decimal values
//! bitflips run --scenario matrix.json --verbose | bitflips decode
//! ```
//!
//! Flip records go to stdout; the configuration echo and the summary go
//! to stderr.

use bitflips_fault::report::WriterSink;
use bitflips_harness::decode::{decode_stream, DecodeError};
use bitflips_harness::driver::{format_config, run_scenario};
use bitflips_harness::scenario::{load_scenario, Overrides, Scenario, ScenarioError};
use clap::{Parser, Subcommand};
use snafu::Snafu;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// CLI errors for the bitflips binary.
#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("{source}"), context(false))]
    Scenario { source: ScenarioError },
    #[snafu(display("{source}"), context(false))]
    Decode { source: DecodeError },
    #[snafu(display("I/O error"), context(false))]
    Io { source: std::io::Error },
}

#[derive(Parser)]
#[command(name = "bitflips")]
#[command(about = "Inject single event upsets into guest memory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine over a scenario.
    Run {
        /// Scenario file (JSON) with regions and control events.
        #[arg(long)]
        scenario: Option<PathBuf>,

        /// Faults per kilobyte per tick.
        #[arg(short = 'r', long)]
        fault_rate: Option<f64>,

        /// Whether injection starts armed: "yes" or "no".
        #[arg(long, value_parser = parse_yes_no)]
        inject_faults: Option<bool>,

        /// Random seed for reproducibility.
        #[arg(short, long)]
        seed: Option<u32>,

        /// Print one line per flip.
        #[arg(short, long)]
        verbose: bool,

        /// Number of ticks to run.
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Bytes of guest memory to map.
        #[arg(long)]
        memory_size: Option<usize>,

        /// Draw per-tick fault counts from a Poisson distribution.
        #[arg(long)]
        poisson: bool,
    },

    /// Rewrite float words of diagnostic lines on stdin as decimals.
    Decode,
}

fn parse_yes_no(s: &str) -> Result<bool, String> {
    match s {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(format!("expected 'yes' or 'no', got '{other}'")),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            scenario,
            fault_rate,
            inject_faults,
            seed,
            verbose,
            ticks,
            memory_size,
            poisson,
        } => cmd_run(
            scenario,
            Overrides {
                fault_rate,
                inject_faults,
                seed,
                verbose,
                poisson,
                ticks,
                memory_size,
            },
        ),
        Commands::Decode => cmd_decode(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(scenario_path: Option<PathBuf>, overrides: Overrides) -> Result<(), CliError> {
    let scenario = match scenario_path {
        Some(path) => load_scenario(&path)?,
        None => Scenario::default(),
    };
    let options = scenario.resolve(&overrides);

    eprintln!("{}", format_config(&options.config));

    let stdout = io::stdout();
    let mut sink = WriterSink::new(BufWriter::new(stdout.lock()));
    let outcome = run_scenario(&scenario, &options, &mut sink)?;

    let write_errors = sink.errors();
    sink.into_inner().flush()?;
    if write_errors > 0 {
        log::warn!("{write_errors} flip records could not be written");
    }

    eprintln!("{}", outcome.summary);
    Ok(())
}

fn cmd_decode() -> Result<(), CliError> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let stats = decode_stream(stdin.lock(), BufWriter::new(stdout.lock()))?;
    log::info!(
        "decoded {} lines ({} rewritten, {} malformed)",
        stats.lines,
        stats.rewritten,
        stats.malformed
    );
    Ok(())
}
