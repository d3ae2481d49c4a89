use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use autoclave_core::{
    AutoclaveSession, ClientConfig, CycleIdentifier, DeviceAddress, TimeRange, parse_cycle_log,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Autoclave cycle retrieval tool", long_about = None)]
struct Args {
    /// Path to a TOML client configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a device answers and report its firmware and model
    Test {
        /// Device address, `host` or `host:port`
        address: DeviceAddress,
    },
    /// List cycles recorded in a date range
    Cycles {
        address: DeviceAddress,
        /// today, yesterday, week or month
        #[arg(long, default_value = "today")]
        range: TimeRange,
    },
    /// Fetch full telemetry for one cycle
    Telemetry {
        address: DeviceAddress,
        /// Cycle date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        /// Cycle number, at most five digits
        #[arg(long)]
        cycle: String,
        /// Device serial, skips a catalog lookup on Modern firmware
        #[arg(long)]
        serial: Option<String>,
    },
    /// Parse a saved cycle log file
    ParseLog { file: PathBuf },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ClientConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClientConfig::default(),
    };

    match args.command {
        Command::Test { address } => {
            let report = AutoclaveSession::new(config)?.test_connection(&address);
            print_json(&report)?;
            if !report.success {
                bail!("device {} unreachable", address);
            }
        }
        Command::Cycles { address, range } => {
            info!(address = %address, range = %range, "Listing cycles");
            let cycles = AutoclaveSession::new(config)?.cycles_for_range(&address, range)?;
            print_json(&cycles)?;
        }
        Command::Telemetry {
            address,
            date,
            cycle,
            serial,
        } => {
            let mut identifier = CycleIdentifier::from_date(date, &cycle)?;
            if let Some(serial) = serial {
                identifier = identifier.with_serial(serial);
            }
            match AutoclaveSession::new(config)?.get_telemetry(&address, &identifier)? {
                Some(telemetry) => print_json(&telemetry)?,
                None => bail!("device has no cycle {}", identifier),
            }
        }
        Command::ParseLog { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            match parse_cycle_log(&text) {
                Some(log) => print_json(&log)?,
                None => bail!("no model and cycle number found in {}", file.display()),
            }
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
