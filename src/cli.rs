//! CLI definition and dispatch.

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvAdapter, TIMESTAMP_FORMAT, write_targets};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::build_engine_config;
use crate::domain::engine::{Engine, EngineConfig};
use crate::domain::error::EngineError;
use crate::domain::replay::{ReplaySummary, replay};
use crate::domain::universe::{fetch_histories, parse_assets};
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "confluence", about = "Adaptive technical-signal alpha and portfolio targets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay CSV bar histories and emit target weights
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory holding one <ASSET>.csv per asset
        #[arg(short, long)]
        data: PathBuf,
        /// Comma-separated assets; defaults to every CSV in the data directory
        #[arg(short, long)]
        assets: Option<String>,
        /// Target CSV path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_parser = parse_timestamp)]
        start: Option<NaiveDateTime>,
        #[arg(long, value_parser = parse_timestamp)]
        end: Option<NaiveDateTime>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List assets available in a data directory
    ListAssets {
        #[arg(short, long)]
        data: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging();

    let result = match cli.command {
        Command::Replay {
            config,
            data,
            assets,
            output,
            start,
            end,
        } => run_replay(&config, data, assets.as_deref(), output.as_deref(), start, end),
        Command::Validate { config } => run_validate(&config),
        Command::ListAssets { data } => run_list_assets(data),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Install the stderr subscriber; `RUST_LOG` overrides the default filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,confluence=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Accepts `YYYY-MM-DD HH:MM:SS` or a bare `YYYY-MM-DD` (midnight).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| format!("invalid timestamp '{value}', expected YYYY-MM-DD[ HH:MM:SS]"))
}

pub fn load_config(path: &Path) -> Result<EngineConfig, EngineError> {
    eprintln!("Loading config from {}", path.display());
    let adapter = FileConfigAdapter::from_file(path)?;
    build_engine_config(&adapter)
}

pub fn run_replay(
    config_path: &Path,
    data_dir: PathBuf,
    assets: Option<&str>,
    output: Option<&Path>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<(), EngineError> {
    let config = load_config(config_path)?;
    let data = CsvAdapter::new(data_dir);

    let assets = match assets {
        Some(list) => parse_assets(list)?,
        None => data.list_assets()?,
    };
    if assets.is_empty() {
        return Err(EngineError::Data {
            reason: "no assets to replay".to_string(),
        });
    }

    eprintln!("Loading {} assets...", assets.len());
    let histories = fetch_histories(&data, &assets, start, end)?;
    for history in &histories {
        eprintln!("  {}: {} bars", history.asset, history.bars.len());
    }

    let mut engine = Engine::new(config)?;
    let summary = replay(&mut engine, &histories)?;

    match output {
        Some(path) => {
            let file = File::create(path)?;
            write_targets(BufWriter::new(file), &summary.rows)?;
            eprintln!("Targets written to: {}", path.display());
        }
        None => write_targets(io::stdout().lock(), &summary.rows)?,
    }
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    eprintln!("\n=== Replay Summary ===");
    eprintln!("Ticks:        {}", summary.ticks);
    eprintln!("Bars:         {}", summary.bars);
    eprintln!("Rebalances:   {}", summary.rebalances);
    eprintln!("Target rows:  {}", summary.rows.len());
}

pub fn run_validate(config_path: &Path) -> Result<(), EngineError> {
    let config = load_config(config_path)?;

    eprintln!("\n[tracker]");
    eprintln!("  lookback:          {}h", config.tracker.lookback.num_hours());
    eprintln!("  evaluation delay:  {}m", config.tracker.evaluation_delay.num_minutes());
    eprintln!(
        "  weights:           min {} / default {}",
        config.tracker.min_weight, config.tracker.default_weight
    );
    eprintln!("[aggregator]");
    eprintln!("  rebalance period:  {}h", config.aggregator.rebalance_period.num_hours());
    eprintln!("  min bars:          {}", config.aggregator.min_bars);
    eprintln!("  signal threshold:  {}", config.aggregator.min_signal_threshold);
    eprintln!("[portfolio]");
    eprintln!("  rebalance period:  {}h", config.portfolio.rebalance_period.num_hours());
    eprintln!("  max weight:        {}", config.portfolio.max_weight);
    eprintln!("  max turnover:      {}", config.portfolio.max_turnover);

    eprintln!("\nConfiguration is valid");
    Ok(())
}

pub fn run_list_assets(data_dir: PathBuf) -> Result<(), EngineError> {
    let data = CsvAdapter::new(data_dir);
    let assets = data.list_assets()?;
    if assets.is_empty() {
        eprintln!("No assets found");
    } else {
        for asset in &assets {
            println!("{asset}");
        }
        eprintln!("{} assets found", assets.len());
    }
    Ok(())
}
