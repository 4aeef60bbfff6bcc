//! Weather CLI
//!
//! Offline tooling around the aggregation core: derive view keys for a
//! timestamp and preview how a rain histogram resamples.
//!
//! # Usage
//!
//! ```bash
//! weather --help
//! weather keys --device station-1 --at 2025-09-11T00:15:00+02:00
//! weather resample --file rain.json --target 300
//! ```

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::chrono::{DateTime, FixedOffset, Utc};
use shared::models::RainHistogram;
use shared::resampler::{affected_hour_buckets, resample};
use shared::validator::Validate;
use shared::view_id::ViewId;
use std::path::PathBuf;

/// Weather CLI - offline tooling for the weather station worker
#[derive(Parser)]
#[command(name = "weather")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter, e.g. `debug` or `shared=trace`
    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the storage keys a reading at a given time lands in
    Keys {
        /// Device id
        #[arg(short, long)]
        device: String,
        /// RFC 3339 timestamp, any offset
        #[arg(short, long)]
        at: DateTime<FixedOffset>,
    },
    /// Resample a rain histogram JSON file to a bucket width
    Resample {
        /// Path to a rain histogram JSON document
        #[arg(short, long)]
        file: PathBuf,
        /// Target bucket width in seconds
        #[arg(short, long, default_value_t = 300)]
        target: u32,
    },
}

#[derive(Debug, Serialize)]
struct KeyRow {
    view: &'static str,
    key: String,
    date_id: String,
}

#[derive(Debug, Serialize)]
struct ResampleReport {
    target_seconds: u32,
    total: f64,
    buckets: Vec<(DateTime<Utc>, f64)>,
    affected_hours: Vec<DateTime<Utc>>,
}

fn keys_for(device: &str, at: &DateTime<FixedOffset>) -> Vec<KeyRow> {
    [
        ("latest", ViewId::latest(device)),
        ("hourly", ViewId::hourly(device, at)),
        ("daily", ViewId::daily(device, at)),
        ("weekly", ViewId::weekly(device, at)),
        ("monthly", ViewId::monthly(device, at)),
    ]
    .into_iter()
    .map(|(view, id)| KeyRow {
        view,
        key: id.key,
        date_id: id.date_id,
    })
    .collect()
}

fn resample_report(hist: &RainHistogram, target: u32) -> Result<ResampleReport> {
    hist.validate().context("Invalid rain histogram")?;
    let buckets = resample(hist, hist.value_per_unit, target)?;
    let affected_hours = affected_hour_buckets(&buckets).into_iter().collect();
    Ok(ResampleReport {
        target_seconds: target,
        total: buckets.values().sum(),
        buckets: buckets.into_iter().collect(),
        affected_hours,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cli.log))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Keys { device, at }) => {
            tracing::debug!(%device, %at, "Deriving view keys");
            let rows = keys_for(&device, &at);
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Some(Commands::Resample { file, target }) => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let hist: RainHistogram = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            tracing::debug!(
                interval = hist.interval_seconds,
                slots = hist.slot_count(),
                target,
                "Resampling histogram"
            );
            let report = resample_report(&hist, target)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        None => {
            println!("Weather CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
