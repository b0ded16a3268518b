use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use fieldtap::{Collector, CollectorConfig, FieldMetadata, QuantaClock, SystemClock, Value};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ClockKind {
    /// Wall clock via SystemTime
    System,
    /// TSC via quanta, anchored to the wall clock at startup
    Quanta,
}

#[derive(Parser)]
#[command(name = "fieldtap")]
#[command(about = "Sample numeric fields from files into compressed time series")]
struct Cli {
    /// Field definition, `name:datatype@path+params` (repeatable)
    #[arg(long = "field", required = true)]
    fields: Vec<String>,

    /// JSON collector config; FIELDTAP_PERIOD is used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scan interval in microseconds (overrides config)
    #[arg(long)]
    interval_us: Option<u64>,

    /// Scanner read chunk size in bytes (overrides config)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Milliseconds between drains
    #[arg(long, default_value_t = 1000)]
    drain_ms: u64,

    /// Stop after this many seconds (runs until killed when absent)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Timestamp source for samples
    #[arg(long, value_enum, default_value_t = ClockKind::System)]
    clock: ClockKind,
}

#[derive(Serialize)]
struct Line<'a> {
    id: i32,
    field: &'a str,
    timestamp: u64,
    value: Value,
}

fn load_config(cli: &Cli) -> anyhow::Result<CollectorConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => CollectorConfig::from_env(),
    };
    if let Some(interval_us) = cli.interval_us {
        config.interval_us = interval_us;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    Ok(config)
}

fn print(field: &FieldMetadata, timestamp: u64, value: Value, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Text => println!("{timestamp} {} {value}", field.name),
        Format::Json => {
            let line = Line {
                id: field.id,
                field: &field.name,
                timestamp,
                value,
            };
            println!("{}", serde_json::to_string(&line)?);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let collector = Collector::new(config);
    match cli.clock {
        ClockKind::System => collector.set_clock(SystemClock),
        ClockKind::Quanta => collector.set_clock(QuantaClock::new()),
    }

    let mut active = Vec::new();
    for spec in &cli.fields {
        let field = match collector.describe(spec) {
            Ok(field) => field,
            Err(err) => {
                eprintln!("rejected {spec:?}: {err}");
                continue;
            }
        };
        match collector.activate(&field.name) {
            Ok(id) if id == field.id => active.push(field),
            Ok(id) => log::info!("{} already active as field {id}", field.name),
            Err(err) => eprintln!("could not activate {}: {err}", field.name),
        }
    }
    if active.is_empty() {
        bail!("no field could be activated");
    }

    let drain_every = Duration::from_millis(cli.drain_ms.max(1));
    let stop_at = cli
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let done = stop_at.is_some_and(|stop_at| Instant::now() >= stop_at);
        if !done {
            thread::sleep(drain_every);
        }
        for field in &active {
            for sample in collector.drain(field.id) {
                print(field, sample.timestamp, sample.value.typed(field.datatype), cli.format)?;
            }
        }
        if done {
            break;
        }
    }

    collector.shutdown();
    Ok(())
}
