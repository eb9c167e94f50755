//! Command-line interface for writing snapshots, reading panels and
//! evaluating scored lists.

use clap::{Parser, Subcommand};
use colored::*;
use chrono::NaiveDate;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::metrics::{RankingMetrics, RankingSummary};
use crate::spacetime::{AggregateSpec, AggregatorConfig, EventAggregation, SpacetimeAggregator};
use crate::storage::{LocalSnapshotStore, SnapshotStore};
use crate::utils::{DataLoader, DataSaver};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string())
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "spacetime-panel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Spacetime aggregation snapshots and ranking evaluation")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Aggregate events and write one snapshot per date
    Write {
        /// Aggregator configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Event table (CSV, JSON, or Parquet)
        #[arg(short, long)]
        events: PathBuf,

        /// Event timestamp column
        #[arg(long)]
        date_column: String,

        /// Metric definitions (JSON list)
        #[arg(short, long)]
        metrics: PathBuf,

        /// Snapshot directory
        #[arg(short, long)]
        basedir: PathBuf,

        /// Write only this date instead of every configured date
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Skip dates that already have a snapshot
        #[arg(long)]
        missing_only: bool,
    },

    /// Read stored snapshots into a panel
    Read {
        /// Aggregator configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Snapshot directory
        #[arg(short, long)]
        basedir: PathBuf,

        /// Output file (CSV, JSON, or Parquet)
        #[arg(short, long)]
        output: PathBuf,

        /// Entity-date table restricting the rows read
        #[arg(long)]
        left: Option<PathBuf>,

        /// Keep the long snapshot layout instead of pivoting
        #[arg(long)]
        long: bool,
    },

    /// List stored snapshot dates
    Info {
        /// Snapshot directory
        #[arg(short, long)]
        basedir: PathBuf,

        /// Snapshot prefix
        #[arg(short, long)]
        prefix: String,
    },

    /// Ranking metrics for a scored table
    Evaluate {
        /// Input data file (CSV, JSON, or Parquet)
        #[arg(short, long)]
        data: PathBuf,

        /// Label column (0, 1 or missing)
        #[arg(long, default_value = "label")]
        label: String,

        /// Score column
        #[arg(long, default_value = "score")]
        score: String,

        /// Cut-offs for precision at k
        #[arg(short, long, value_delimiter = ',', default_value = "10,100")]
        k: Vec<usize>,

        /// Count unlabeled examples inside the cut and report bounds
        #[arg(long)]
        extrapolate: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

// ─── Write ─────────────────────────────────────────────────────────────────────

pub fn cmd_write(
    config_path: &Path,
    events_path: &Path,
    date_column: &str,
    metrics_path: &Path,
    basedir: &Path,
    date: Option<NaiveDate>,
    missing_only: bool,
) -> anyhow::Result<()> {
    section("Write");

    let config = AggregatorConfig::from_json_file(config_path)?;
    let spec = AggregateSpec::from_json_str(&std::fs::read_to_string(metrics_path)?)?;
    step_ok(&format!(
        "{} {} metrics, {} spaces, {} dates",
        config.prefix.cyan(),
        spec.metrics().len(),
        config.spacedeltas.len(),
        config.dates.len()
    ));

    step_run("Loading events");
    let start = Instant::now();
    let events = DataLoader::new().load_auto(events_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", events.height(), events.width(), start.elapsed()));

    let source = EventAggregation::new(events, date_column, spec)?;
    let aggregator = SpacetimeAggregator::new(config, source, LocalSnapshotStore::new(basedir))?;

    let dates = match date {
        Some(date) => vec![date],
        None if missing_only => aggregator.missing_dates()?,
        None => aggregator.config().dates.clone(),
    };
    if dates.is_empty() {
        step_ok("Nothing to write");
        return Ok(());
    }

    step_run(&format!("Aggregating {} dates", dates.len()));
    let start = Instant::now();
    aggregator.write_dates(&dates)?;
    step_done(&format!("{:?}", start.elapsed()));

    step_ok(&format!("Snapshots in {}", basedir.join(aggregator.prefix()).display()));
    println!();
    Ok(())
}

// ─── Read ──────────────────────────────────────────────────────────────────────

/// Source for reading only; snapshots come from storage
struct StoredOnly;

impl crate::spacetime::DateAggregation for StoredOnly {
    fn aggregate(
        &self,
        date: NaiveDate,
        _spacedeltas: &crate::spacetime::SpacedeltaMap,
    ) -> crate::error::Result<DataFrame> {
        Err(crate::error::PanelError::InvalidInput(format!(
            "No event source configured to aggregate {}",
            date
        )))
    }
}

pub fn cmd_read(
    config_path: &Path,
    basedir: &Path,
    output: &Path,
    left_path: Option<&Path>,
    long: bool,
) -> anyhow::Result<()> {
    section("Read");

    let config = AggregatorConfig::from_json_file(config_path)?;
    let aggregator = SpacetimeAggregator::new(config, StoredOnly, LocalSnapshotStore::new(basedir))?;

    let left = left_path
        .map(|path| DataLoader::new().load_auto(path))
        .transpose()?;

    step_run(&format!("Reading {} dates", aggregator.config().dates.len()));
    let start = Instant::now();
    let mut panel = aggregator.read(left.as_ref(), !long)?;
    step_done(&format!("{} rows × {} cols in {:?}", panel.height(), panel.width(), start.elapsed()));

    DataSaver::save_auto(&mut panel, output)?;
    step_ok(&format!("Saved to {}", output.display()));
    println!();
    Ok(())
}

// ─── Info ──────────────────────────────────────────────────────────────────────

pub fn cmd_info(basedir: &Path, prefix: &str) -> anyhow::Result<()> {
    section("Snapshots");

    let store = LocalSnapshotStore::new(basedir);
    println!("  {:<12} {}", muted("Directory"), basedir.join(prefix).display());

    if !store.exists(prefix) {
        println!("  {:<12} {}", muted("Status"), "missing".yellow());
        println!();
        return Ok(());
    }

    let dates = store.dates(prefix)?;
    println!("  {:<12} {}", muted("Snapshots"), dates.len());
    println!();
    for date in dates {
        println!("  {}", date);
    }
    println!();
    Ok(())
}

// ─── Evaluate ──────────────────────────────────────────────────────────────────

fn float_column(df: &DataFrame, name: &str) -> anyhow::Result<Vec<f64>> {
    let series = df
        .column(name)
        .map_err(|_| anyhow::anyhow!("Column '{}' not found", name))?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

pub fn cmd_evaluate(
    data_path: &Path,
    label: &str,
    score: &str,
    ks: &[usize],
    extrapolate: bool,
    json: bool,
) -> anyhow::Result<()> {
    let df = DataLoader::new().load_auto(data_path)?;
    let metrics = RankingMetrics::from_slices(&float_column(&df, label)?, &float_column(&df, score)?)?;
    let summary = RankingSummary::compute(&metrics, ks, extrapolate)?;

    if json {
        println!("{}", summary.to_json()?);
        return Ok(());
    }

    section("Evaluate");
    println!("  {:<12} {}", muted("Rows"), summary.count);
    println!("  {:<12} {}", muted("Labeled"), summary.labeled);
    println!("  {:<12} {}", muted("Baseline"), fmt_opt(summary.baseline));
    println!("  {:<12} {}", muted("AUC"), fmt_opt(summary.auc));
    println!();

    println!("  {:>8} {:>10} {:>8} {:>20}", muted("k"), muted("Precision"), muted("Labeled"), muted("Bounds"));
    println!("  {}", dim(&"─".repeat(50)));
    for p in &summary.precision {
        let bounds = p
            .bounds
            .map(|(lo, hi)| format!("[{:.4}, {:.4}]", lo, hi))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:>8} {:>10} {:>8} {:>20}", p.k, fmt_opt(p.precision), p.labeled, bounds);
    }
    println!();
    Ok(())
}
