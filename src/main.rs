mod actors;
mod config;
mod engine;
mod models;
mod storage;
mod types;
mod views;

use std::io::{stderr, stdout, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use crate::config::PipelineConfig;
use crate::engine::Pipeline;
use crate::views::{RefreshRecord, ViewInfo};

/// Loads transactions into the fraud pipeline and prints its relations as CSV.
#[derive(Debug, Parser)]
#[command(name = "fraud-pipeline", version)]
struct Cli {
    /// error, warn, info, debug or trace. Logs are written to stderr.
    #[arg(long, global = true, default_value = "error")]
    log_level: String,

    #[command(subcommand)]
    command: Command
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a relation (the raw store or any view) as CSV.
    Query {
        relation: String,
        #[command(flatten)]
        source: Source
    },
    /// Print the status of every view.
    Views {
        #[command(flatten)]
        source: Source
    },
    /// Print the refresh history of a view.
    History {
        view: String,
        #[command(flatten)]
        source: Source
    }
}

#[derive(Debug, Args)]
struct Source {
    /// Transactions CSV to ingest.
    #[arg(long)]
    input: PathBuf,

    /// Pipeline definition; the built-in fraud pipeline when omitted.
    #[arg(long)]
    config: Option<PathBuf>
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(parse_log_level(&cli.log_level));

    match cli.command {
        Command::Query { relation, source } => {
            let pipeline = run_pipeline(&source).await?;
            let result = pipeline.catalog().query(&relation)?;

            let mut output = BufWriter::new(stdout().lock());
            result.write_csv(&mut output)?;
            output.flush()?;

            pipeline.shutdown().await;
        }
        Command::Views { source } => {
            let pipeline = run_pipeline(&source).await?;

            write_view_status(&pipeline.catalog().list_views(Utc::now()))?;

            pipeline.shutdown().await;
        }
        Command::History { view, source } => {
            let pipeline = run_pipeline(&source).await?;

            write_refresh_history(&pipeline.catalog().refresh_history(&view)?)?;

            pipeline.shutdown().await;
        }
    }

    Ok(())
}

fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to 'error'", level);
            LevelFilter::ERROR
        }
    }
}

fn setup_logging(level: LevelFilter) {
    //NOTE: stdout carries the CSV output, logging goes to stderr
    let terminal_log = fmt::layer()
        .with_target(false)
        .with_writer(stderr)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(terminal_log)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    Ok(match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::builtin()?
    })
}

/// Builds the pipeline, ingests the input and leaves every view fully refreshed.
async fn run_pipeline(source: &Source) -> Result<Pipeline> {
    let config = load_config(source.config.as_deref())?;
    let mut pipeline = Pipeline::new(&config)?;
    pipeline.start(config.refresh.tick());

    let timer = Instant::now();
    let report = pipeline.ingest_csv(&source.input).await;
    let records = pipeline.refresh_all();

    info!(
        "Ingested {} transactions ({} rejected) and refreshed {} views in: {:?}",
        report.accepted,
        report.rejected.len(),
        records.len(),
        timer.elapsed()
    );

    Ok(pipeline)
}

fn write_view_status(views: &[ViewInfo]) -> Result<()> {
    let mut output = csv::Writer::from_writer(BufWriter::new(stdout().lock()));

    output.write_record([
        "name",
        "kind",
        "sources",
        "target_lag",
        "refresh_mode",
        "scheduling",
        "last_refreshed_at",
        "last_outcome",
        "row_count",
        "staleness_ms",
        "staleness_exceeded"
    ])?;

    for view in views {
        output.write_record([
            view.name.clone(),
            view.kind.to_string(),
            view.sources.join(";"),
            view.target_lag.to_string(),
            view.refresh_mode.as_str().to_string(),
            view.scheduling.to_string(),
            view.last_refreshed_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
            view.last_outcome.as_ref().map(ToString::to_string).unwrap_or_default(),
            view.row_count.to_string(),
            view.staleness.as_millis().to_string(),
            view.staleness_exceeded.to_string()
        ])?;
    }

    output.flush()?;

    Ok(())
}

fn write_refresh_history(records: &[RefreshRecord]) -> Result<()> {
    let mut output = csv::Writer::from_writer(BufWriter::new(stdout().lock()));

    output.write_record(["view", "trigger", "started_at", "elapsed_us", "outcome"])?;

    for record in records {
        output.write_record([
            record.view.clone(),
            format!("{:?}", record.trigger),
            record.started_at.to_rfc3339(),
            record.elapsed.as_micros().to_string(),
            record.outcome.to_string()
        ])?;
    }

    output.flush()?;

    Ok(())
}
