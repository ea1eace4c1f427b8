//! Catalog Ingest - command line CSV ingestion

use anyhow::{Context, Result};
use catalog_common::logging::{init_logging, LogConfig, LogLevel};
use catalog_ingest::config::{BatchFailurePolicy, DecoderConfig, PipelineConfig, ShortRowPolicy};
use catalog_ingest::decoder::CsvDecoder;
use catalog_ingest::models::ProgressEvent;
use catalog_ingest::store::{InMemoryProductStore, PgProductStore, ProductStore};
use catalog_ingest::CsvProcessor;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog-ingest")]
#[command(author, version, about = "Product catalog CSV ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one or more CSV files
    Process {
        /// File identifiers, relative to the base directory
        #[arg(required = true)]
        files: Vec<String>,

        /// Directory the file identifiers are resolved against
        #[arg(short = 'd', long, env = "CSV_BASE_DIR", default_value = ".")]
        base_dir: PathBuf,

        /// Number of concurrent workers per file
        #[arg(short, long, env = "WORKER_COUNT", default_value_t = 4)]
        workers: usize,

        /// Products per bulk upsert
        #[arg(short = 'b', long, env = "BATCH_SIZE", default_value_t = 100)]
        batch_size: usize,

        /// Rows with too few columns: skip or fail
        #[arg(long, env = "SHORT_ROW_POLICY", default_value = "skip")]
        short_rows: ShortRowPolicy,

        /// Failed bulk upserts: count_as_failed or log_only
        #[arg(long, env = "BATCH_FAILURE_POLICY", default_value = "count_as_failed")]
        batch_failure: BatchFailurePolicy,

        /// Use a throwaway in-memory store instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,

        /// PostgreSQL connection string
        #[arg(long, env = "DATABASE_URL", required_unless_present = "in_memory")]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("catalog-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Process {
            files,
            base_dir,
            workers,
            batch_size,
            short_rows,
            batch_failure,
            in_memory,
            database_url,
        } => {
            let store: Arc<dyn ProductStore> = match database_url.filter(|_| !in_memory) {
                Some(url) => Arc::new(connect(&url).await?),
                None => {
                    info!("Using in-memory store; nothing will be persisted");
                    Arc::new(InMemoryProductStore::new())
                },
            };

            let decoder = CsvDecoder::new(
                DecoderConfig::default()
                    .with_base_dir(base_dir)
                    .with_short_row_policy(short_rows),
            );

            let config = PipelineConfig::default()
                .with_worker_count(workers)
                .with_batch_size(batch_size)
                .with_batch_failure_policy(batch_failure);

            let processor = CsvProcessor::new(store, Arc::new(decoder), config);

            let (progress_tx, progress_rx) = mpsc::channel(100);
            let renderer = tokio::spawn(render_progress(progress_rx));

            let report = processor.process_files(&files, Some(progress_tx)).await?;
            renderer.await.context("Progress renderer failed")?;

            info!(
                total = report.total_records,
                inserted = report.inserted,
                updated = report.updated,
                failed = report.failed,
                "Ingestion complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
    }

    Ok(())
}

async fn connect(database_url: &str) -> Result<PgProductStore> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(PgProductStore::new(pool))
}

/// One progress bar per file, advanced by the collector's progress events
async fn render_progress(mut events: mpsc::Receiver<ProgressEvent>) {
    let mut current: Option<(String, ProgressBar)> = None;

    while let Some(event) = events.recv().await {
        let same_file = matches!(&current, Some((file, _)) if *file == event.file);
        if !same_file {
            if let Some((_, bar)) = current.take() {
                bar.finish();
            }
            current = Some((event.file.clone(), file_bar(&event)));
        }

        if let Some((_, bar)) = &current {
            bar.set_position(event.processed as u64);
            bar.set_message(format!(
                "{} (inserted {}, updated {}, failed {})",
                event.file, event.inserted, event.updated, event.failed
            ));
        }
    }

    if let Some((_, bar)) = current {
        bar.finish();
    }
}

fn file_bar(event: &ProgressEvent) -> ProgressBar {
    let bar = ProgressBar::new(event.total_records as u64);
    let style = ProgressStyle::with_template(
        "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .map(|style| style.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}
