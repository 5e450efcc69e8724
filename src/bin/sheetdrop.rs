use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sheetdrop::config::AppConfig;
use sheetdrop::decode::DecoderRegistry;
use sheetdrop::jobs::{JobDefaults, JobRegistry};
use sheetdrop::ledger::{self, StatusRecord};
use sheetdrop::persist::{PersistenceDispatcher, StoreFactory};
use sheetdrop::pipeline::{Pipeline, UploadStore};
use sheetdrop::telemetry;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "sheetdrop", about = "Validate and persist spreadsheet uploads", version)]
struct Cli {
    /// Path to config file (environment overrides use the SHEETDROP_ prefix)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered jobs and definitions that failed to load
    Jobs,
    /// Submit a file to a job and wait for its terminal status
    Ingest { job_id: String, file: PathBuf },
    /// Print the latest status of a job
    Status { job_id: String },
    /// Print the full status history of a job
    History { job_id: String },
    /// Delete uploads left behind by jobs that did not finish
    CleanUploads {
        /// Only delete uploads at least this many seconds old
        #[arg(long, default_value_t = 3600)]
        older_than_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_telemetry().map_err(|e| anyhow::anyhow!(e))?;

    let cli = Cli::parse();
    let result = run(cli).await;

    telemetry::shutdown_telemetry();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;

    let defaults = JobDefaults {
        default_provider: config.storage.default_provider,
    };
    let (registry, errors) = JobRegistry::load_dir(&config.paths.jobs_dir, &defaults)?;

    if let Command::Jobs = cli.command {
        for job_id in registry.job_ids() {
            println!("{}", job_id);
        }
        for error in &errors {
            eprintln!("excluded: {}", error);
        }
        return Ok(());
    }

    if let Command::CleanUploads { older_than_secs } = cli.command {
        let uploads = UploadStore::new(&config.paths.temp_dir);
        let removed = uploads
            .clear_stale(Duration::from_secs(older_than_secs))
            .await?;
        println!("removed {} upload(s) from {}", removed, uploads.dir().display());
        return Ok(());
    }

    let ledger = ledger::connect(&config.ledger).await?;

    let result = match cli.command {
        Command::Jobs | Command::CleanUploads { .. } => Ok(()),
        Command::Status { job_id } => match ledger.latest(&job_id).await? {
            Some(record) => {
                print_record(&record);
                Ok(())
            }
            None => {
                println!("{}: no status recorded", job_id);
                Ok(())
            }
        },
        Command::History { job_id } => {
            for record in ledger.history(&job_id).await? {
                print_record(&record);
            }
            Ok(())
        }
        Command::Ingest { job_id, file } => {
            let uploads = UploadStore::new(&config.paths.temp_dir);
            let pipeline = Pipeline::new(
                registry,
                DecoderRegistry::new(),
                PersistenceDispatcher::new(StoreFactory::new(&config.storage)),
                ledger.clone(),
                uploads,
            );
            ingest(&pipeline, &job_id, &file).await
        }
    };

    if let Err(e) = ledger.close().await {
        tracing::error!("Error closing ledger: {}", e);
    }
    result
}

async fn ingest(pipeline: &Pipeline, job_id: &str, file: &Path) -> Result<()> {
    let now = Instant::now();
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let status = pipeline.submit(job_id, &bytes).await?.await?;
    tracing::info!(job_id, status = %status, "Ingest finished in {}ms", now.elapsed().as_millis());

    if let Some(record) = pipeline.latest_status(job_id).await? {
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &StatusRecord) {
    println!(
        "{} #{} {} {}",
        record.job_id,
        record.sequence_no,
        record.status,
        record.created_at.to_rfc3339()
    );
    for detail in &record.detail_messages {
        println!("  {}", detail);
    }
}
