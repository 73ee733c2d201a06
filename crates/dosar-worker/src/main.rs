#![forbid(unsafe_code)]

//! **dosar-worker** – Single-instance ingest worker.
//!
//! Polls the job queue (default every 2 seconds), leases the oldest queued
//! job, and drives it through the ingest pipeline. Job-level failures are
//! recorded on the job row; only infrastructure errors (database or blob
//! store unreachable) surface here, and the loop backs off and retries
//! rather than exiting.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dosar_blob::BlobStore;
use dosar_ingest::{DateOrder, JobRunner};
use dosar_store::Store;

#[derive(Parser)]
#[command(name = "dosar-worker")]
#[command(about = "Dosar ingest worker - processes queued transcript jobs")]
#[command(version)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Root of the content-addressed object store
    #[arg(long, env = "OBJECT_STORE_PATH", default_value = "/data/object-store")]
    object_store_path: PathBuf,

    /// Staging area for upload chunks
    #[arg(long, env = "UPLOAD_PATH", default_value = "/data/uploads")]
    upload_path: PathBuf,

    /// Seconds to sleep when the queue is empty
    #[arg(long, env = "DOSAR_POLL_INTERVAL_SECS", default_value = "2")]
    poll_interval_secs: u64,

    /// Day-first (DMY) or month-first (MDY) date disambiguation
    #[arg(long, env = "DOSAR_DATE_ORDER", default_value = "DMY")]
    date_order: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    info!("starting dosar-worker v{}", env!("CARGO_PKG_VERSION"));

    let store = Store::connect(&cli.database_url)
        .await
        .context("connect to database")?;
    let blob = BlobStore::open(&cli.object_store_path, &cli.upload_path)
        .context("open object store")?;
    let runner = JobRunner::new(store, blob, DateOrder::from_config(&cli.date_order));
    let poll_interval = Duration::from_secs(cli.poll_interval_secs.max(1));

    info!(
        poll_interval_secs = poll_interval.as_secs(),
        "worker loop started"
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            ran = runner.run_next_job() => {
                match ran {
                    Ok(true) => {} // keep draining without sleeping
                    Ok(false) => tokio::time::sleep(poll_interval).await,
                    Err(err) => {
                        error!("worker iteration failed: {err:#}");
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
        }
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dosar={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
