#![forbid(unsafe_code)]

//! **dosar-api** – HTTP surface for the Dosar ingest store.
//!
//! Stateless JSON API over the relational store and the blob store: chunked
//! uploads, ingest-job management, event queries with dictionary joins,
//! raw-line evidence retrieval, report-pack generation, and player/alias
//! search. The ingest pipeline itself runs in the separate `dosar-worker`
//! binary; this process only reads what the worker wrote, plus the upload
//! and job-creation writes.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use axum::routing::{get, post, put};
use axum::Router;
use clap::Parser;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dosar_blob::BlobStore;
use dosar_store::Store;
use dosar_upload::UploadCoordinator;

mod error;
mod routes;
mod state;

use state::AppState;

#[derive(Parser)]
#[command(name = "dosar-api")]
#[command(about = "Dosar API - transcript ingest and evidence service")]
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

    /// Comma-separated CORS origin allow-list; `*` permits any origin
    #[arg(long, env = "CORS_ALLOW_ORIGINS", default_value = "*")]
    cors_allow_origins: String,

    /// Listen address
    #[arg(long, env = "DOSAR_API_LISTEN", default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    info!("starting dosar-api v{}", env!("CARGO_PKG_VERSION"));

    let store = Store::connect(&cli.database_url)
        .await
        .context("connect to database")?;
    let blob = BlobStore::open(&cli.object_store_path, &cli.upload_path)
        .context("open object store")?;
    let uploads = UploadCoordinator::new(store.clone(), blob.clone());
    let state = AppState {
        store,
        blob,
        uploads,
    };

    let cors = cors_layer(&cli.cors_allow_origins)?;
    let app = router(state, cors);

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("bind {}", cli.listen))?;
    info!("listening on {}", cli.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/uploads/create", post(routes::uploads::create))
        .route("/uploads/:id/chunk", put(routes::uploads::put_chunk))
        .route("/uploads/:id/finalize", post(routes::uploads::finalize))
        .route(
            "/ingest-jobs",
            post(routes::jobs::create).get(routes::jobs::list),
        )
        .route("/ingest-jobs/:id", get(routes::jobs::get_one))
        .route("/ingest-jobs/:id/preview", get(routes::jobs::preview))
        .route("/events", get(routes::events::list))
        .route("/events/:id", get(routes::events::get_one))
        .route("/evidence/raw-line", get(routes::evidence::raw_line))
        .route(
            "/report-packs",
            post(routes::reports::create).get(routes::reports::list),
        )
        .route("/report-packs/:id", get(routes::reports::get_one))
        .route("/search", get(routes::search::search))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(allow_origins: &str) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allow_origins.trim() == "*" || allow_origins.trim().is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let origins = allow_origins
        .split(',')
        .map(|origin| {
            origin
                .trim()
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dosar={level},tower_http={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {err}");
        return;
    }
    info!("shutdown signal received");
}
