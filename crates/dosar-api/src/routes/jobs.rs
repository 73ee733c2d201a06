//! Ingest-job endpoints. Jobs are created `queued` here and picked up by the
//! worker's polling loop.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use dosar_types::IngestJob;

use crate::error::ApiError;
use crate::state::AppState;

const PREVIEW_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct IngestJobCreate {
    pub source_file_id: Uuid,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<IngestJobCreate>,
) -> Result<Json<IngestJob>, ApiError> {
    // 404 on a dangling source id, before the insert.
    state.store.get_source_file(payload.source_file_id).await?;
    let job = state.store.create_job(payload.source_file_id).await?;
    Ok(Json(job))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<IngestJob>>, ApiError> {
    Ok(Json(state.store.list_jobs().await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<IngestJob>, ApiError> {
    Ok(Json(state.store.get_job(id).await?))
}

pub async fn preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.store.get_job(id).await?;
    let events = state
        .store
        .preview_events_for_source(job.source_file_id, PREVIEW_LIMIT)
        .await?;
    Ok(Json(json!({
        "job_id": job.id,
        "status": job.status,
        "events": events,
        "updated_at": Utc::now(),
    })))
}
