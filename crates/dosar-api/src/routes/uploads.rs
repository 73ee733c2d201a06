//! Chunked upload endpoints.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use dosar_types::{SourceFile, UploadSession};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadCreate {
    pub filename: String,
    pub size: i64,
    pub chunk_size: Option<i64>,
    pub expected_chunks: Option<i32>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<UploadCreate>,
) -> Result<Json<UploadSession>, ApiError> {
    let session = state
        .uploads
        .create(
            &payload.filename,
            payload.size,
            payload.chunk_size,
            payload.expected_chunks,
        )
        .await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    pub index: i32,
}

pub async fn put_chunk(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if query.index < 0 {
        return Err(ApiError::Validation("chunk index must be non-negative".into()));
    }
    let receipt = state.uploads.put_chunk(id, query.index, &body).await?;
    Ok(Json(json!({
        "status": "ok",
        "index": receipt.index,
        "received": receipt.received,
        "received_chunks": receipt.received_chunks,
    })))
}

pub async fn finalize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SourceFile>, ApiError> {
    let source = state.uploads.finalize(id).await?;
    Ok(Json(source))
}
