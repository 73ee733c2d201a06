//! Raw-line evidence retrieval: decompress the owning block and serve the
//! exact captured line with a few lines of context.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_CONTEXT: i32 = 2;
const MAX_CONTEXT: i32 = 10;

#[derive(Debug, Deserialize)]
pub struct RawLineQuery {
    pub raw_block_id: Uuid,
    pub line_index: i32,
    pub context: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct EvidenceOut {
    pub raw_block_id: Uuid,
    pub line_index: i32,
    pub line: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

pub async fn raw_line(
    State(state): State<AppState>,
    Query(query): Query<RawLineQuery>,
) -> Result<Json<EvidenceOut>, ApiError> {
    let context = query.context.unwrap_or(DEFAULT_CONTEXT);
    if !(0..=MAX_CONTEXT).contains(&context) {
        return Err(ApiError::Validation(format!(
            "context must be between 0 and {MAX_CONTEXT}"
        )));
    }
    let block = state.store.get_raw_block(query.raw_block_id).await?;
    let lines = state.blob.read_raw_block(&block.uri).await?;

    let index = query.line_index;
    if index < 0 || index as usize >= lines.len() {
        return Err(ApiError::NotFound("line index out of range".into()));
    }
    let index = index as usize;
    let context = context as usize;
    let start = index.saturating_sub(context);
    let end = (index + context + 1).min(lines.len());

    Ok(Json(EvidenceOut {
        raw_block_id: query.raw_block_id,
        line_index: query.line_index,
        line: lines[index].clone(),
        context_before: lines[start..index].to_vec(),
        context_after: lines[index + 1..end].to_vec(),
    }))
}
