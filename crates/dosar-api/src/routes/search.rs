//! Player and alias search over the dictionary tables.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let q = query.q.trim();
    if q.chars().count() < MIN_QUERY_LEN {
        return Err(ApiError::Validation(format!(
            "query must be at least {MIN_QUERY_LEN} characters"
        )));
    }
    let players = state.store.search_players(q).await?;
    let aliases = state.store.search_aliases(q).await?;
    Ok(Json(json!({ "players": players, "aliases": aliases })))
}
