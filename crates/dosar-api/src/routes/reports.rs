//! Report packs: a filtered event export bundled as a ZIP containing
//! `manifest.json`, `events.csv`, and `evidence.txt` (each event's source
//! line with two lines of context).

use std::collections::HashMap;
use std::io::{Cursor, Write};

use anyhow::Context;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use dosar_store::{EventFilter, StoreError};
use dosar_types::{EventView, ReportPack};

use crate::error::ApiError;
use crate::state::AppState;

/// Hard cap on events bundled into one pack.
const REPORT_MAX_EVENTS: i64 = 100_000;
const EVIDENCE_CONTEXT: usize = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilters {
    pub event_type: Option<String>,
    pub player_id: Option<String>,
    pub ingest_job_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReportPackCreate {
    pub name: String,
    pub filters: Option<ReportFilters>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<ReportPackCreate>,
) -> Result<Json<ReportPack>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("pack name must not be empty".into()));
    }
    let filters = payload.filters.unwrap_or_default();
    let events = state
        .store
        .list_events(&EventFilter {
            event_type: filters.event_type.clone(),
            player_id: filters.player_id.clone(),
            ingest_job_id: filters.ingest_job_id,
            start: filters.start,
            end: filters.end,
            limit: REPORT_MAX_EVENTS,
            offset: 0,
        })
        .await?;

    let evidence = collect_evidence(&state, &events).await?;
    let filters_json = serde_json::to_value(&filters).context("serialize filters")?;
    let manifest = json!({
        "name": payload.name,
        "generated_at": Utc::now(),
        "filters": filters_json,
        "event_count": events.len(),
    });
    let bytes = build_zip(&manifest, &events, &evidence).context("assemble report pack")?;

    let file_name = format!("{}-{}.zip", payload.name.trim(), Uuid::new_v4());
    let target = state.blob.report_pack_path(&file_name).await?;
    tokio::fs::write(&target, bytes)
        .await
        .context("write report pack")?;

    let pack = state
        .store
        .create_report_pack(
            payload.name.trim(),
            filters_json,
            target.to_string_lossy().as_ref(),
        )
        .await?;
    Ok(Json(pack))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ReportPack>>, ApiError> {
    Ok(Json(state.store.list_report_packs().await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportPack>, ApiError> {
    Ok(Json(state.store.get_report_pack(id).await?))
}

/// One evidence excerpt per event, decompressing each raw block once.
async fn collect_evidence(
    state: &AppState,
    events: &[EventView],
) -> Result<Vec<String>, ApiError> {
    let mut cache: HashMap<Uuid, Vec<String>> = HashMap::new();
    let mut excerpts = Vec::with_capacity(events.len());
    for event in events {
        if !cache.contains_key(&event.raw_block_id) {
            let lines = match state.store.get_raw_block(event.raw_block_id).await {
                Ok(block) => state.blob.read_raw_block(&block.uri).await?,
                Err(StoreError::NotFound(_)) => Vec::new(),
                Err(err) => return Err(err.into()),
            };
            cache.insert(event.raw_block_id, lines);
        }
        let lines = &cache[&event.raw_block_id];
        let index = event.raw_line_index as usize;
        if index >= lines.len() {
            continue;
        }
        let start = index.saturating_sub(EVIDENCE_CONTEXT);
        let end = (index + EVIDENCE_CONTEXT + 1).min(lines.len());
        excerpts.push(format!("[{}]\n{}\n", event.id, lines[start..end].join("\n")));
    }
    Ok(excerpts)
}

fn build_zip(
    manifest: &serde_json::Value,
    events: &[EventView],
    evidence: &[String],
) -> anyhow::Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("manifest.json", options)?;
        zip.write_all(&serde_json::to_vec_pretty(manifest)?)?;

        zip.start_file("events.csv", options)?;
        zip.write_all(&events_csv(events)?)?;

        zip.start_file("evidence.txt", options)?;
        zip.write_all(evidence.join("\n").as_bytes())?;

        zip.finish()?;
    }
    Ok(cursor.into_inner())
}

fn events_csv(events: &[EventView]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "event_id",
        "occurred_at",
        "occurred_at_quality",
        "event_type",
        "src_player_id",
        "dst_player_id",
        "item",
        "container",
        "money",
        "qty",
        "ingest_job_id",
        "raw_block_id",
        "raw_line_index",
        "global_line_no",
    ])?;
    for event in events {
        writer.write_record([
            event.id.to_string(),
            event
                .occurred_at
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default(),
            event.occurred_at_quality.to_string(),
            event.event_type.clone(),
            event.src_player_id.clone().unwrap_or_default(),
            event.dst_player_id.clone().unwrap_or_default(),
            event.item.clone().unwrap_or_default(),
            event.container.clone().unwrap_or_default(),
            event.money.map(|m| m.to_string()).unwrap_or_default(),
            event.qty.map(|q| q.to_string()).unwrap_or_default(),
            event.ingest_job_id.to_string(),
            event.raw_block_id.to_string(),
            event.raw_line_index.to_string(),
            event.global_line_no.to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("finish csv buffer: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dosar_types::OccurredAtQuality;

    fn sample_event() -> EventView {
        EventView {
            id: Uuid::new_v4(),
            ingest_job_id: Uuid::new_v4(),
            occurred_at: None,
            occurred_at_quality: OccurredAtQuality::Unknown,
            event_type: "BANK_WITHDRAW".into(),
            src_player_id: Some("42".into()),
            dst_player_id: None,
            item: None,
            container: None,
            money: Some(1000),
            qty: None,
            metadata: json!({}),
            raw_block_id: Uuid::new_v4(),
            raw_line_index: 0,
            global_line_no: 1,
        }
    }

    #[test]
    fn zip_contains_the_three_members() {
        let manifest = json!({ "event_count": 1 });
        let events = vec![sample_event()];
        let evidence = vec!["[x]\nline\n".to_owned()];
        let bytes = build_zip(&manifest, &events, &evidence).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_owned())
            .collect();
        assert_eq!(names, ["manifest.json", "events.csv", "evidence.txt"]);
    }

    #[test]
    fn csv_has_a_header_and_one_row_per_event() {
        let events = vec![sample_event(), sample_event()];
        let bytes = events_csv(&events).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("event_id,occurred_at"));
        assert!(text.contains("BANK_WITHDRAW"));
    }
}
