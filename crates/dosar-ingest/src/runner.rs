//! Job runner: leases queued jobs and drives the capture → normalize →
//! parse → persist pipeline over the source stream.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use dosar_blob::BlobStore;
use dosar_store::{dedupe_key, DictCache, NewEvent, Store};
use dosar_types::{EventData, IngestJob, NormalizedBlock, SourceFile};

use crate::normalizer::{DateOrder, Normalizer, RawLine, INGEST_TZ};
use crate::parsers::{default_registry, Parser};
use crate::raw_block::RawBlockWriter;
use crate::text::normalize_signature;

/// Progress is written back to the job row every this many source lines.
const PROGRESS_EVERY: u64 = 5000;

/// How many unknown signatures are persisted per job.
const UNKNOWN_SIGNATURE_TOP_N: usize = 50;

/// Counters accumulated over one job run.
#[derive(Debug, Default)]
struct JobStats {
    lines: u64,
    events_total: u64,
    by_event_type: HashMap<String, u64>,
    by_parser: HashMap<String, u64>,
    by_quality: HashMap<String, u64>,
    unknown: HashMap<String, u64>,
}

impl JobStats {
    fn count_event(&mut self, event_type: &str, parser_id: &str) {
        self.events_total += 1;
        *self.by_event_type.entry(event_type.to_owned()).or_insert(0) += 1;
        *self.by_parser.entry(parser_id.to_owned()).or_insert(0) += 1;
    }

    fn count_block(&mut self, block: &NormalizedBlock) {
        *self
            .by_quality
            .entry(block.occurred_at_quality.as_str().to_owned())
            .or_insert(0) += 1;
    }

    fn top_unknown(&self, n: usize) -> Vec<(String, i64)> {
        let mut entries: Vec<(String, i64)> = self
            .unknown
            .iter()
            .map(|(sig, count)| (sig.clone(), *count as i64))
            .collect();
        // Count descending, then signature ascending for a stable order.
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }

    fn progress_json(&self, blocks: u64) -> serde_json::Value {
        json!({ "lines": self.lines, "blocks": blocks })
    }

    fn stats_json(&self, top_unknown: &[(String, i64)]) -> serde_json::Value {
        json!({
            "events_total": self.events_total,
            "event_types": &self.by_event_type,
            "parsers": &self.by_parser,
            "timestamp_quality": &self.by_quality,
            "unknown_signatures": top_unknown
                .iter()
                .map(|(sig, count)| json!([sig, count]))
                .collect::<Vec<_>>(),
        })
    }
}

/// Drives leased ingest jobs to completion.
pub struct JobRunner {
    store: Store,
    blob: BlobStore,
    date_order: DateOrder,
    parsers: Vec<Box<dyn Parser>>,
}

impl JobRunner {
    /// A runner over the default parser registry.
    pub fn new(store: Store, blob: BlobStore, date_order: DateOrder) -> Self {
        Self {
            store,
            blob,
            date_order,
            parsers: default_registry(),
        }
    }

    /// Lease and run the oldest queued job. Returns `false` when the queue
    /// was empty. Pipeline failures mark the job `failed` and are not
    /// propagated; data committed before the failure is kept.
    pub async fn run_next_job(&self) -> Result<bool> {
        let Some(job) = self.store.lease_next_job().await? else {
            return Ok(false);
        };
        info!(job = %job.id, source = %job.source_file_id, "ingest job started");
        match self.process_job(&job).await {
            Ok(stats) => {
                self.store.complete_job(job.id, stats).await?;
                info!(job = %job.id, "ingest job completed");
            }
            Err(err) => {
                error!(job = %job.id, error = %format!("{err:#}"), "ingest job failed");
                self.store.fail_job(job.id, &format!("{err:#}")).await?;
            }
        }
        Ok(true)
    }

    async fn process_job(&self, job: &IngestJob) -> Result<serde_json::Value> {
        let source = self.store.get_source_file(job.source_file_id).await?;
        let mut cache = DictCache::new(&self.store);
        let mut writer = RawBlockWriter::new(&self.blob, &self.store, source.id);
        let mut normalizer = Normalizer::new(Utc::now().with_timezone(&INGEST_TZ), self.date_order);
        let mut stats = JobStats::default();

        let file = self
            .blob
            .open_source(&source.uri)
            .await
            .with_context(|| format!("open source blob {}", source.uri))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await?;
            if read == 0 {
                break;
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            // Invalid UTF-8 is replaced, never fatal.
            let text = String::from_utf8_lossy(&buf).into_owned();
            let (raw_block_id, raw_line_index) = writer.append(&text).await?;
            stats.lines += 1;
            if stats.lines % PROGRESS_EVERY == 0 {
                self.store
                    .update_job_progress(job.id, stats.progress_json(writer.blocks_flushed()))
                    .await?;
            }
            let raw = RawLine {
                text,
                raw_block_id,
                raw_line_index,
            };
            if let Some(block) = normalizer.push(&raw) {
                self.handle_block(job, &source, &block, &mut cache, &mut stats)
                    .await?;
            }
        }
        // Mandatory final flush: evidence pointers of the tail lines depend
        // on it.
        writer.flush().await?;
        if let Some(block) = normalizer.finish() {
            self.handle_block(job, &source, &block, &mut cache, &mut stats)
                .await?;
        }

        let top_unknown = stats.top_unknown(UNKNOWN_SIGNATURE_TOP_N);
        if !top_unknown.is_empty() {
            self.store
                .insert_unknown_signatures(job.id, &top_unknown)
                .await?;
        }
        self.store
            .update_job_progress(job.id, stats.progress_json(writer.blocks_flushed()))
            .await?;
        Ok(stats.stats_json(&top_unknown))
    }

    async fn handle_block(
        &self,
        job: &IngestJob,
        source: &SourceFile,
        block: &NormalizedBlock,
        cache: &mut DictCache,
        stats: &mut JobStats,
    ) -> Result<()> {
        stats.count_block(block);
        let mut produced = false;
        for parser in &self.parsers {
            if !parser.matches(block) {
                continue;
            }
            let events = parser.parse(block);
            if !events.is_empty() {
                produced = true;
            }
            for event in &events {
                self.persist_event(job, source, block, event, parser.as_ref(), cache, stats)
                    .await?;
            }
        }
        if !produced {
            for payload in &block.payload {
                *stats
                    .unknown
                    .entry(normalize_signature(&payload.text))
                    .or_insert(0) += 1;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_event(
        &self,
        job: &IngestJob,
        source: &SourceFile,
        block: &NormalizedBlock,
        event: &EventData,
        parser: &dyn Parser,
        cache: &mut DictCache,
        stats: &mut JobStats,
    ) -> Result<()> {
        let Some(global_line_no) = event.evidence.global_line_no else {
            warn!(
                parser = parser.parser_id(),
                event_type = %event.event_type,
                "dropping event without a global line number"
            );
            return Ok(());
        };
        stats.count_event(&event.event_type, parser.parser_id());

        let event_type_id = cache.event_type_id(&event.event_type).await?;
        let src_player_id = match &event.src_player {
            Some(natural) => Some(cache.player_id(natural).await?),
            None => None,
        };
        if let (Some(id), Some(name)) = (src_player_id, &event.src_player_name) {
            cache.record_alias(id, name).await?;
        }
        let dst_player_id = match &event.dst_player {
            Some(natural) => Some(cache.player_id(natural).await?),
            None => None,
        };
        if let (Some(id), Some(name)) = (dst_player_id, &event.dst_player_name) {
            cache.record_alias(id, name).await?;
        }
        let item_id = match &event.item {
            Some(name) => Some(cache.item_id(name).await?),
            None => None,
        };
        let container_id = match &event.container {
            Some(key) => Some(cache.container_id(key).await?),
            None => None,
        };

        if let Some(occurred_at) = block.occurred_at {
            self.store.ensure_month_partition(occurred_at).await?;
        }
        let new_event = NewEvent {
            source_file_id: source.id,
            ingest_job_id: job.id,
            parser_id: parser.parser_id().to_owned(),
            parser_version: parser.version().to_owned(),
            occurred_at: block.occurred_at,
            occurred_at_quality: block.occurred_at_quality,
            event_type_id,
            src_player_id,
            dst_player_id,
            item_id,
            container_id,
            money: event.money,
            qty: event.qty,
            metadata: event.metadata.clone().unwrap_or_else(|| json!({})),
            raw_block_id: event.evidence.raw_block_id,
            raw_line_index: event.evidence.raw_line_index,
            global_line_no,
            dedupe_hash: dedupe_key(&source.sha256, global_line_no, event_type_id, &event.event_type),
        };
        self.store.insert_event(&new_event).await?;
        Ok(())
    }
}
