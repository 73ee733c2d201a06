//! Idempotent schema bootstrap.
//!
//! Every statement is `IF NOT EXISTS`-guarded so `migrate` can run on every
//! startup. The `event` table is declared `PARTITION BY RANGE (occurred_at)`;
//! monthly partitions are provisioned lazily during ingest (see
//! [`crate::events`]), while the DEFAULT partition - which also receives rows
//! with a NULL `occurred_at` - is created here together with its indexes.

use tracing::debug;

use crate::{Store, StoreError};

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS source_file (
        id UUID PRIMARY KEY,
        sha256 TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        size BIGINT NOT NULL,
        uri TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS upload_session (
        id UUID PRIMARY KEY,
        filename TEXT NOT NULL,
        size BIGINT NOT NULL,
        chunk_size BIGINT NOT NULL,
        expected_chunks INT,
        received_chunks INT[] NOT NULL DEFAULT '{}',
        temp_prefix TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'OPEN',
        final_sha256 TEXT,
        final_uri TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS ingest_job (
        id UUID PRIMARY KEY,
        source_file_id UUID NOT NULL REFERENCES source_file(id),
        status TEXT NOT NULL DEFAULT 'queued',
        progress JSONB NOT NULL DEFAULT '{}'::jsonb,
        stats JSONB NOT NULL DEFAULT '{}'::jsonb,
        error_text TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS raw_block (
        id UUID PRIMARY KEY,
        source_file_id UUID NOT NULL REFERENCES source_file(id),
        uri TEXT NOT NULL,
        codec TEXT NOT NULL DEFAULT 'zstd',
        line_count INT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS dict_event_type (
        id SERIAL PRIMARY KEY,
        key TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS dict_item (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS dict_container (
        id SERIAL PRIMARY KEY,
        key TEXT NOT NULL UNIQUE,
        owner_player_id TEXT
    )",
    "CREATE TABLE IF NOT EXISTS dict_player (
        id SERIAL PRIMARY KEY,
        player_id TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS dict_alias (
        id SERIAL PRIMARY KEY,
        player_id INT NOT NULL REFERENCES dict_player(id),
        alias TEXT NOT NULL,
        UNIQUE (player_id, alias)
    )",
    "CREATE TABLE IF NOT EXISTS event (
        id UUID NOT NULL,
        source_file_id UUID NOT NULL,
        ingest_job_id UUID NOT NULL,
        parser_id TEXT NOT NULL,
        parser_version TEXT NOT NULL,
        occurred_at TIMESTAMPTZ,
        occurred_at_quality TEXT NOT NULL,
        event_type_id INT NOT NULL,
        src_player_id INT,
        dst_player_id INT,
        item_id INT,
        container_id INT,
        money BIGINT,
        qty BIGINT,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        raw_block_id UUID NOT NULL,
        raw_line_index INT NOT NULL,
        global_line_no BIGINT NOT NULL,
        dedupe_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    ) PARTITION BY RANGE (occurred_at)",
    // Partitioned parent index: cascades to every present and future partition.
    "CREATE INDEX IF NOT EXISTS idx_event_id ON event (id)",
    // Catch-all partition; NULL occurred_at rows land here.
    "CREATE TABLE IF NOT EXISTS event_default PARTITION OF event DEFAULT",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_event_default_dedupe ON event_default (dedupe_hash)",
    "CREATE INDEX IF NOT EXISTS idx_event_default_job_time ON event_default (ingest_job_id, occurred_at)",
    "CREATE INDEX IF NOT EXISTS idx_event_default_job_type ON event_default (ingest_job_id, event_type_id)",
    "CREATE TABLE IF NOT EXISTS unknown_signature (
        id UUID PRIMARY KEY,
        ingest_job_id UUID NOT NULL REFERENCES ingest_job(id),
        signature TEXT NOT NULL,
        count BIGINT NOT NULL DEFAULT 1,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS report_pack (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        filters JSONB NOT NULL DEFAULT '{}'::jsonb,
        uri TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
];

impl Store {
    /// Run the idempotent schema bootstrap.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in DDL {
            if let Err(err) = sqlx::query(statement).execute(self.pool()).await {
                // Another worker bootstrapping at the same instant can still
                // race IF NOT EXISTS on catalog rows.
                if crate::is_duplicate_object(&err) {
                    continue;
                }
                return Err(err.into());
            }
        }
        debug!("schema bootstrap complete");
        Ok(())
    }
}
