//! Ingest job repository and the worker lease primitive.
//!
//! The lease is the only concurrency control a worker needs: the oldest
//! `queued` job is selected `FOR UPDATE SKIP LOCKED` and transitioned to
//! `running` inside one transaction, so a job can be claimed at most once
//! even with several workers polling.

use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use dosar_types::{IngestJob, JobStatus};

use crate::{Store, StoreError};

/// Failure messages stored on a job are truncated to this many characters.
pub const ERROR_TEXT_MAX: usize = 2000;

fn job_from_row(row: &PgRow) -> Result<IngestJob, StoreError> {
    let status: String = row.get("status");
    Ok(IngestJob {
        id: row.get("id"),
        source_file_id: row.get("source_file_id"),
        status: status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        progress: row.get("progress"),
        stats: row.get("stats"),
        error_text: row.get("error_text"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl Store {
    /// Enqueue a new job over `source_file_id`.
    pub async fn create_job(&self, source_file_id: Uuid) -> Result<IngestJob, StoreError> {
        let row = sqlx::query(
            "INSERT INTO ingest_job (id, source_file_id, status) VALUES ($1, $2, 'queued')
             RETURNING id, source_file_id, status, progress, stats, error_text, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(source_file_id)
        .fetch_one(self.pool())
        .await?;
        job_from_row(&row)
    }

    /// Fetch one job.
    pub async fn get_job(&self, id: Uuid) -> Result<IngestJob, StoreError> {
        let row = sqlx::query(
            "SELECT id, source_file_id, status, progress, stats, error_text, created_at, updated_at
               FROM ingest_job WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref()
            .map(job_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound("ingest job"))
    }

    /// All jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<IngestJob>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, source_file_id, status, progress, stats, error_text, created_at, updated_at
               FROM ingest_job ORDER BY created_at DESC",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Lease the oldest `queued` job, transitioning it to `running`. Returns
    /// `None` when the queue is empty.
    pub async fn lease_next_job(&self) -> Result<Option<IngestJob>, StoreError> {
        let mut tx = self.pool().begin().await?;
        let claimed = sqlx::query(
            "SELECT id FROM ingest_job WHERE status = 'queued'
              ORDER BY created_at LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = claimed else {
            tx.rollback().await?;
            return Ok(None);
        };
        let id: Uuid = row.get("id");
        sqlx::query("UPDATE ingest_job SET status = 'running', updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(job = %id, "leased ingest job");
        Ok(Some(self.get_job(id).await?))
    }

    /// Overwrite the opaque progress map.
    pub async fn update_job_progress(
        &self,
        id: Uuid,
        progress: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE ingest_job SET progress = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(progress)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Mark a job completed with its final stats map.
    pub async fn complete_job(&self, id: Uuid, stats: serde_json::Value) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE ingest_job SET status = 'completed', stats = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(stats)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Mark a job failed, keeping whatever partial data was already
    /// committed. The message is truncated to [`ERROR_TEXT_MAX`] characters.
    pub async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE ingest_job SET status = 'failed', error_text = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(truncate_error(error))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn truncate_error(error: &str) -> String {
    error.chars().take(ERROR_TEXT_MAX).collect()
}
