//! Source files, raw-block metadata, and upload sessions.

use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use dosar_types::{RawBlock, SourceFile, UploadSession, UploadStatus};

use crate::{Store, StoreError};

fn source_from_row(row: &PgRow) -> SourceFile {
    SourceFile {
        id: row.get("id"),
        sha256: row.get("sha256"),
        name: row.get("name"),
        size: row.get("size"),
        uri: row.get("uri"),
        created_at: row.get("created_at"),
    }
}

fn session_from_row(row: &PgRow) -> Result<UploadSession, StoreError> {
    let status: String = row.get("status");
    Ok(UploadSession {
        id: row.get("id"),
        filename: row.get("filename"),
        size: row.get("size"),
        chunk_size: row.get("chunk_size"),
        expected_chunks: row.get("expected_chunks"),
        received_chunks: row.get("received_chunks"),
        temp_prefix: row.get("temp_prefix"),
        status: status
            .parse::<UploadStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        final_sha256: row.get("final_sha256"),
        final_uri: row.get("final_uri"),
        created_at: row.get("created_at"),
    })
}

const SESSION_COLUMNS: &str = "id, filename, size, chunk_size, expected_chunks, received_chunks,
       temp_prefix, status, final_sha256, final_uri, created_at";

impl Store {
    //─────────────────────────────
    //  Source files
    //─────────────────────────────

    /// Insert a source file row; on a digest collision the existing row wins
    /// and is returned instead.
    pub async fn create_source_file(
        &self,
        sha256: &str,
        name: &str,
        size: i64,
        uri: &str,
    ) -> Result<SourceFile, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO source_file (id, sha256, name, size, uri) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (sha256) DO NOTHING
             RETURNING id, sha256, name, size, uri, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(sha256)
        .bind(name)
        .bind(size)
        .bind(uri)
        .fetch_optional(self.pool())
        .await?;
        match inserted {
            Some(row) => Ok(source_from_row(&row)),
            None => self
                .get_source_file_by_digest(sha256)
                .await?
                .ok_or(StoreError::NotFound("source file")),
        }
    }

    /// Fetch a source file by id.
    pub async fn get_source_file(&self, id: Uuid) -> Result<SourceFile, StoreError> {
        let row = sqlx::query(
            "SELECT id, sha256, name, size, uri, created_at FROM source_file WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.map(|r| source_from_row(&r))
            .ok_or(StoreError::NotFound("source file"))
    }

    /// Fetch a source file by content digest, if present.
    pub async fn get_source_file_by_digest(
        &self,
        sha256: &str,
    ) -> Result<Option<SourceFile>, StoreError> {
        let row = sqlx::query(
            "SELECT id, sha256, name, size, uri, created_at FROM source_file WHERE sha256 = $1",
        )
        .bind(sha256)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|r| source_from_row(&r)))
    }

    //─────────────────────────────
    //  Raw blocks
    //─────────────────────────────

    /// Persist the metadata row for a sealed raw block.
    pub async fn insert_raw_block(&self, block: &RawBlock) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO raw_block (id, source_file_id, uri, codec, line_count, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(block.id)
        .bind(block.source_file_id)
        .bind(&block.uri)
        .bind(&block.codec)
        .bind(block.line_count)
        .bind(block.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch one raw-block metadata row.
    pub async fn get_raw_block(&self, id: Uuid) -> Result<RawBlock, StoreError> {
        let row = sqlx::query(
            "SELECT id, source_file_id, uri, codec, line_count, created_at FROM raw_block WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.map(|r| RawBlock {
            id: r.get("id"),
            source_file_id: r.get("source_file_id"),
            uri: r.get("uri"),
            codec: r.get("codec"),
            line_count: r.get("line_count"),
            created_at: r.get("created_at"),
        })
        .ok_or(StoreError::NotFound("raw block"))
    }

    //─────────────────────────────
    //  Upload sessions
    //─────────────────────────────

    /// Create an OPEN upload session.
    pub async fn create_upload_session(
        &self,
        id: Uuid,
        filename: &str,
        size: i64,
        chunk_size: i64,
        expected_chunks: Option<i32>,
        temp_prefix: &str,
    ) -> Result<UploadSession, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO upload_session (id, filename, size, chunk_size, expected_chunks, temp_prefix)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id)
        .bind(filename)
        .bind(size)
        .bind(chunk_size)
        .bind(expected_chunks)
        .bind(temp_prefix)
        .fetch_one(self.pool())
        .await?;
        session_from_row(&row)
    }

    /// Fetch one upload session.
    pub async fn get_upload_session(&self, id: Uuid) -> Result<UploadSession, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM upload_session WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref()
            .map(session_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound("upload session"))
    }

    /// Record a received chunk index, keeping the set sorted and duplicate
    /// free. Returns the updated index set.
    pub async fn record_upload_chunk(
        &self,
        id: Uuid,
        index: i32,
    ) -> Result<Vec<i32>, StoreError> {
        let row = sqlx::query(
            "UPDATE upload_session
                SET received_chunks = (
                    SELECT coalesce(array_agg(DISTINCT i ORDER BY i), '{}')
                      FROM unnest(array_append(received_chunks, $2)) AS i
                )
              WHERE id = $1
              RETURNING received_chunks",
        )
        .bind(id)
        .bind(index)
        .fetch_optional(self.pool())
        .await?;
        row.map(|r| r.get("received_chunks"))
            .ok_or(StoreError::NotFound("upload session"))
    }

    /// Atomically flip a session to FINALIZED, storing the final digest and
    /// URI.
    pub async fn finalize_upload_session(
        &self,
        id: Uuid,
        sha256: &str,
        uri: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE upload_session SET status = 'FINALIZED', final_sha256 = $2, final_uri = $3
              WHERE id = $1",
        )
        .bind(id)
        .bind(sha256)
        .bind(uri)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
