#![forbid(unsafe_code)]

//! **dosar-upload** – Chunked upload session lifecycle.
//!
//! A session is created OPEN, receives chunks idempotently (each index is a
//! separate staging file, so concurrent chunk writes never clash), and is
//! finalized exactly once: the chunks are streamed into the blob store's
//! content-addressed namespace and the resulting digest either matches an
//! existing source file (dedupe hit) or creates a new one. Finalizing an
//! already FINALIZED session returns the existing source file.

use std::path::Path;

use tracing::info;
use uuid::Uuid;

use dosar_blob::{BlobError, BlobStore};
use dosar_store::{Store, StoreError};
use dosar_types::{SourceFile, UploadSession, UploadStatus};

/// Chunk size used when the client does not declare one.
pub const DEFAULT_CHUNK_SIZE: i64 = 4 * 1024 * 1024;

/// Errors surfaced by the upload lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The session (or a related entity) does not exist.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Blob-store failure while staging or finalizing.
    #[error(transparent)]
    Blob(#[from] BlobError),
    /// The session is FINALIZED and no longer accepts chunks.
    #[error("upload already finalized")]
    AlreadyFinalized,
    /// Finalize was called before all declared chunks arrived.
    #[error("missing chunks: received {received} of {expected}")]
    MissingChunks {
        /// Chunks the client declared at session creation.
        expected: i32,
        /// Chunks received so far.
        received: i32,
    },
}

/// Receipt returned for every accepted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReceipt {
    /// Index of the chunk just written.
    pub index: i32,
    /// Bytes accepted.
    pub received: usize,
    /// Sorted set of chunk indexes received so far.
    pub received_chunks: Vec<i32>,
}

/// Coordinates upload sessions over the store and the blob store.
#[derive(Debug, Clone)]
pub struct UploadCoordinator {
    store: Store,
    blob: BlobStore,
}

impl UploadCoordinator {
    /// A coordinator over the given store pair.
    pub fn new(store: Store, blob: BlobStore) -> Self {
        Self { store, blob }
    }

    /// Open a new session and its staging prefix.
    pub async fn create(
        &self,
        filename: &str,
        size: i64,
        chunk_size: Option<i64>,
        expected_chunks: Option<i32>,
    ) -> Result<UploadSession, UploadError> {
        let id = Uuid::new_v4();
        let prefix = self.blob.upload_prefix(id).await?;
        let session = self
            .store
            .create_upload_session(
                id,
                filename,
                size,
                chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
                expected_chunks,
                prefix.to_string_lossy().as_ref(),
            )
            .await?;
        Ok(session)
    }

    /// Accept one chunk. Idempotent on `(session, index)`: re-sending a chunk
    /// overwrites the same staging file and leaves the received set unchanged.
    pub async fn put_chunk(
        &self,
        session_id: Uuid,
        index: i32,
        data: &[u8],
    ) -> Result<ChunkReceipt, UploadError> {
        let session = self.store.get_upload_session(session_id).await?;
        if session.status == UploadStatus::Finalized {
            return Err(UploadError::AlreadyFinalized);
        }
        self.blob
            .write_chunk(Path::new(&session.temp_prefix), index as u32, data)
            .await?;
        let received_chunks = self.store.record_upload_chunk(session_id, index).await?;
        Ok(ChunkReceipt {
            index,
            received: data.len(),
            received_chunks,
        })
    }

    /// Finalize the session into a source file.
    ///
    /// Incomplete sessions (fewer chunks than declared) are rejected. A
    /// FINALIZED session resolves to its existing source file, so the call
    /// is safe to repeat.
    pub async fn finalize(&self, session_id: Uuid) -> Result<SourceFile, UploadError> {
        let session = self.store.get_upload_session(session_id).await?;
        if session.status == UploadStatus::Finalized {
            return self.existing_source(&session).await;
        }
        if let Some(expected) = session.expected_chunks {
            let received = session.received_chunks.len() as i32;
            if received < expected {
                return Err(UploadError::MissingChunks { expected, received });
            }
        }

        let prefix = Path::new(&session.temp_prefix);
        let chunks = self.blob.list_chunks(prefix).await?;
        let finalized = self.blob.finalize_upload(&chunks).await?;
        self.blob.remove_upload_prefix(prefix).await?;

        let source = self
            .store
            .create_source_file(
                &finalized.sha256,
                &session.filename,
                finalized.size as i64,
                finalized.uri.to_string_lossy().as_ref(),
            )
            .await?;
        self.store
            .finalize_upload_session(session_id, &finalized.sha256, finalized.uri.to_string_lossy().as_ref())
            .await?;
        info!(
            session = %session_id,
            digest = %finalized.sha256,
            deduplicated = finalized.deduplicated,
            "upload finalized"
        );
        Ok(source)
    }

    async fn existing_source(&self, session: &UploadSession) -> Result<SourceFile, UploadError> {
        let digest = session
            .final_sha256
            .as_deref()
            .ok_or(UploadError::AlreadyFinalized)?;
        self.store
            .get_source_file_by_digest(digest)
            .await?
            .ok_or(UploadError::AlreadyFinalized)
    }
}
