#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **dosar-blob** – Content-addressed local blob store for Dosar.
//!
//! Everything persisted outside the relational database lives here: staged
//! upload chunks, finalized source files keyed by their SHA-256 digest,
//! compressed raw-block objects, and generated report packs. The store
//! guarantees atomicity of finalization (a temp file is renamed into place,
//! so no partially written object is ever visible under its final name) and
//! content-addressed uniqueness under the `source-files/` namespace.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

pub mod codec;

/// Codec tag recorded with every raw block row.
pub const RAW_BLOCK_CODEC: &str = "zstd";

/// Read granularity while streaming chunks into the finalization digest.
const STREAM_BUF_SIZE: usize = 1024 * 1024;

/// Errors surfaced by blob-store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// Underlying filesystem failure.
    #[error("blob i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a finalized upload: digest, final URI and total byte count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedUpload {
    /// 64-hex SHA-256 over the concatenated chunk bytes.
    pub sha256: String,
    /// Path of the content-addressed object.
    pub uri: PathBuf,
    /// Total byte count streamed.
    pub size: u64,
    /// True when the destination already existed (content dedupe hit).
    pub deduplicated: bool,
}

/// Local-filesystem blob store rooted at the object-store path, with upload
/// staging under a separate prefix.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    upload_root: PathBuf,
}

impl BlobStore {
    /// Open (and create if absent) a store rooted at `object_store_path`,
    /// staging uploads under `upload_path`.
    pub fn open(
        object_store_path: impl Into<PathBuf>,
        upload_path: impl Into<PathBuf>,
    ) -> Result<Self, BlobError> {
        let root = object_store_path.into();
        let upload_root = upload_path.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(&upload_root)?;
        Ok(Self { root, upload_root })
    }

    //─────────────────────────────
    //  Upload staging
    //─────────────────────────────

    /// Create (idempotently) and return the staging directory for an upload
    /// session.
    pub async fn upload_prefix(&self, upload_id: Uuid) -> Result<PathBuf, BlobError> {
        let prefix = self.upload_root.join(upload_id.to_string());
        fs::create_dir_all(&prefix).await?;
        Ok(prefix)
    }

    /// Write one chunk file under `prefix`. The 6-digit zero-padded index
    /// keeps lexicographic order equal to numeric order.
    pub async fn write_chunk(
        &self,
        prefix: &Path,
        index: u32,
        data: &[u8],
    ) -> Result<PathBuf, BlobError> {
        let path = prefix.join(format!("chunk_{index:06}.part"));
        fs::write(&path, data).await?;
        Ok(path)
    }

    /// Enumerate chunk files under `prefix` in index order.
    pub async fn list_chunks(&self, prefix: &Path) -> Result<Vec<PathBuf>, BlobError> {
        let mut chunks = Vec::new();
        let mut entries = fs::read_dir(prefix).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("chunk_") && name.ends_with(".part") {
                chunks.push(entry.path());
            }
        }
        // Lexicographic == numeric thanks to the zero-padded index.
        chunks.sort();
        Ok(chunks)
    }

    /// Stream `chunks` (in the given order) into a temp blob while computing
    /// the SHA-256 digest, then atomically rename the temp file to
    /// `source-files/<digest>`. An already-present destination wins and the
    /// temp blob is discarded.
    pub async fn finalize_upload(&self, chunks: &[PathBuf]) -> Result<FinalizedUpload, BlobError> {
        let dir = self.root.join("source-files");
        fs::create_dir_all(&dir).await?;
        let temp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));

        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut out = fs::File::create(&temp_path).await?;
        let mut buf = vec![0u8; STREAM_BUF_SIZE];
        for chunk in chunks {
            let mut file = fs::File::open(chunk).await?;
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n]).await?;
                size += n as u64;
            }
        }
        out.flush().await?;
        drop(out);

        let sha256 = hex::encode(hasher.finalize());
        let final_path = dir.join(&sha256);
        let deduplicated = fs::try_exists(&final_path).await?;
        if deduplicated {
            fs::remove_file(&temp_path).await?;
            debug!(digest = %sha256, "finalize hit existing source blob");
        } else {
            fs::rename(&temp_path, &final_path).await?;
            debug!(digest = %sha256, size, "finalized new source blob");
        }
        Ok(FinalizedUpload {
            sha256,
            uri: final_path,
            size,
            deduplicated,
        })
    }

    /// Remove a session's staging files and directory after finalization.
    /// Best-effort: a non-empty or missing directory is not an error.
    pub async fn remove_upload_prefix(&self, prefix: &Path) -> Result<(), BlobError> {
        for chunk in self.list_chunks(prefix).await.unwrap_or_default() {
            let _ = fs::remove_file(chunk).await;
        }
        let _ = fs::remove_dir(prefix).await;
        Ok(())
    }

    //─────────────────────────────
    //  Raw blocks
    //─────────────────────────────

    /// Path of a raw-block object, creating the per-source directory.
    pub async fn raw_block_path(
        &self,
        source_file_id: Uuid,
        block_id: Uuid,
    ) -> Result<PathBuf, BlobError> {
        let dir = self.root.join("raw-blocks").join(source_file_id.to_string());
        fs::create_dir_all(&dir).await?;
        Ok(dir.join(format!("{block_id}.zst")))
    }

    /// Compress `lines` and persist them as the raw-block object for
    /// `(source_file_id, block_id)`. Returns the object URI.
    pub async fn write_raw_block(
        &self,
        source_file_id: Uuid,
        block_id: Uuid,
        lines: &[String],
    ) -> Result<PathBuf, BlobError> {
        let path = self.raw_block_path(source_file_id, block_id).await?;
        let encoded = codec::encode_lines(lines)?;
        fs::write(&path, encoded).await?;
        Ok(path)
    }

    /// Load and decode the line array of a raw-block object.
    pub async fn read_raw_block(&self, uri: &str) -> Result<Vec<String>, BlobError> {
        let bytes = fs::read(uri).await?;
        codec::decode_lines(&bytes)
    }

    //─────────────────────────────
    //  Misc objects
    //─────────────────────────────

    /// Open a finalized source blob for streamed reading.
    pub async fn open_source(&self, uri: &str) -> Result<fs::File, BlobError> {
        Ok(fs::File::open(uri).await?)
    }

    /// Destination path for a report pack, creating the namespace directory.
    pub async fn report_pack_path(&self, file_name: &str) -> Result<PathBuf, BlobError> {
        let dir = self.root.join("report-packs");
        fs::create_dir_all(&dir).await?;
        Ok(dir.join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path().join("objects"), dir.path().join("uploads")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn finalize_streams_digest_over_all_chunks() {
        let (_dir, store) = store();
        let prefix = store.upload_prefix(Uuid::new_v4()).await.unwrap();
        store.write_chunk(&prefix, 0, b"hello ").await.unwrap();
        store.write_chunk(&prefix, 1, b"world").await.unwrap();

        let chunks = store.list_chunks(&prefix).await.unwrap();
        assert_eq!(chunks.len(), 2);
        let result = store.finalize_upload(&chunks).await.unwrap();

        let expected = hex::encode(Sha256::digest(b"hello world"));
        assert_eq!(result.sha256, expected);
        assert_eq!(result.size, 11);
        assert!(!result.deduplicated);
        assert_eq!(fs::read(&result.uri).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn finalize_orders_chunks_numerically() {
        let (_dir, store) = store();
        let prefix = store.upload_prefix(Uuid::new_v4()).await.unwrap();
        // Written out of order; index 10 must sort after index 2.
        store.write_chunk(&prefix, 10, b"c").await.unwrap();
        store.write_chunk(&prefix, 2, b"b").await.unwrap();
        store.write_chunk(&prefix, 0, b"a").await.unwrap();

        let chunks = store.list_chunks(&prefix).await.unwrap();
        let result = store.finalize_upload(&chunks).await.unwrap();
        assert_eq!(fs::read(&result.uri).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn finalize_dedupes_existing_content() {
        let (_dir, store) = store();
        let prefix = store.upload_prefix(Uuid::new_v4()).await.unwrap();
        store.write_chunk(&prefix, 0, b"same bytes").await.unwrap();
        let chunks = store.list_chunks(&prefix).await.unwrap();

        let first = store.finalize_upload(&chunks).await.unwrap();
        let second = store.finalize_upload(&chunks).await.unwrap();
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(first.uri, second.uri);
        assert!(second.deduplicated);
    }

    #[tokio::test]
    async fn finalize_leaves_no_temp_objects_behind() {
        let (_dir, store) = store();
        let prefix = store.upload_prefix(Uuid::new_v4()).await.unwrap();
        store.write_chunk(&prefix, 0, b"payload").await.unwrap();
        let chunks = store.list_chunks(&prefix).await.unwrap();
        store.finalize_upload(&chunks).await.unwrap();
        store.finalize_upload(&chunks).await.unwrap();

        let dir = store.root.join("source-files");
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names.len(), 1, "only the content-addressed object remains");
        assert!(!names[0].starts_with(".tmp-"));
    }

    #[tokio::test]
    async fn raw_block_round_trip_reproduces_lines() {
        let (_dir, store) = store();
        let source = Uuid::new_v4();
        let block = Uuid::new_v4();
        let lines: Vec<String> = vec![
            "— 12/03/2024 14:05".into(),
            "Retragere Banca".into(),
            "John[42] a retras 1.000$".into(),
            "".into(),
            "ultima linie".into(),
        ];
        let uri = store.write_raw_block(source, block, &lines).await.unwrap();
        let restored = store
            .read_raw_block(uri.to_string_lossy().as_ref())
            .await
            .unwrap();
        assert_eq!(restored, lines);
    }

    #[tokio::test]
    async fn remove_upload_prefix_clears_staging() {
        let (_dir, store) = store();
        let id = Uuid::new_v4();
        let prefix = store.upload_prefix(id).await.unwrap();
        store.write_chunk(&prefix, 0, b"x").await.unwrap();
        store.remove_upload_prefix(&prefix).await.unwrap();
        assert!(!prefix.exists());
    }
}
