//! Raw-block capture: batches source lines into fixed-size compressed blocks
//! and hands out stable `(block_id, line_index)` evidence tuples.
//!
//! The writer owns the current block id and buffer. `append` returns the
//! evidence tuple for the line *before* any flush it triggers, so a pointer
//! handed out while the block was filling stays valid once the block is
//! sealed. A final `flush` at end-of-stream is mandatory even for a partial
//! block; skipping it would orphan the evidence pointers of the tail lines.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use dosar_blob::{BlobStore, RAW_BLOCK_CODEC};
use dosar_store::Store;
use dosar_types::RawBlock;

/// Lines per sealed block.
pub const DEFAULT_BLOCK_SIZE: usize = 500;

/// Destination of sealed raw-block metadata rows. The store implements this;
/// tests substitute an in-memory sink.
#[async_trait]
pub trait BlockSink: Send + Sync {
    /// Persist the metadata row for a block whose compressed payload has
    /// already been written to the blob store.
    async fn persist_block(&self, block: RawBlock) -> Result<()>;
}

#[async_trait]
impl BlockSink for Store {
    async fn persist_block(&self, block: RawBlock) -> Result<()> {
        self.insert_raw_block(&block).await?;
        Ok(())
    }
}

/// Buffered writer for one source file's raw blocks.
pub struct RawBlockWriter<'a, S> {
    blob: &'a BlobStore,
    sink: &'a S,
    source_file_id: Uuid,
    block_id: Uuid,
    lines: Vec<String>,
    block_size: usize,
    blocks_flushed: u64,
}

impl<'a, S: BlockSink> RawBlockWriter<'a, S> {
    /// A writer with the default block size.
    pub fn new(blob: &'a BlobStore, sink: &'a S, source_file_id: Uuid) -> Self {
        Self::with_block_size(blob, sink, source_file_id, DEFAULT_BLOCK_SIZE)
    }

    /// A writer with an explicit block size (tests use small blocks).
    pub fn with_block_size(
        blob: &'a BlobStore,
        sink: &'a S,
        source_file_id: Uuid,
        block_size: usize,
    ) -> Self {
        Self {
            blob,
            sink,
            source_file_id,
            block_id: Uuid::new_v4(),
            lines: Vec::new(),
            block_size: block_size.max(1),
            blocks_flushed: 0,
        }
    }

    /// Append one line, returning its evidence tuple. Reaching the block-size
    /// threshold seals and flushes the block.
    pub async fn append(&mut self, line: &str) -> Result<(Uuid, i32)> {
        let block_id = self.block_id;
        let index = self.lines.len() as i32;
        self.lines.push(line.to_owned());
        if self.lines.len() >= self.block_size {
            self.flush().await?;
        }
        Ok((block_id, index))
    }

    /// Seal the current block: compress and persist the payload, record the
    /// metadata row, and allocate a fresh block id. A flush failure is fatal
    /// to the job. No-op on an empty buffer.
    pub async fn flush(&mut self) -> Result<()> {
        if self.lines.is_empty() {
            return Ok(());
        }
        let uri = self
            .blob
            .write_raw_block(self.source_file_id, self.block_id, &self.lines)
            .await?;
        self.sink
            .persist_block(RawBlock {
                id: self.block_id,
                source_file_id: self.source_file_id,
                uri: uri.to_string_lossy().into_owned(),
                codec: RAW_BLOCK_CODEC.to_owned(),
                line_count: self.lines.len() as i32,
                created_at: Utc::now(),
            })
            .await?;
        self.blocks_flushed += 1;
        self.lines.clear();
        self.block_id = Uuid::new_v4();
        Ok(())
    }

    /// Number of blocks sealed so far.
    pub fn blocks_flushed(&self) -> u64 {
        self.blocks_flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        blocks: Mutex<Vec<RawBlock>>,
    }

    #[async_trait]
    impl BlockSink for MemorySink {
        async fn persist_block(&self, block: RawBlock) -> Result<()> {
            self.blocks.lock().await.push(block);
            Ok(())
        }
    }

    fn blob_store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path().join("objects"), dir.path().join("uploads")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn threshold_seals_blocks_and_rolls_the_id() {
        let (_dir, blob) = blob_store();
        let sink = MemorySink::default();
        let mut writer = RawBlockWriter::with_block_size(&blob, &sink, Uuid::new_v4(), 2);

        let (b0, i0) = writer.append("one").await.unwrap();
        let (b1, i1) = writer.append("two").await.unwrap();
        let (b2, i2) = writer.append("three").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!((i0, i1, i2), (0, 1, 0));
        assert_eq!(b0, b1);
        assert_ne!(b1, b2, "a fresh id is allocated after the flush");

        let blocks = sink.blocks.lock().await;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].line_count, 2);
        assert_eq!(blocks[1].line_count, 1);
        assert_eq!(blocks[0].codec, "zstd");
    }

    #[tokio::test]
    async fn final_flush_is_a_noop_on_empty_buffer() {
        let (_dir, blob) = blob_store();
        let sink = MemorySink::default();
        let mut writer = RawBlockWriter::with_block_size(&blob, &sink, Uuid::new_v4(), 2);
        writer.append("a").await.unwrap();
        writer.append("b").await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(writer.blocks_flushed(), 1);
        assert_eq!(sink.blocks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn evidence_pointers_resolve_to_the_exact_line_after_flush() {
        let (_dir, blob) = blob_store();
        let sink = MemorySink::default();
        let mut writer = RawBlockWriter::with_block_size(&blob, &sink, Uuid::new_v4(), 3);

        let lines = [
            "— 12/03/2024 14:05",
            "Retragere Banca",
            "John[42] a retras 1.000$",
            "Server Connect",
            "Ana[7] se conecteaza cu succes | (ip: 10.0.0.1)",
        ];
        let mut pointers = HashMap::new();
        for line in lines {
            let pointer = writer.append(line).await.unwrap();
            pointers.insert(line, pointer);
        }
        writer.flush().await.unwrap();

        let blocks = sink.blocks.lock().await;
        for (line, (block_id, index)) in &pointers {
            let block = blocks.iter().find(|b| b.id == *block_id).unwrap();
            let stored = blob.read_raw_block(&block.uri).await.unwrap();
            assert_eq!(stored[*index as usize], **line);
        }
    }
}
