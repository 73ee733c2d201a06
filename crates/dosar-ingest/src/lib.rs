#![forbid(unsafe_code)]

//! **dosar-ingest** – The Dosar ingest pipeline.
//!
//! A leased job drives a single-pass flow over its source transcript:
//!
//! ```text
//! raw lines ──► RawBlockWriter (compressed evidence blocks)
//!           └─► Normalizer (timestamped blocks) ──► parser registry ──► events
//! ```
//!
//! Raw-block capture and normalization happen on the same pass, so every
//! payload line carries a stable `(raw_block_id, raw_line_index)` evidence
//! pointer plus the monotone global line counter that orders and dedupes the
//! derived events. Blocks no parser claims are aggregated into
//! unknown-signature counters and surface in the job stats.

pub mod normalizer;
pub mod parsers;
pub mod raw_block;
pub mod runner;
pub mod text;

pub use normalizer::{DateOrder, Normalizer, RawLine, INGEST_TZ};
pub use parsers::{default_registry, Parser};
pub use raw_block::{BlockSink, RawBlockWriter, DEFAULT_BLOCK_SIZE};
pub use runner::JobRunner;
