#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **dosar-types** – Shared primitive data structures for Dosar.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that every other crate can depend on it without causing cycles.
//! It intentionally makes no assumptions about I/O, the database, or the
//! blob store: records here are plain values moved between the pipeline
//! stages and the persistence layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//─────────────────────────────
//  Status enumerations
//─────────────────────────────

/// Confidence tier of a resolved block timestamp.
///
/// ABSOLUTE timestamps were parsed from a full date/time expression and also
/// become the anchor for later RELATIVE and TIME_ONLY resolutions within the
/// same source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurredAtQuality {
    /// Full date and time parsed directly from the line.
    Absolute,
    /// Resolved relative to the last absolute timestamp or the job date
    /// (`yesterday at …`, `today at …`).
    Relative,
    /// Only a clock time was present; the date was inferred from the anchor.
    TimeOnly,
    /// The timestamp expression could not be parsed.
    Unknown,
}

impl OccurredAtQuality {
    /// Stable string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "ABSOLUTE",
            Self::Relative => "RELATIVE",
            Self::TimeOnly => "TIME_ONLY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for OccurredAtQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OccurredAtQuality {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABSOLUTE" => Ok(Self::Absolute),
            "RELATIVE" => Ok(Self::Relative),
            "TIME_ONLY" => Ok(Self::TimeOnly),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Lifecycle state of an ingest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for a worker lease.
    Queued,
    /// Leased by a worker; at most one successful transition from `queued`.
    Running,
    /// Pipeline ran to completion and stats were recorded.
    Completed,
    /// Pipeline aborted; the error text holds the truncated cause.
    Failed,
}

impl JobStatus {
    /// Stable string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Lifecycle state of a chunked upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    /// Accepting chunks.
    Open,
    /// Finalized; the final digest and URI are recorded and immutable.
    Finalized,
}

impl UploadStatus {
    /// Stable string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Finalized => "FINALIZED",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "FINALIZED" => Ok(Self::Finalized),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Error returned when a persisted status string has no matching variant.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown enum variant: {0}")]
pub struct UnknownVariant(pub String);

//─────────────────────────────
//  Persistent entities
//─────────────────────────────

/// An immutable, content-addressed source transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Entity id.
    pub id: Uuid,
    /// 64-hex SHA-256 digest of the file content; unique.
    pub sha256: String,
    /// Original filename as declared by the uploader.
    pub name: String,
    /// Byte size of the finalized blob.
    pub size: i64,
    /// Blob URI under the `source-files/` namespace.
    pub uri: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A short-lived multi-chunk upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Entity id.
    pub id: Uuid,
    /// Declared filename.
    pub filename: String,
    /// Declared total byte size.
    pub size: i64,
    /// Chunk size the client promised to use.
    pub chunk_size: i64,
    /// Expected chunk count, when the client declared one.
    pub expected_chunks: Option<i32>,
    /// Sorted set of chunk indexes received so far.
    pub received_chunks: Vec<i32>,
    /// Staging directory URI holding the chunk files.
    pub temp_prefix: String,
    /// Session state.
    pub status: UploadStatus,
    /// Final content digest; set when the session is finalized.
    pub final_sha256: Option<String>,
    /// Final blob URI; set when the session is finalized.
    pub final_uri: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One ingest run over a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    /// Entity id.
    pub id: Uuid,
    /// The source file this job reads. Never mutated by the job.
    pub source_file_id: Uuid,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Opaque progress map, updated while the job runs.
    pub progress: serde_json::Value,
    /// Opaque stats map, written on completion.
    pub stats: serde_json::Value,
    /// Truncated failure message, present when status is `failed`.
    pub error_text: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status/progress transition timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Metadata row for one sealed compressed raw block.
///
/// `(id, line index)` tuples handed out while the block was being filled stay
/// valid for the lifetime of the block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    /// Block id, allocated before the first line is appended.
    pub id: Uuid,
    /// Owning source file.
    pub source_file_id: Uuid,
    /// Blob URI of the compressed payload.
    pub uri: String,
    /// Compression codec tag; always `zstd`.
    pub codec: String,
    /// Number of lines captured in this block.
    pub line_count: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A stored report pack (filtered export bundle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPack {
    /// Entity id.
    pub id: Uuid,
    /// Caller-chosen pack name.
    pub name: String,
    /// Filter map the pack was built from.
    pub filters: serde_json::Value,
    /// Blob URI of the ZIP under `report-packs/`.
    pub uri: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

//─────────────────────────────
//  Pipeline records
//─────────────────────────────

/// Evidence location of a single source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePointer {
    /// Raw block the line was captured into.
    pub raw_block_id: Uuid,
    /// Zero-based index of the line within the block.
    pub raw_line_index: i32,
    /// 1-based monotone counter over non-skipped source lines. Events
    /// without one are never persisted.
    pub global_line_no: Option<i64>,
}

/// A cleaned payload line within a normalized block, retaining its evidence
/// tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadLine {
    /// Cleaned line text (mentions and markdown emphasis stripped).
    pub text: String,
    /// Raw block the original line lives in.
    pub raw_block_id: Uuid,
    /// Zero-based line index within that block.
    pub raw_line_index: i32,
    /// Global line counter value for this line.
    pub global_line_no: i64,
}

impl PayloadLine {
    /// Evidence pointer for this line.
    pub fn evidence(&self) -> EvidencePointer {
        EvidencePointer {
            raw_block_id: self.raw_block_id,
            raw_line_index: self.raw_line_index,
            global_line_no: Some(self.global_line_no),
        }
    }
}

/// A contiguous group of source lines sharing one timestamp header and
/// (optionally) a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBlock {
    /// Block title, when the first content line looked like one.
    pub title: Option<String>,
    /// Resolved timestamp, in UTC.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Confidence tier of `occurred_at`.
    pub occurred_at_quality: OccurredAtQuality,
    /// Ordered payload lines.
    pub payload: Vec<PayloadLine>,
}

impl NormalizedBlock {
    /// Trimmed title, or the empty string when the block has none.
    pub fn title_str(&self) -> &str {
        self.title.as_deref().map(str::trim).unwrap_or("")
    }
}

/// A typed event extracted from one payload line, before dictionary ids and
/// the dedupe key are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Event type natural key, e.g. `BANK_WITHDRAW`.
    pub event_type: String,
    /// Natural id of the acting player.
    pub src_player: Option<String>,
    /// Natural id of the receiving player (or search target).
    pub dst_player: Option<String>,
    /// Display name captured next to the acting player id, for alias
    /// recording.
    pub src_player_name: Option<String>,
    /// Display name captured next to the receiving player id.
    pub dst_player_name: Option<String>,
    /// Item name, when the event moves an item.
    pub item: Option<String>,
    /// Container key, when the event touches a container.
    pub container: Option<String>,
    /// Money amount in minor-unit-less integer form.
    pub money: Option<i64>,
    /// Item quantity.
    pub qty: Option<i64>,
    /// Parser-specific metadata map.
    pub metadata: Option<serde_json::Value>,
    /// Evidence tuple of the payload line this event was derived from.
    pub evidence: EvidencePointer,
}

impl EventData {
    /// A bare event of the given type anchored to `evidence`; all optional
    /// fields unset. Parsers fill in the rest with struct-update syntax.
    pub fn new(event_type: impl Into<String>, evidence: EvidencePointer) -> Self {
        Self {
            event_type: event_type.into(),
            src_player: None,
            dst_player: None,
            src_player_name: None,
            dst_player_name: None,
            item: None,
            container: None,
            money: None,
            qty: None,
            metadata: None,
            evidence,
        }
    }
}

/// A persisted event joined with its dictionary rows, as served by the query
/// surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventView {
    /// Event id.
    pub id: Uuid,
    /// Job that produced the event.
    pub ingest_job_id: Uuid,
    /// Resolved timestamp.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Timestamp confidence tier.
    pub occurred_at_quality: OccurredAtQuality,
    /// Event type natural key.
    pub event_type: String,
    /// Acting player natural id.
    pub src_player_id: Option<String>,
    /// Receiving player natural id.
    pub dst_player_id: Option<String>,
    /// Item name.
    pub item: Option<String>,
    /// Container key.
    pub container: Option<String>,
    /// Money amount (integer minor units).
    pub money: Option<i64>,
    /// Quantity.
    pub qty: Option<i64>,
    /// Parser metadata map.
    pub metadata: serde_json::Value,
    /// Evidence: raw block id.
    pub raw_block_id: Uuid,
    /// Evidence: zero-based line index.
    pub raw_line_index: i32,
    /// Monotone source order key.
    pub global_line_no: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_round_trips_through_strings() {
        for q in [
            OccurredAtQuality::Absolute,
            OccurredAtQuality::Relative,
            OccurredAtQuality::TimeOnly,
            OccurredAtQuality::Unknown,
        ] {
            assert_eq!(q.as_str().parse::<OccurredAtQuality>().unwrap(), q);
        }
        assert!("SOMETIMES".parse::<OccurredAtQuality>().is_err());
    }

    #[test]
    fn job_status_round_trips_through_strings() {
        for s in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
    }

    #[test]
    fn event_data_defaults_are_empty() {
        let ev = EventData::new(
            "CONNECT",
            EvidencePointer {
                raw_block_id: Uuid::new_v4(),
                raw_line_index: 3,
                global_line_no: Some(17),
            },
        );
        assert_eq!(ev.event_type, "CONNECT");
        assert!(ev.src_player.is_none());
        assert!(ev.money.is_none());
        assert!(ev.metadata.is_none());
    }

    #[test]
    fn quality_serde_uses_screaming_case() {
        let json = serde_json::to_string(&OccurredAtQuality::TimeOnly).unwrap();
        assert_eq!(json, "\"TIME_ONLY\"");
    }
}
