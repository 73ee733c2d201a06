//! Event persistence: dedupe keys, monthly partition provisioning,
//! replay-tolerant insertion, unknown-signature aggregates, and the joined
//! query surface.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;
use uuid::Uuid;

use dosar_types::{EventView, OccurredAtQuality};

use crate::{Store, StoreError};

//─────────────────────────────
//  Pure derivations
//─────────────────────────────

/// Content-derived 64-hex key that identifies an emitted event across
/// re-runs of the same source file.
pub fn dedupe_key(
    source_sha256: &str,
    global_line_no: i64,
    event_type_id: i32,
    event_type_key: &str,
) -> String {
    let seed = format!("{source_sha256}:{global_line_no}:{event_type_id}:{event_type_key}");
    hex::encode(Sha256::digest(seed.as_bytes()))
}

/// A monthly partition of the `event` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthPartition {
    /// Partition table name, `event_YYYY_MM`.
    pub table: String,
    /// Inclusive range start (first of the month, UTC midnight).
    pub start: DateTime<Utc>,
    /// Exclusive range end (first of the next month).
    pub end: DateTime<Utc>,
}

/// The partition covering `occurred_at`.
pub fn month_partition(occurred_at: DateTime<Utc>) -> MonthPartition {
    let (year, month) = (occurred_at.year(), occurred_at.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    MonthPartition {
        table: format!("event_{year:04}_{month:02}"),
        start: first_of_month(year, month),
        end: first_of_month(next_year, next_month),
    }
}

fn first_of_month(year: i32, month: u32) -> DateTime<Utc> {
    match Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0) {
        chrono::LocalResult::Single(dt) => dt,
        _ => unreachable!("first of month is unambiguous in UTC"),
    }
}

//─────────────────────────────
//  Insertion
//─────────────────────────────

/// A fully resolved event row, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Owning source file.
    pub source_file_id: Uuid,
    /// Job that produced the row.
    pub ingest_job_id: Uuid,
    /// Producing parser id.
    pub parser_id: String,
    /// Producing parser version.
    pub parser_version: String,
    /// Resolved timestamp.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Timestamp confidence tier.
    pub occurred_at_quality: OccurredAtQuality,
    /// Interned event type.
    pub event_type_id: i32,
    /// Interned acting player.
    pub src_player_id: Option<i32>,
    /// Interned receiving player.
    pub dst_player_id: Option<i32>,
    /// Interned item.
    pub item_id: Option<i32>,
    /// Interned container.
    pub container_id: Option<i32>,
    /// Money amount (integer minor units).
    pub money: Option<i64>,
    /// Quantity.
    pub qty: Option<i64>,
    /// Parser metadata map.
    pub metadata: serde_json::Value,
    /// Evidence: raw block.
    pub raw_block_id: Uuid,
    /// Evidence: zero-based line index.
    pub raw_line_index: i32,
    /// Monotone source order key.
    pub global_line_no: i64,
    /// Content-derived dedupe key.
    pub dedupe_hash: String,
}

impl Store {
    /// Provision the monthly partition covering `occurred_at`, together with
    /// its three indexes. Idempotent, and tolerant of concurrent workers
    /// provisioning the same month.
    pub async fn ensure_month_partition(
        &self,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let part = month_partition(occurred_at);
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {table} PARTITION OF event \
                 FOR VALUES FROM ('{start}') TO ('{end}')",
                table = part.table,
                start = part.start.to_rfc3339(),
                end = part.end.to_rfc3339(),
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_{table}_dedupe ON {table} (dedupe_hash)",
                table = part.table,
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_job_time ON {table} (ingest_job_id, occurred_at)",
                table = part.table,
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_job_type ON {table} (ingest_job_id, event_type_id)",
                table = part.table,
            ),
        ];
        for statement in &statements {
            if let Err(err) = sqlx::query(statement).execute(self.pool()).await {
                if crate::is_duplicate_object(&err) {
                    continue;
                }
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Insert one event row. Returns `false` (and logs at debug) when the
    /// dedupe key already exists - an expected replay hit, never an error.
    pub async fn insert_event(&self, event: &NewEvent) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO event (
                id, source_file_id, ingest_job_id, parser_id, parser_version,
                occurred_at, occurred_at_quality, event_type_id,
                src_player_id, dst_player_id, item_id, container_id,
                money, qty, metadata, raw_block_id, raw_line_index,
                global_line_no, dedupe_hash
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)",
        )
        .bind(Uuid::new_v4())
        .bind(event.source_file_id)
        .bind(event.ingest_job_id)
        .bind(&event.parser_id)
        .bind(&event.parser_version)
        .bind(event.occurred_at)
        .bind(event.occurred_at_quality.as_str())
        .bind(event.event_type_id)
        .bind(event.src_player_id)
        .bind(event.dst_player_id)
        .bind(event.item_id)
        .bind(event.container_id)
        .bind(event.money)
        .bind(event.qty)
        .bind(&event.metadata)
        .bind(event.raw_block_id)
        .bind(event.raw_line_index)
        .bind(event.global_line_no)
        .bind(&event.dedupe_hash)
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(true),
            Err(err) if crate::is_unique_violation(&err) => {
                debug!(dedupe = %event.dedupe_hash, "dedupe hit, event already present");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Persist the top unknown-signature aggregates for a job.
    pub async fn insert_unknown_signatures(
        &self,
        ingest_job_id: Uuid,
        signatures: &[(String, i64)],
    ) -> Result<(), StoreError> {
        for (signature, count) in signatures {
            sqlx::query(
                "INSERT INTO unknown_signature (id, ingest_job_id, signature, count)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(ingest_job_id)
            .bind(signature)
            .bind(count)
            .execute(self.pool())
            .await?;
        }
        Ok(())
    }
}

//─────────────────────────────
//  Query surface
//─────────────────────────────

/// Filters accepted by the event listing (and report-pack) queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Event type natural key.
    pub event_type: Option<String>,
    /// Player natural id, matched against src or dst.
    pub player_id: Option<String>,
    /// Producing job.
    pub ingest_job_id: Option<Uuid>,
    /// Inclusive lower bound on `occurred_at`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `occurred_at`.
    pub end: Option<DateTime<Utc>>,
    /// Page size.
    pub limit: i64,
    /// Page offset.
    pub offset: i64,
}

const EVENT_SELECT: &str = "SELECT e.id, e.ingest_job_id, e.occurred_at, e.occurred_at_quality,
       et.key AS event_type,
       sp.player_id AS src_player_id,
       dp.player_id AS dst_player_id,
       di.name AS item,
       dc.key AS container,
       e.money, e.qty, e.metadata,
       e.raw_block_id, e.raw_line_index, e.global_line_no,
       e.created_at
  FROM event e
  JOIN dict_event_type et ON e.event_type_id = et.id
  LEFT JOIN dict_player sp ON e.src_player_id = sp.id
  LEFT JOIN dict_player dp ON e.dst_player_id = dp.id
  LEFT JOIN dict_item di ON e.item_id = di.id
  LEFT JOIN dict_container dc ON e.container_id = dc.id
 WHERE 1 = 1";

fn event_view_from_row(row: &PgRow) -> EventView {
    let quality: String = row.get("occurred_at_quality");
    EventView {
        id: row.get("id"),
        ingest_job_id: row.get("ingest_job_id"),
        occurred_at: row.get("occurred_at"),
        occurred_at_quality: quality.parse().unwrap_or(OccurredAtQuality::Unknown),
        event_type: row.get("event_type"),
        src_player_id: row.get("src_player_id"),
        dst_player_id: row.get("dst_player_id"),
        item: row.get("item"),
        container: row.get("container"),
        money: row.get("money"),
        qty: row.get("qty"),
        metadata: row.get("metadata"),
        raw_block_id: row.get("raw_block_id"),
        raw_line_index: row.get("raw_line_index"),
        global_line_no: row.get("global_line_no"),
    }
}

impl Store {
    /// List events matching `filter`, newest first.
    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<EventView>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(EVENT_SELECT);
        if let Some(event_type) = &filter.event_type {
            qb.push(" AND et.key = ").push_bind(event_type);
        }
        if let Some(player) = &filter.player_id {
            qb.push(" AND (sp.player_id = ")
                .push_bind(player)
                .push(" OR dp.player_id = ")
                .push_bind(player)
                .push(")");
        }
        if let Some(job) = filter.ingest_job_id {
            qb.push(" AND e.ingest_job_id = ").push_bind(job);
        }
        if let Some(start) = filter.start {
            qb.push(" AND e.occurred_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            qb.push(" AND e.occurred_at <= ").push_bind(end);
        }
        qb.push(" ORDER BY e.created_at DESC, e.global_line_no DESC");
        qb.push(" LIMIT ").push_bind(filter.limit);
        qb.push(" OFFSET ").push_bind(filter.offset);

        let rows = qb.build().fetch_all(self.pool()).await?;
        Ok(rows.iter().map(event_view_from_row).collect())
    }

    /// Fetch one event by id.
    pub async fn get_event(&self, id: Uuid) -> Result<EventView, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(EVENT_SELECT);
        qb.push(" AND e.id = ").push_bind(id);
        let row = qb.build().fetch_optional(self.pool()).await?;
        row.map(|r| event_view_from_row(&r))
            .ok_or(StoreError::NotFound("event"))
    }

    /// The most recent events for a source file (job preview).
    pub async fn preview_events_for_source(
        &self,
        source_file_id: Uuid,
        limit: i64,
    ) -> Result<Vec<EventView>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(EVENT_SELECT);
        qb.push(" AND e.source_file_id = ").push_bind(source_file_id);
        qb.push(" ORDER BY e.created_at DESC, e.global_line_no DESC LIMIT ")
            .push_bind(limit);
        let rows = qb.build().fetch_all(self.pool()).await?;
        Ok(rows.iter().map(event_view_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_key_is_stable_and_hex() {
        let a = dedupe_key("ab".repeat(32).as_str(), 17, 3, "BANK_WITHDRAW");
        let b = dedupe_key("ab".repeat(32).as_str(), 17, 3, "BANK_WITHDRAW");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn dedupe_key_separates_event_types_on_one_line() {
        let digest = "cd".repeat(32);
        let a = dedupe_key(&digest, 5, 1, "CONNECT");
        let b = dedupe_key(&digest, 5, 2, "DISCONNECT");
        assert_ne!(a, b);
    }

    #[test]
    fn month_partition_covers_a_calendar_month() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 12, 14, 5, 0).unwrap();
        let part = month_partition(ts);
        assert_eq!(part.table, "event_2024_03");
        assert_eq!(part.start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(part.end, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn december_partition_rolls_into_next_year() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let part = month_partition(ts);
        assert_eq!(part.table, "event_2023_12");
        assert_eq!(part.end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }
}
