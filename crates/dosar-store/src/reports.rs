//! Report-pack metadata rows. The ZIP assembly itself happens in the API
//! layer; this module only records what was generated and where it lives.

use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use dosar_types::ReportPack;

use crate::{Store, StoreError};

fn pack_from_row(row: &PgRow) -> ReportPack {
    ReportPack {
        id: row.get("id"),
        name: row.get("name"),
        filters: row.get("filters"),
        uri: row.get("uri"),
        created_at: row.get("created_at"),
    }
}

impl Store {
    /// Record a generated report pack.
    pub async fn create_report_pack(
        &self,
        name: &str,
        filters: serde_json::Value,
        uri: &str,
    ) -> Result<ReportPack, StoreError> {
        let row = sqlx::query(
            "INSERT INTO report_pack (id, name, filters, uri) VALUES ($1, $2, $3, $4)
             RETURNING id, name, filters, uri, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(filters)
        .bind(uri)
        .fetch_one(self.pool())
        .await?;
        Ok(pack_from_row(&row))
    }

    /// All report packs, newest first.
    pub async fn list_report_packs(&self) -> Result<Vec<ReportPack>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, filters, uri, created_at FROM report_pack ORDER BY created_at DESC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(pack_from_row).collect())
    }

    /// Fetch one report pack.
    pub async fn get_report_pack(&self, id: Uuid) -> Result<ReportPack, StoreError> {
        let row = sqlx::query("SELECT id, name, filters, uri, created_at FROM report_pack WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| pack_from_row(&r))
            .ok_or(StoreError::NotFound("report pack"))
    }
}
