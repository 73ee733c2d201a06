//! Dictionary intern tables and the per-runner memo cache.
//!
//! Every dictionary is a monotonically growing (natural key -> serial id)
//! table. The intern protocol is `INSERT .. ON CONFLICT DO NOTHING RETURNING
//! id` followed by a single retry `SELECT` when another caller won the
//! insert, so concurrent callers always observe the same id. The in-process
//! memo is scoped to one [`DictCache`] instance (one job run), never to the
//! process.

use std::collections::{HashMap, HashSet};

use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::{Store, StoreError};

/// Container keys shaped `portbagaj_<playerId>_…` carry their owner's
/// natural player id at split index 1.
pub fn container_owner(key: &str) -> Option<&str> {
    if !key.starts_with("portbagaj_") {
        return None;
    }
    key.split('_').nth(1).filter(|part| !part.is_empty())
}

/// Job-scoped intern cache over the dictionary tables.
#[derive(Debug)]
pub struct DictCache {
    pool: PgPool,
    event_types: HashMap<String, i32>,
    players: HashMap<String, i32>,
    items: HashMap<String, i32>,
    containers: HashMap<String, i32>,
    aliases_seen: HashSet<(i32, String)>,
}

impl DictCache {
    /// A fresh cache bound to the store's pool.
    pub fn new(store: &Store) -> Self {
        Self {
            pool: store.pool().clone(),
            event_types: HashMap::new(),
            players: HashMap::new(),
            items: HashMap::new(),
            containers: HashMap::new(),
            aliases_seen: HashSet::new(),
        }
    }

    /// Intern an event-type key.
    pub async fn event_type_id(&mut self, key: &str) -> Result<i32, StoreError> {
        if let Some(&id) = self.event_types.get(key) {
            return Ok(id);
        }
        let id = intern(
            &self.pool,
            "INSERT INTO dict_event_type (key) VALUES ($1) ON CONFLICT (key) DO NOTHING RETURNING id",
            "SELECT id FROM dict_event_type WHERE key = $1",
            key,
        )
        .await?;
        self.event_types.insert(key.to_owned(), id);
        Ok(id)
    }

    /// Intern a player natural id.
    pub async fn player_id(&mut self, natural_id: &str) -> Result<i32, StoreError> {
        if let Some(&id) = self.players.get(natural_id) {
            return Ok(id);
        }
        let id = intern(
            &self.pool,
            "INSERT INTO dict_player (player_id) VALUES ($1) ON CONFLICT (player_id) DO NOTHING RETURNING id",
            "SELECT id FROM dict_player WHERE player_id = $1",
            natural_id,
        )
        .await?;
        self.players.insert(natural_id.to_owned(), id);
        Ok(id)
    }

    /// Intern an item name.
    pub async fn item_id(&mut self, name: &str) -> Result<i32, StoreError> {
        if let Some(&id) = self.items.get(name) {
            return Ok(id);
        }
        let id = intern(
            &self.pool,
            "INSERT INTO dict_item (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id",
            "SELECT id FROM dict_item WHERE name = $1",
            name,
        )
        .await?;
        self.items.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Intern a container key, deriving the owner player id for trunk-style
    /// keys on first insert.
    pub async fn container_id(&mut self, key: &str) -> Result<i32, StoreError> {
        if let Some(&id) = self.containers.get(key) {
            return Ok(id);
        }
        let owner = container_owner(key);
        let inserted = sqlx::query(
            "INSERT INTO dict_container (key, owner_player_id) VALUES ($1, $2)
             ON CONFLICT (key) DO NOTHING RETURNING id",
        )
        .bind(key)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        let id = match inserted {
            Some(row) => row.get::<i32, _>(0),
            None => sqlx::query("SELECT id FROM dict_container WHERE key = $1")
                .bind(key)
                .fetch_one(&self.pool)
                .await?
                .get::<i32, _>(0),
        };
        self.containers.insert(key.to_owned(), id);
        Ok(id)
    }

    /// Record a display-name sighting for an interned player. Duplicate
    /// sightings are no-ops both in the memo and in the table.
    pub async fn record_alias(&mut self, player_row_id: i32, alias: &str) -> Result<(), StoreError> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Ok(());
        }
        if !self
            .aliases_seen
            .insert((player_row_id, alias.to_owned()))
        {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO dict_alias (player_id, alias) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(player_row_id)
        .bind(alias)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn intern(
    pool: &PgPool,
    insert_sql: &str,
    select_sql: &str,
    key: &str,
) -> Result<i32, StoreError> {
    if let Some(row) = sqlx::query(insert_sql)
        .bind(key)
        .fetch_optional(pool)
        .await?
    {
        return Ok(row.get(0));
    }
    // Lost the insert race (or the key already existed): one retry read.
    let row = sqlx::query(select_sql).bind(key).fetch_one(pool).await?;
    Ok(row.get(0))
}

impl Store {
    /// Player natural ids matching `q` (substring, case-insensitive).
    pub async fn search_players(&self, q: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT player_id FROM dict_player WHERE player_id ILIKE $1 ORDER BY player_id LIMIT 20",
        )
        .bind(format!("%{q}%"))
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|r| r.get("player_id")).collect())
    }

    /// Player aliases matching `q` (substring, case-insensitive).
    pub async fn search_aliases(&self, q: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT alias FROM dict_alias WHERE alias ILIKE $1 ORDER BY alias LIMIT 20",
        )
        .bind(format!("%{q}%"))
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|r| r.get("alias")).collect())
    }
}
