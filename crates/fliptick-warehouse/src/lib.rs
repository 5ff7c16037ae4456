//! Append-only market history store.
//!
//! One row per observed (item, quality, enchantment, city) price/volume
//! snapshot. Rows are never updated in place; statistics are derived on
//! read and cached until the next ingestion or prune. The table carries no
//! primary key: ingesting the same observation twice double-counts it, so
//! the caller must ingest each observation at most once.

pub mod duckdb;
pub mod migrations;

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;
use serde::Serialize;
use thiserror::Error;

pub use duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let home = resolve_fliptick_home();
        let db_path = home.join("history.duckdb");
        Self {
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Identifies one tradeable line at the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct KeyRecord {
    pub item_id: String,
    pub quality: u8,
    pub enchantment: u8,
    pub city: String,
}

/// One price/volume observation, timestamped in SQL format
/// (`YYYY-MM-DD HH:MM:SS`, UTC).
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRecord {
    pub key: KeyRecord,
    pub price: i64,
    pub volume: i64,
    pub observed_at: String,
}

/// Half-open time window over `observed_at`, SQL-formatted bounds.
///
/// `start` is exclusive, `end` inclusive, matching the prune boundary: a
/// window starting at the prune cutoff sees exactly the surviving rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsWindow {
    pub start: String,
    pub end: String,
}

/// Aggregated statistics for one key within a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    /// Volume-weighted average price; arithmetic mean when the window's
    /// total volume is zero.
    pub avg_price: f64,
    pub avg_volume: f64,
    pub data_points: u64,
}

/// One entry of the volume ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopItemRow {
    pub key: KeyRecord,
    pub avg_price: f64,
    pub avg_volume: f64,
    pub data_points: u64,
}

#[derive(Clone)]
pub struct HistoryStore {
    manager: DuckDbConnectionManager,
    stats_cache: Arc<Mutex<HashMap<String, StatsRow>>>,
}

impl HistoryStore {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let store = Self {
            manager,
            stats_cache: Arc::new(Mutex::new(HashMap::new())),
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Append snapshots in one transaction and invalidate the stats cache.
    ///
    /// Not idempotent: re-ingesting an observation double-counts its volume.
    pub fn ingest(&self, rows: &[SnapshotRecord]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, StoreError> {
            for row in rows {
                let sql = format!(
                    r#"
INSERT INTO market_history (
    item_id, quality, enchantment, city, price, volume, observed_at
) VALUES (
    '{item_id}', {quality}, {enchantment}, '{city}', {price}, {volume},
    TRY_CAST('{observed_at}' AS TIMESTAMP)
);
"#,
                    item_id = escape_sql_string(row.key.item_id.as_str()),
                    quality = row.key.quality,
                    enchantment = row.key.enchantment,
                    city = escape_sql_string(row.key.city.as_str()),
                    price = row.price,
                    volume = row.volume,
                    observed_at = escape_sql_string(row.observed_at.as_str()),
                );
                connection.execute_batch(sql.as_str())?;
            }

            Ok(rows.len())
        })();

        let inserted = finalize_transaction(&connection, result)?;
        self.invalidate_stats_cache();
        Ok(inserted)
    }

    /// Aggregate statistics for one key, or `None` when the window holds no
    /// snapshots. Zero volume is a valid observation; an empty window is not.
    pub fn stats(
        &self,
        key: &KeyRecord,
        window: &StatsWindow,
    ) -> Result<Option<StatsRow>, StoreError> {
        let cache_key = stats_cache_key(key, window);
        {
            let cache = self
                .stats_cache
                .lock()
                .expect("stats cache mutex poisoned");
            if let Some(cached) = cache.get(&cache_key) {
                return Ok(Some(cached.clone()));
            }
        }

        let sql = format!(
            r#"
SELECT
    COUNT(*),
    CAST(COALESCE(SUM(volume), 0) AS DOUBLE),
    CAST(COALESCE(SUM(price * volume), 0) AS DOUBLE),
    COALESCE(AVG(price), 0),
    COALESCE(AVG(volume), 0)
FROM market_history
WHERE item_id = '{item_id}'
  AND quality = {quality}
  AND enchantment = {enchantment}
  AND city = '{city}'
  AND observed_at > TRY_CAST('{start}' AS TIMESTAMP)
  AND observed_at <= TRY_CAST('{end}' AS TIMESTAMP)
"#,
            item_id = escape_sql_string(key.item_id.as_str()),
            quality = key.quality,
            enchantment = key.enchantment,
            city = escape_sql_string(key.city.as_str()),
            start = escape_sql_string(window.start.as_str()),
            end = escape_sql_string(window.end.as_str()),
        );

        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let (data_points, total_volume, weighted_sum, mean_price, avg_volume) = connection
            .query_row(sql.as_str(), [], |row| {
                let data_points: i64 = row.get(0)?;
                let total_volume: f64 = row.get(1)?;
                let weighted_sum: f64 = row.get(2)?;
                let mean_price: f64 = row.get(3)?;
                let avg_volume: f64 = row.get(4)?;
                Ok((data_points, total_volume, weighted_sum, mean_price, avg_volume))
            })?;

        if data_points == 0 {
            return Ok(None);
        }

        let avg_price = if total_volume > 0.0 {
            weighted_sum / total_volume
        } else {
            mean_price
        };
        let stats = StatsRow {
            avg_price,
            avg_volume,
            data_points: data_points as u64,
        };

        self.stats_cache
            .lock()
            .expect("stats cache mutex poisoned")
            .insert(cache_key, stats.clone());

        Ok(Some(stats))
    }

    /// The `limit` keys with highest average volume in the window for one
    /// city. Ties break by higher average price, then `item_id` ascending.
    pub fn top_by_volume(
        &self,
        city: &str,
        limit: usize,
        window: &StatsWindow,
    ) -> Result<Vec<TopItemRow>, StoreError> {
        let sql = format!(
            r#"
SELECT
    item_id,
    quality,
    enchantment,
    city,
    CASE WHEN SUM(volume) > 0
         THEN CAST(SUM(price * volume) AS DOUBLE) / CAST(SUM(volume) AS DOUBLE)
         ELSE AVG(price)
    END AS avg_price,
    AVG(volume) AS avg_volume,
    COUNT(*) AS data_points
FROM market_history
WHERE city = '{city}'
  AND observed_at > TRY_CAST('{start}' AS TIMESTAMP)
  AND observed_at <= TRY_CAST('{end}' AS TIMESTAMP)
GROUP BY item_id, quality, enchantment, city
ORDER BY avg_volume DESC, avg_price DESC, item_id ASC
LIMIT {limit}
"#,
            city = escape_sql_string(city),
            start = escape_sql_string(window.start.as_str()),
            end = escape_sql_string(window.end.as_str()),
            limit = limit,
        );

        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement.query_map([], |row| {
            let item_id: String = row.get(0)?;
            let quality: i32 = row.get(1)?;
            let enchantment: i32 = row.get(2)?;
            let city: String = row.get(3)?;
            let avg_price: f64 = row.get(4)?;
            let avg_volume: f64 = row.get(5)?;
            let data_points: i64 = row.get(6)?;
            Ok(TopItemRow {
                key: KeyRecord {
                    item_id,
                    quality: quality as u8,
                    enchantment: enchantment as u8,
                    city,
                },
                avg_price,
                avg_volume,
                data_points: data_points as u64,
            })
        })?;

        let mut output = Vec::new();
        for row in rows {
            output.push(row?);
        }
        Ok(output)
    }

    /// Delete snapshots observed at or before `cutoff` and return the count.
    ///
    /// Pruning at the newest snapshot's timestamp leaves exactly the rows
    /// observed strictly after it.
    pub fn prune(&self, cutoff: &str) -> Result<usize, StoreError> {
        let sql = format!(
            "DELETE FROM market_history WHERE observed_at <= TRY_CAST('{}' AS TIMESTAMP)",
            escape_sql_string(cutoff)
        );

        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        let deleted = connection.execute(sql.as_str(), [])?;
        self.invalidate_stats_cache();
        Ok(deleted)
    }

    /// Newest `observed_at` for one key, SQL-formatted, or `None` when the
    /// key has never been ingested.
    pub fn latest_observation(&self, key: &KeyRecord) -> Result<Option<String>, StoreError> {
        let sql = format!(
            r#"
SELECT CAST(MAX(observed_at) AS VARCHAR)
FROM market_history
WHERE item_id = '{item_id}'
  AND quality = {quality}
  AND enchantment = {enchantment}
  AND city = '{city}'
"#,
            item_id = escape_sql_string(key.item_id.as_str()),
            quality = key.quality,
            enchantment = key.enchantment,
            city = escape_sql_string(key.city.as_str()),
        );

        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let latest: Option<String> = connection.query_row(sql.as_str(), [], |row| row.get(0))?;
        Ok(latest)
    }

    fn invalidate_stats_cache(&self) {
        self.stats_cache
            .lock()
            .expect("stats cache mutex poisoned")
            .clear();
    }
}

fn stats_cache_key(key: &KeyRecord, window: &StatsWindow) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        key.item_id, key.quality, key.enchantment, key.city, window.start, window.end
    )
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

fn resolve_fliptick_home() -> PathBuf {
    if let Some(path) = env::var_os("FLIPTICK_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".fliptick");
    }

    PathBuf::from(".fliptick")
}
