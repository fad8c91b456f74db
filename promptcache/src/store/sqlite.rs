//! SQLite-backed durable store

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{DurableStore, StorePredicate, StoreStatistics};
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::key::CacheKey;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS prompt_cache (
        key           TEXT PRIMARY KEY,
        value         BLOB NOT NULL,
        created_at    INTEGER NOT NULL,
        last_accessed INTEGER NOT NULL,
        access_count  INTEGER NOT NULL DEFAULT 1,
        ttl_seconds   INTEGER,
        size_bytes    INTEGER NOT NULL,
        compressed    INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_last_accessed ON prompt_cache(last_accessed);
    CREATE INDEX IF NOT EXISTS idx_access_count ON prompt_cache(access_count);
    CREATE INDEX IF NOT EXISTS idx_created_at ON prompt_cache(created_at);
"#;

const SELECT_COLUMNS: &str =
    "key, value, created_at, last_accessed, access_count, ttl_seconds, size_bytes, compressed";

/// SQLite-based durable store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        // WAL keeps a crash mid-write from leaving a torn row
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA cache_size=-64000;
             PRAGMA temp_store=MEMORY;",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(
            "PRAGMA cache_size=-64000;
             PRAGMA temp_store=MEMORY;",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    #[instrument(skip(self, entry), fields(key = %entry.key.short(), size = entry.size_bytes))]
    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO prompt_cache
            (key, value, created_at, last_accessed, access_count, ttl_seconds, size_bytes, compressed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry.key.as_str(),
                &entry.value,
                entry.created_at.timestamp_millis(),
                entry.last_accessed.timestamp_millis(),
                entry.access_count as i64,
                entry.ttl_seconds(),
                entry.size_bytes as i64,
                entry.compressed,
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key.short()))]
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM prompt_cache WHERE key = ?", SELECT_COLUMNS);
        let entry = conn
            .query_row(&sql, params![key.as_str()], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    #[instrument(skip(self), fields(key = %key.short()))]
    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM prompt_cache WHERE key = ?", params![key.as_str()])?;
        Ok(deleted > 0)
    }

    #[instrument(skip(self))]
    async fn delete_where(&self, predicate: StorePredicate) -> Result<usize> {
        let conn = self.conn.lock().await;
        let deleted = match predicate {
            StorePredicate::ExpiredAt(now) => conn.execute(
                "DELETE FROM prompt_cache
                 WHERE ttl_seconds IS NOT NULL
                   AND ? - created_at > ttl_seconds * 1000",
                params![now.timestamp_millis()],
            )?,
            StorePredicate::CreatedBefore(cutoff) => conn.execute(
                "DELETE FROM prompt_cache WHERE created_at < ?",
                params![cutoff.timestamp_millis()],
            )?,
        };
        debug!("Deleted {} rows matching {:?}", deleted, predicate);
        Ok(deleted)
    }

    async fn scan(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM prompt_cache", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    #[instrument(skip(self), fields(key = %key.short()))]
    async fn touch(&self, key: &CacheKey, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE prompt_cache
             SET last_accessed = MAX(created_at, ?), access_count = access_count + 1
             WHERE key = ?",
            params![at.timestamp_millis(), key.as_str()],
        )?;
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count = conn.execute("DELETE FROM prompt_cache", [])?;
        Ok(count)
    }

    async fn statistics(&self) -> Result<StoreStatistics> {
        let conn = self.conn.lock().await;
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(size_bytes), 0),
                    COALESCE(AVG(access_count), 0.0),
                    COALESCE(SUM(compressed), 0)
             FROM prompt_cache",
            [],
            |row| {
                Ok(StoreStatistics {
                    entries: row.get::<_, i64>(0)? as u64,
                    total_size_bytes: row.get::<_, i64>(1)? as u64,
                    average_access_count: row.get(2)?,
                    compressed_entries: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    let key = CacheKey::parse(row.get::<_, String>(0)?).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let value: Vec<u8> = row.get(1)?;
    let created_at = millis_to_datetime(row.get(2)?, 2)?;
    let last_accessed = millis_to_datetime(row.get(3)?, 3)?;
    let access_count: i64 = row.get(4)?;
    let ttl_seconds: Option<i64> = row.get(5)?;
    let size_bytes: i64 = row.get(6)?;
    let compressed: bool = row.get(7)?;

    Ok(CacheEntry {
        key,
        value,
        created_at,
        last_accessed,
        access_count: access_count.max(1) as u64,
        ttl: ttl_seconds.map(|s| Duration::from_secs(s.max(0) as u64)),
        size_bytes: size_bytes.max(0) as u64,
        compressed,
    })
}

fn millis_to_datetime(millis: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            Box::new(CacheError::Decoding(format!(
                "timestamp out of range: {}",
                millis
            ))),
        )
    })
}
