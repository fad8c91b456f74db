//! Durable tier of the cache.
//!
//! A [`DurableStore`] is a file-backed table keyed by [`CacheKey`] whose rows
//! mirror [`CacheEntry`]. Every operation is individually atomic; there are no
//! multi-key transactions. SQLite ([`SqliteStore`]) is the only backend.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::CacheKey;

/// Row filter for [`DurableStore::delete_where`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePredicate {
    /// Rows with a TTL whose age at the given instant exceeds it
    ExpiredAt(DateTime<Utc>),
    /// Rows created strictly before the given instant
    CreatedBefore(DateTime<Utc>),
}

/// Aggregate view of the durable tier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStatistics {
    /// Number of persisted entries
    pub entries: u64,
    /// Sum of stored payload sizes
    pub total_size_bytes: u64,
    pub average_access_count: f64,
    pub compressed_entries: u64,
}

impl StoreStatistics {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Trait for durable cache backends
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or replace the row for `entry.key`
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Returns whether a row was removed
    async fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// Remove every row matching `predicate`, returning how many went
    async fn delete_where(&self, predicate: StorePredicate) -> Result<usize>;

    /// Every row. Statistics and debugging only, never the hot path.
    async fn scan(&self) -> Result<Vec<CacheEntry>>;

    /// Record one hit without rewriting the value
    async fn touch(&self, key: &CacheKey, at: DateTime<Utc>) -> Result<()>;

    /// Remove all rows, returning how many went
    async fn clear(&self) -> Result<usize>;

    async fn statistics(&self) -> Result<StoreStatistics>;

    fn backend_name(&self) -> &'static str;
}
