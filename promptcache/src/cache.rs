//! Cache facade: the public `get`/`set`/`clear`/`statistics` surface.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   get/set   │
//! └──────┬──────┘
//!        │  fingerprint
//!        ▼
//! ┌─────────────┐     Hit
//! │ MemoryIndex │────────────► Return
//! └──────┬──────┘
//!        │ Miss
//!        ▼
//! ┌─────────────┐
//! │ SqliteStore │────────────► Promote + Return
//! └─────────────┘
//! ```
//!
//! Writes go through the codec, make room in the index (mirroring evictions
//! to the store), write through to the store and then land in the index.
//!
//! # Concurrency
//!
//! The memory index, `total_size_bytes` and the counters live behind one
//! async mutex. Every operation that touches them, including eviction and
//! the expiry worker, holds it for the whole step, durable store I/O
//! included, so a reader never sees an entry present in one tier only.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec::EntryCodec;
use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::eviction::EvictionEngine;
use crate::index::MemoryIndex;
use crate::key::{CacheKey, Parameters};
use crate::stats::{CacheStatistics, Counters};
use crate::store::{DurableStore, SqliteStore, StorePredicate, StoreStatistics};

/// Expired keys removed per critical section by the expiry worker.
const EXPIRY_BATCH: usize = 256;

/// State guarded by the shared region.
struct CacheState {
    index: MemoryIndex,
    counters: Counters,
    /// Set when a store-wide clear failed: rows created before this instant
    /// are treated as cleared until a purge or a later clear removes them.
    cleared_before: Option<DateTime<Utc>>,
}

struct CacheInner {
    config: CacheConfig,
    codec: EntryCodec,
    eviction: EvictionEngine,
    store: Option<Arc<dyn DurableStore>>,
    store_degraded: bool,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

/// Two-tier response cache.
///
/// Owns a background expiry task for its whole lifetime; call
/// [`shutdown`](Self::shutdown) to stop it deterministically. Dropping the
/// cache also signals the task to stop.
pub struct ResponseCache {
    inner: Arc<CacheInner>,
    shutdown_tx: watch::Sender<bool>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ResponseCache {
    /// Open a cache using the system clock.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: CacheConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open a cache with a custom time source.
    ///
    /// If the durable store cannot be opened the cache runs memory-only for
    /// the rest of the process lifetime.
    pub fn open_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let (store, degraded) = match &config.store_path {
            Some(path) => match SqliteStore::open(path) {
                Ok(store) => {
                    info!("Response cache store opened at {}", path.display());
                    (Some(Arc::new(store) as Arc<dyn DurableStore>), false)
                }
                Err(e) => {
                    warn!(
                        "Failed to open cache store at {}, running memory-only: {}",
                        path.display(),
                        e
                    );
                    (None, true)
                }
            },
            None => (None, false),
        };

        Self::build(config, store, degraded, clock)
    }

    /// Build a cache around an existing durable store (or none).
    pub fn with_store(
        config: CacheConfig,
        store: Option<Arc<dyn DurableStore>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Self::build(config, store, false, clock)
    }

    fn build(
        config: CacheConfig,
        store: Option<Arc<dyn DurableStore>>,
        store_degraded: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Config("ResponseCache must be created inside a Tokio runtime".to_string())
        })?;

        let inner = Arc::new(CacheInner {
            codec: EntryCodec::new(config.compression, config.compression_threshold_bytes),
            eviction: EvictionEngine::new(config.eviction_policy),
            store,
            store_degraded,
            clock,
            state: Mutex::new(CacheState {
                index: MemoryIndex::new(),
                counters: Counters::default(),
                cleared_before: None,
            }),
            config,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = runtime.spawn(run_expiry_worker(Arc::clone(&inner), shutdown_rx));

        debug!(
            max_size_bytes = inner.config.max_size_bytes,
            policy = %inner.eviction.policy(),
            durable = inner.store.is_some(),
            "Response cache ready"
        );

        Ok(Self {
            inner,
            shutdown_tx,
            worker: parking_lot::Mutex::new(Some(worker)),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Look up a cached value. Misses, expired entries and undecodable
    /// entries all come back as `None`.
    pub async fn get<V: DeserializeOwned>(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
    ) -> Option<V> {
        let key = CacheKey::fingerprint(prompt, model, parameters);
        self.inner.get(&key).await
    }

    /// Store a value under the configured default TTL.
    pub async fn set<V: Serialize + ?Sized>(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
        value: &V,
    ) -> Result<()> {
        let ttl = self.inner.config.default_ttl();
        self.set_with_ttl(prompt, model, parameters, value, ttl).await
    }

    /// Store a value with an explicit TTL; `None` never expires by time.
    ///
    /// Only an encoding failure is returned. Durable store failures are
    /// logged and the value is still cached in memory.
    pub async fn set_with_ttl<V: Serialize + ?Sized>(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = CacheKey::fingerprint(prompt, model, parameters);
        let encoded = self.inner.codec.encode(value)?;
        let entry = CacheEntry::new(key, encoded, ttl, self.inner.clock.now());
        self.inner.insert(entry).await;
        Ok(())
    }

    /// Remove one request's entry from both tiers.
    pub async fn invalidate(&self, prompt: &str, model: &str, parameters: &Parameters) -> bool {
        let key = CacheKey::fingerprint(prompt, model, parameters);
        let mut state = self.inner.state.lock().await;
        let in_memory = state.index.remove(&key).is_some();
        let in_store = self.inner.delete_from_store(&mut state, &key).await;
        in_memory || in_store
    }

    /// Empty both tiers. Counters are cumulative and survive.
    ///
    /// If the store refuses a wholesale clear, the keys held in memory are
    /// deleted one at a time and any older row left behind is no longer
    /// served.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        let now = self.inner.clock.now();
        let dropped = state.index.len();

        if let Some(store) = &self.inner.store {
            match store.clear().await {
                Ok(rows) => {
                    state.cleared_before = None;
                    info!("Cleared cache ({} in memory, {} stored)", dropped, rows);
                }
                Err(e) => {
                    warn!("Failed to clear cache store, deleting keys one by one: {}", e);
                    state.counters.store_error();
                    let keys: Vec<CacheKey> =
                        state.index.iter().map(|entry| entry.key.clone()).collect();
                    for key in &keys {
                        self.inner.delete_from_store(&mut state, key).await;
                    }
                    state.cleared_before = Some(now);
                }
            }
        } else {
            info!("Cleared cache ({} in memory)", dropped);
        }

        state.index.clear();
    }

    pub async fn statistics(&self) -> CacheStatistics {
        let state = self.inner.state.lock().await;
        state.counters.snapshot(
            state.index.total_size_bytes(),
            state.index.len(),
            self.inner.config.max_size_bytes,
            self.inner.store_degraded,
        )
    }

    /// Aggregate view of the durable tier, `None` when running memory-only
    /// or when the store cannot be read.
    pub async fn store_statistics(&self) -> Option<StoreStatistics> {
        let store = self.inner.store.as_ref()?;
        match store.statistics().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Failed to read cache store statistics: {}", e);
                None
            }
        }
    }

    /// Run one expiry pass now. Returns the number of entries removed
    /// across both tiers.
    pub async fn purge_expired(&self) -> usize {
        self.inner.purge_expired().await
    }

    /// Stop the expiry worker and wait for it to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Expiry worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("max_size_bytes", &self.inner.config.max_size_bytes)
            .field("policy", &self.inner.eviction.policy())
            .field("store", &self.inner.store.as_ref().map(|s| s.backend_name()))
            .field("store_degraded", &self.inner.store_degraded)
            .finish()
    }
}

impl CacheInner {
    async fn get<V: DeserializeOwned>(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        // Memory tier
        let memory = state.index.get(key).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(self.codec.decode::<V>(&entry.value, entry.compressed))
            }
        });

        match memory {
            Some(None) => {
                debug!(key = %key.short(), "Cache entry expired, removing");
                state.index.remove(key);
                self.delete_from_store(&mut state, key).await;
                state.counters.expired(1);
                state.counters.miss();
                return None;
            }
            Some(Some(Ok(value))) => {
                state.index.touch(key, now);
                state.counters.hit();
                self.touch_in_store(&mut state, key, now).await;
                return Some(value);
            }
            Some(Some(Err(e))) => {
                warn!(key = %key.short(), "Dropping undecodable cache entry: {}", e);
                state.index.remove(key);
                self.delete_from_store(&mut state, key).await;
                state.counters.miss();
                return None;
            }
            None => {}
        }

        // Durable tier
        let Some(store) = &self.store else {
            state.counters.miss();
            return None;
        };

        let mut entry = match store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                state.counters.miss();
                return None;
            }
            Err(e) => {
                warn!(key = %key.short(), "Cache store lookup failed: {}", e);
                state.counters.store_error();
                state.counters.miss();
                return None;
            }
        };

        if state
            .cleared_before
            .is_some_and(|cutoff| entry.created_at < cutoff)
        {
            debug!(key = %key.short(), "Stored cache entry predates a clear, removing");
            self.delete_from_store(&mut state, key).await;
            state.counters.miss();
            return None;
        }

        if entry.is_expired(now) {
            debug!(key = %key.short(), "Stored cache entry expired, removing");
            self.delete_from_store(&mut state, key).await;
            state.counters.expired(1);
            state.counters.miss();
            return None;
        }

        let value = match self.codec.decode::<V>(&entry.value, entry.compressed) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key.short(), "Dropping undecodable stored entry: {}", e);
                self.delete_from_store(&mut state, key).await;
                state.counters.miss();
                return None;
            }
        };

        // Promote into the memory tier
        entry.touch(now);
        self.make_room(&mut state, entry.size_bytes, Some(key)).await;
        state.index.put(entry);
        state.counters.hit();
        self.touch_in_store(&mut state, key, now).await;

        debug!(key = %key.short(), "Promoted stored cache entry");
        Some(value)
    }

    async fn insert(&self, entry: CacheEntry) {
        let mut state = self.state.lock().await;

        if entry.compressed {
            state.counters.compressed();
        }

        // A re-set replaces the old entry outright
        state.index.remove(&entry.key);
        self.make_room(&mut state, entry.size_bytes, Some(&entry.key)).await;

        if let Some(store) = &self.store {
            if let Err(e) = store.put(&entry).await {
                warn!(
                    key = %entry.key.short(),
                    "Cache store write failed, keeping entry in memory only: {}",
                    e
                );
                state.counters.store_error();
                // The previous row for this key must not outlive the new value
                self.delete_from_store(&mut state, &entry.key).await;
            }
        }

        debug!(key = %entry.key.short(), size = entry.size_bytes, "Cached entry");
        state.index.put(entry);
    }

    /// Evict until `incoming` more bytes fit under capacity.
    ///
    /// Drains to the configured target ratio, or lower when the incoming
    /// entry needs more headroom. An entry larger than the whole capacity
    /// empties the index and is still admitted.
    async fn make_room(&self, state: &mut CacheState, incoming: u64, exclude: Option<&CacheKey>) {
        let max = self.config.max_size_bytes;
        if !EvictionEngine::needs_eviction(&state.index, incoming, max) {
            return;
        }

        let target = self
            .config
            .target_size_bytes()
            .min(max.saturating_sub(incoming));
        let evicted = self.eviction.evict_to(&mut state.index, target, exclude);
        state.counters.evicted(evicted.len() as u64);

        for entry in &evicted {
            self.delete_from_store(state, &entry.key).await;
        }

        if !evicted.is_empty() {
            debug!(
                "Evicted {} entries, memory tier now {} bytes",
                evicted.len(),
                state.index.total_size_bytes()
            );
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let expired = self.state.lock().await.index.expired_keys(now);

        let mut removed = 0;
        for batch in expired.chunks(EXPIRY_BATCH) {
            let mut state = self.state.lock().await;
            let mut batch_removed = 0;
            for key in batch {
                // Skip keys rewritten since the scan
                let still_expired = state
                    .index
                    .get(key)
                    .is_some_and(|entry| entry.is_expired(now));
                if still_expired {
                    state.index.remove(key);
                    self.delete_from_store(&mut state, key).await;
                    batch_removed += 1;
                }
            }
            state.counters.expired(batch_removed as u64);
            removed += batch_removed;
        }

        // Rows that never made it into (or were evicted from) memory
        if let Some(store) = &self.store {
            let mut state = self.state.lock().await;
            match store.delete_where(StorePredicate::ExpiredAt(now)).await {
                Ok(rows) => {
                    state.counters.expired(rows as u64);
                    removed += rows;
                }
                Err(e) => {
                    warn!("Failed to purge expired rows from cache store: {}", e);
                    state.counters.store_error();
                }
            }

            if let Some(cutoff) = state.cleared_before {
                match store.delete_where(StorePredicate::CreatedBefore(cutoff)).await {
                    Ok(rows) => {
                        debug!("Removed {} rows left behind by a failed clear", rows);
                        state.cleared_before = None;
                    }
                    Err(e) => {
                        warn!("Failed to remove rows left behind by a clear: {}", e);
                        state.counters.store_error();
                    }
                }
            }
        }

        removed
    }

    async fn delete_from_store(&self, state: &mut CacheState, key: &CacheKey) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.delete(key).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(key = %key.short(), "Cache store delete failed: {}", e);
                state.counters.store_error();
                false
            }
        }
    }

    async fn touch_in_store(&self, state: &mut CacheState, key: &CacheKey, now: DateTime<Utc>) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.touch(key, now).await {
            debug!(key = %key.short(), "Cache store touch failed: {}", e);
            state.counters.store_error();
        }
    }
}

/// Background loop removing expired entries until shutdown is signalled.
async fn run_expiry_worker(inner: Arc<CacheInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let period = inner.config.expiry_interval();
    info!("Cache expiry worker started (interval: {:?})", period);

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = inner.purge_expired().await;
                if removed > 0 {
                    info!("Expiry worker removed {} expired entries", removed);
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Cache expiry worker shutting down");
                    break;
                }
            }
        }
    }
}
