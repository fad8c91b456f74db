//! Capacity-driven eviction.

use tracing::debug;

use crate::config::EvictionPolicy;
use crate::entry::CacheEntry;
use crate::index::{IndexedEntry, MemoryIndex};
use crate::key::CacheKey;

/// Picks and removes victims from a [`MemoryIndex`] according to a policy.
///
/// The engine only touches the index. Mirroring removals to the durable
/// store is the caller's job, done inside the same critical section.
#[derive(Debug, Clone, Copy)]
pub struct EvictionEngine {
    policy: EvictionPolicy,
}

impl EvictionEngine {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Whether inserting `incoming` bytes would push the index past `max`.
    pub fn needs_eviction(index: &MemoryIndex, incoming: u64, max: u64) -> bool {
        index.total_size_bytes().saturating_add(incoming) > max
    }

    /// Candidate keys, first victim first. `exclude` is never a candidate.
    pub fn candidates(&self, index: &MemoryIndex, exclude: Option<&CacheKey>) -> Vec<CacheKey> {
        let mut ranked: Vec<((i64, i64, u64), &CacheKey)> = index
            .iter_indexed()
            .filter(|e| Some(&e.entry.key) != exclude)
            .map(|e| (self.rank(e), &e.entry.key))
            .collect();
        ranked.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        ranked.into_iter().map(|(_, k)| k.clone()).collect()
    }

    /// Remove entries until the index holds at most `target` bytes or no
    /// candidates remain. Returns the removed entries in eviction order.
    pub fn evict_to(
        &self,
        index: &mut MemoryIndex,
        target: u64,
        exclude: Option<&CacheKey>,
    ) -> Vec<CacheEntry> {
        if index.total_size_bytes() <= target {
            return Vec::new();
        }

        let mut evicted = Vec::new();
        for key in self.candidates(index, exclude) {
            if index.total_size_bytes() <= target {
                break;
            }
            if let Some(entry) = index.remove(&key) {
                debug!(
                    key = %key.short(),
                    size = entry.size_bytes,
                    policy = %self.policy,
                    "Evicting cache entry"
                );
                evicted.push(entry);
            }
        }
        evicted
    }

    /// Sort key for the configured policy; lower is evicted first.
    /// The index sequence is the final tie-breaker.
    fn rank(&self, indexed: &IndexedEntry) -> (i64, i64, u64) {
        let e = &indexed.entry;
        let last_accessed = e.last_accessed.timestamp_millis();
        let access_count = e.access_count.min(i64::MAX as u64) as i64;
        match self.policy {
            EvictionPolicy::Lru => (last_accessed, 0, indexed.seq),
            EvictionPolicy::Lfu => (access_count, 0, indexed.seq),
            EvictionPolicy::Ttl => (e.created_at.timestamp_millis(), 0, indexed.seq),
            EvictionPolicy::Hybrid => (access_count, last_accessed, indexed.seq),
        }
    }
}
