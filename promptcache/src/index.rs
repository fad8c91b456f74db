//! In-memory hot set of cache entries.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::entry::CacheEntry;
use crate::key::CacheKey;

/// An entry plus the index-local recency sequence used to break ties.
#[derive(Debug, Clone)]
pub(crate) struct IndexedEntry {
    pub entry: CacheEntry,
    pub seq: u64,
}

/// Map from key to entry with a running total of stored bytes.
///
/// Not synchronized; the facade keeps it inside its shared region.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: HashMap<CacheKey, IndexedEntry>,
    total_size_bytes: u64,
    access_counter: u64,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key).map(|e| &e.entry)
    }

    /// Insert or replace, returning the previous entry for the key.
    pub fn put(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let previous = self.remove(&entry.key);
        let seq = self.next_seq();
        self.total_size_bytes += entry.size_bytes;
        self.entries
            .insert(entry.key.clone(), IndexedEntry { entry, seq });
        previous
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.total_size_bytes = self
            .total_size_bytes
            .saturating_sub(removed.entry.size_bytes);
        Some(removed.entry)
    }

    /// Record a hit on `key`, returning the updated entry.
    pub fn touch(&mut self, key: &CacheKey, now: DateTime<Utc>) -> Option<&CacheEntry> {
        let seq = self.next_seq();
        let indexed = self.entries.get_mut(key)?;
        indexed.entry.touch(now);
        indexed.seq = seq;
        Some(&indexed.entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values().map(|e| &e.entry)
    }

    pub(crate) fn iter_indexed(&self) -> impl Iterator<Item = &IndexedEntry> {
        self.entries.values()
    }

    /// Keys of entries whose TTL has elapsed at `now`.
    pub fn expired_keys(&self, now: DateTime<Utc>) -> Vec<CacheKey> {
        self.iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_size_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    fn next_seq(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoded;
    use crate::key::{fingerprint, Parameters};
    use std::time::Duration;

    fn entry(prompt: &str, size: usize, ttl: Option<Duration>, now: DateTime<Utc>) -> CacheEntry {
        let encoded = Encoded {
            bytes: vec![b'x'; size],
            compressed: false,
        };
        CacheEntry::new(fingerprint(prompt, "m", &Parameters::new()), encoded, ttl, now)
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = MemoryIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.total_size_bytes(), 0);
    }

    #[test]
    fn test_put_and_get() {
        let mut index = MemoryIndex::new();
        let e = entry("a", 100, None, Utc::now());
        let key = e.key.clone();

        assert!(index.put(e).is_none());
        assert_eq!(index.len(), 1);
        assert_eq!(index.total_size_bytes(), 100);
        assert_eq!(index.get(&key).unwrap().size_bytes, 100);
    }

    #[test]
    fn test_replace_adjusts_size() {
        let mut index = MemoryIndex::new();
        let now = Utc::now();
        index.put(entry("a", 100, None, now));
        let previous = index.put(entry("a", 40, None, now));

        assert_eq!(previous.unwrap().size_bytes, 100);
        assert_eq!(index.len(), 1);
        assert_eq!(index.total_size_bytes(), 40);
    }

    #[test]
    fn test_remove() {
        let mut index = MemoryIndex::new();
        let e = entry("a", 2048, None, Utc::now());
        let key = e.key.clone();
        index.put(e);

        assert_eq!(index.remove(&key).unwrap().size_bytes, 2048);
        assert!(index.remove(&key).is_none());
        assert_eq!(index.total_size_bytes(), 0);
    }

    #[test]
    fn test_touch_bumps_sequence() {
        let mut index = MemoryIndex::new();
        let now = Utc::now();
        let a = entry("a", 10, None, now);
        let b = entry("b", 10, None, now);
        let (ka, kb) = (a.key.clone(), b.key.clone());
        index.put(a);
        index.put(b);

        let seq = |index: &MemoryIndex, k: &CacheKey| {
            index.iter_indexed().find(|e| &e.entry.key == k).unwrap().seq
        };
        assert!(seq(&index, &ka) < seq(&index, &kb));

        let touched = index.touch(&ka, now).unwrap();
        assert_eq!(touched.access_count, 2);
        assert!(seq(&index, &ka) > seq(&index, &kb));
    }

    #[test]
    fn test_expired_keys() {
        let mut index = MemoryIndex::new();
        let now = Utc::now();
        let short = entry("short", 10, Some(Duration::from_secs(5)), now);
        let short_key = short.key.clone();
        index.put(short);
        index.put(entry("long", 10, Some(Duration::from_secs(500)), now));
        index.put(entry("forever", 10, None, now));

        let expired = index.expired_keys(now + chrono::Duration::seconds(6));
        assert_eq!(expired, vec![short_key]);
    }

    #[test]
    fn test_clear() {
        let mut index = MemoryIndex::new();
        let now = Utc::now();
        index.put(entry("a", 1024, None, now));
        index.put(entry("b", 2048, None, now));

        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.total_size_bytes(), 0);
    }
}
