//! The unit of storage shared by both tiers.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::codec::Encoded;
use crate::key::CacheKey;

/// A cached, already-encoded value plus its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Encoded payload, compressed when `compressed` is set
    pub value: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Starts at 1 on write, +1 per hit
    pub access_count: u64,
    /// `None` never expires by time
    pub ttl: Option<Duration>,
    /// Always `value.len()`
    pub size_bytes: u64,
    pub compressed: bool,
}

impl CacheEntry {
    /// Build a freshly written entry.
    ///
    /// Sub-second TTLs are rounded up to whole seconds, the store's resolution.
    pub fn new(
        key: CacheKey,
        encoded: Encoded,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Self {
        let size_bytes = encoded.bytes.len() as u64;
        Self {
            key,
            value: encoded.bytes,
            created_at: now,
            last_accessed: now,
            access_count: 1,
            ttl: ttl.map(round_up_to_secs),
            size_bytes,
            compressed: encoded.compressed,
        }
    }

    /// True once more than `ttl` has elapsed since creation.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = now.signed_duration_since(self.created_at);
                match chrono::Duration::from_std(ttl) {
                    Ok(ttl) => age > ttl,
                    Err(_) => false,
                }
            }
            None => false,
        }
    }

    /// Record one hit.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now.max(self.created_at);
        self.access_count = self.access_count.saturating_add(1);
    }

    pub fn ttl_seconds(&self) -> Option<i64> {
        self.ttl.map(|d| d.as_secs() as i64)
    }
}

fn round_up_to_secs(d: Duration) -> Duration {
    if d.subsec_nanos() > 0 {
        Duration::from_secs(d.as_secs() + 1)
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{fingerprint, Parameters};

    fn entry(ttl: Option<Duration>, now: DateTime<Utc>) -> CacheEntry {
        let encoded = Encoded {
            bytes: b"\"hello\"".to_vec(),
            compressed: false,
        };
        CacheEntry::new(fingerprint("p", "m", &Parameters::new()), encoded, ttl, now)
    }

    #[test]
    fn test_new_entry_bookkeeping() {
        let now = Utc::now();
        let e = entry(None, now);
        assert_eq!(e.size_bytes, e.value.len() as u64);
        assert_eq!(e.access_count, 1);
        assert_eq!(e.created_at, e.last_accessed);
        assert!(!e.compressed);
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = Utc::now();
        let e = entry(Some(Duration::from_secs(10)), now);

        assert!(!e.is_expired(now));
        assert!(!e.is_expired(now + chrono::Duration::seconds(10)));
        assert!(e.is_expired(now + chrono::Duration::milliseconds(10_001)));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let now = Utc::now();
        let e = entry(None, now);
        assert!(!e.is_expired(now + chrono::Duration::days(10_000)));
    }

    #[test]
    fn test_subsecond_ttl_rounds_up() {
        let e = entry(Some(Duration::from_millis(1500)), Utc::now());
        assert_eq!(e.ttl, Some(Duration::from_secs(2)));
        assert_eq!(e.ttl_seconds(), Some(2));
    }

    #[test]
    fn test_touch_increments_once() {
        let now = Utc::now();
        let mut e = entry(None, now);
        let later = now + chrono::Duration::seconds(5);
        e.touch(later);
        assert_eq!(e.access_count, 2);
        assert_eq!(e.last_accessed, later);
    }

    #[test]
    fn test_touch_never_moves_before_creation() {
        let now = Utc::now();
        let mut e = entry(None, now);
        e.touch(now - chrono::Duration::seconds(5));
        assert!(e.last_accessed >= e.created_at);
    }
}
