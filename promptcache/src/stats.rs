//! Cache statistics

/// Process-lifetime counters owned by one cache instance.
///
/// Lives inside the facade's shared region next to the memory index, so the
/// counters and `total_size_bytes` always move together.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    compressions: u64,
    expirations: u64,
    store_errors: u64,
}

impl Counters {
    pub fn hit(&mut self) {
        self.hits += 1;
        metrics::counter!("promptcache_hits_total").increment(1);
    }

    pub fn miss(&mut self) {
        self.misses += 1;
        metrics::counter!("promptcache_misses_total").increment(1);
    }

    pub fn evicted(&mut self, count: u64) {
        if count == 0 {
            return;
        }
        self.evictions += count;
        metrics::counter!("promptcache_evictions_total").increment(count);
    }

    pub fn compressed(&mut self) {
        self.compressions += 1;
    }

    pub fn expired(&mut self, count: u64) {
        if count == 0 {
            return;
        }
        self.expirations += count;
        metrics::counter!("promptcache_expirations_total").increment(count);
    }

    pub fn store_error(&mut self) {
        self.store_errors += 1;
    }

    pub fn snapshot(
        &self,
        total_size_bytes: u64,
        entry_count: usize,
        max_size_bytes: u64,
        store_degraded: bool,
    ) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            compressions: self.compressions,
            expirations: self.expirations,
            store_errors: self.store_errors,
            total_size_bytes,
            entry_count,
            max_size_bytes,
            store_degraded,
        }
    }
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    /// One per entry removed for capacity
    pub evictions: u64,
    /// Writes stored in compressed form
    pub compressions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Durable store operations that failed and were degraded around
    pub store_errors: u64,
    /// Current aggregate size of the memory tier
    pub total_size_bytes: u64,
    /// Entries currently in the memory tier
    pub entry_count: usize,
    pub max_size_bytes: u64,
    /// True when the durable tier is unavailable for this process
    pub store_degraded: bool,
}

impl CacheStatistics {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn utilization_percent(&self) -> f64 {
        if self.max_size_bytes == 0 {
            0.0
        } else {
            self.total_size_bytes as f64 / self.max_size_bytes as f64 * 100.0
        }
    }

    pub fn current_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn max_size_mb(&self) -> f64 {
        self.max_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let mut counters = Counters::default();
        counters.hit();
        counters.hit();
        counters.miss();
        counters.evicted(3);
        counters.evicted(0);
        counters.compressed();
        counters.expired(2);
        counters.store_error();

        let stats = counters.snapshot(512, 4, 1024, false);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.compressions, 1);
        assert_eq!(stats.expirations, 2);
        assert_eq!(stats.store_errors, 1);
        assert_eq!(stats.total_size_bytes, 512);
        assert_eq!(stats.entry_count, 4);
    }

    #[test]
    fn test_hit_rate() {
        let empty = CacheStatistics::default();
        assert_eq!(empty.hit_rate(), 0.0);

        let stats = CacheStatistics {
            hits: 1,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.total_requests(), 2);
    }

    #[test]
    fn test_utilization() {
        let stats = CacheStatistics {
            total_size_bytes: 256,
            max_size_bytes: 1024,
            ..Default::default()
        };
        assert!((stats.utilization_percent() - 25.0).abs() < f64::EPSILON);

        let no_capacity = CacheStatistics::default();
        assert_eq!(no_capacity.utilization_percent(), 0.0);
    }

    #[test]
    fn test_size_in_mb() {
        let stats = CacheStatistics {
            total_size_bytes: 1024 * 1024,
            max_size_bytes: 10 * 1024 * 1024,
            ..Default::default()
        };
        assert_eq!(stats.current_size_mb(), 1.0);
        assert_eq!(stats.max_size_mb(), 10.0);
    }
}
