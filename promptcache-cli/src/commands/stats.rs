use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use promptcache::{CacheEntry, DurableStore, StoreStatistics};
use serde_json::json;
use std::path::Path;

/// Summary of a store file beyond the aggregate counters.
#[derive(Debug, Default, PartialEq)]
pub struct StoreReport {
    pub stats: StoreStatistics,
    pub expired_entries: u64,
    pub entries_without_ttl: u64,
    pub oldest_created: Option<DateTime<Utc>>,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl StoreReport {
    pub fn from_entries(
        stats: StoreStatistics,
        entries: &[CacheEntry],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            stats,
            expired_entries: entries.iter().filter(|e| e.is_expired(now)).count() as u64,
            entries_without_ttl: entries.iter().filter(|e| e.ttl.is_none()).count() as u64,
            oldest_created: entries.iter().map(|e| e.created_at).min(),
            last_accessed: entries.iter().map(|e| e.last_accessed).max(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "entries": self.stats.entries,
            "total_size_bytes": self.stats.total_size_bytes,
            "total_size_mb": self.stats.total_size_mb(),
            "average_access_count": self.stats.average_access_count,
            "compressed_entries": self.stats.compressed_entries,
            "expired_entries": self.expired_entries,
            "entries_without_ttl": self.entries_without_ttl,
            "oldest_created": self.oldest_created.map(|t| t.to_rfc3339()),
            "last_accessed": self.last_accessed.map(|t| t.to_rfc3339()),
        })
    }
}

/// Print statistics for the store at `path`.
pub async fn run_stats(path: &Path, as_json: bool) -> Result<()> {
    let store = super::open_existing(path)?;
    let stats = store.statistics().await.context("Failed to read statistics")?;
    let entries = store.scan().await.context("Failed to scan entries")?;
    let report = StoreReport::from_entries(stats, &entries, Utc::now());

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
        return Ok(());
    }

    let stats = &report.stats;
    println!();
    println!("Cache store: {}", path.display());
    println!("--------------------------------------------------------------------------------");
    println!("  Entries:             {}", stats.entries);
    println!("  Total size:          {:.2} MB", stats.total_size_mb());
    println!("  Avg access count:    {:.2}", stats.average_access_count);
    println!(
        "  Compressed:          {} ({:.1}%)",
        stats.compressed_entries,
        percent(stats.compressed_entries, stats.entries)
    );
    println!("  Expired (pending):   {}", report.expired_entries);
    println!("  Without TTL:         {}", report.entries_without_ttl);
    if let Some(oldest) = report.oldest_created {
        println!("  Oldest entry:        {}", oldest.to_rfc3339());
    }
    if let Some(last) = report.last_accessed {
        println!("  Last access:         {}", last.to_rfc3339());
    }
    if report.expired_entries > 0 {
        println!();
        println!("  Run 'promptcache purge-expired' to reclaim expired entries");
    }
    println!();

    Ok(())
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
