use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use promptcache::{DurableStore, StorePredicate};
use std::path::Path;

/// Remove every entry, or only those created more than `older_than_days` ago.
pub async fn run_clear(path: &Path, older_than_days: Option<u32>) -> Result<usize> {
    let store = super::open_existing(path)?;

    let removed = match older_than_days {
        Some(days) => {
            let cutoff = Utc::now() - Duration::days(i64::from(days));
            tracing::info!("Only entries created before {}", cutoff.to_rfc3339());
            store
                .delete_where(StorePredicate::CreatedBefore(cutoff))
                .await
                .context("Failed to delete old entries")?
        }
        None => store.clear().await.context("Failed to clear store")?,
    };

    Ok(removed)
}

/// Remove entries whose TTL has elapsed as of now.
pub async fn run_purge_expired(path: &Path) -> Result<usize> {
    let store = super::open_existing(path)?;
    let removed = store
        .delete_where(StorePredicate::ExpiredAt(Utc::now()))
        .await
        .context("Failed to purge expired entries")?;
    Ok(removed)
}
