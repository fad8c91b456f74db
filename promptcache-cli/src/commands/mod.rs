pub mod clear;
pub mod stats;

pub use clear::{run_clear, run_purge_expired};
pub use stats::run_stats;

use anyhow::{bail, Context, Result};
use promptcache::SqliteStore;
use std::path::Path;

/// Open an existing store. Admin commands never create one.
fn open_existing(path: &Path) -> Result<SqliteStore> {
    if !path.exists() {
        bail!("No cache store at {}", path.display());
    }
    SqliteStore::open(path)
        .with_context(|| format!("Failed to open cache store at {}", path.display()))
}
