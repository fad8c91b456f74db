//! Two-tier response cache for LLM generation calls.
//!
//! Responses are keyed by a fingerprint of `(prompt, model, parameters)` and
//! kept in a size-bounded in-memory index backed by a SQLite file that
//! survives restarts.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  CachedClient<G: Generator>                   │
//! │                     │                         │
//! │                     ▼                         │
//! │            ┌─────────────────┐                │
//! │            │  ResponseCache  │  ← get / set   │
//! │            └────────┬────────┘                │
//! │        ┌────────────┼────────────┐            │
//! │        ▼            ▼            ▼            │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐       │
//! │  │ Codec    │ │ Memory   │ │ SQLite   │       │
//! │  │ zstd/lz4 │ │ Index    │ │ Store    │       │
//! │  └──────────┘ └────┬─────┘ └──────────┘       │
//! │                    ▼                          │
//! │             EvictionEngine                    │
//! │        (LRU / LFU / TTL / Hybrid)             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! A background task owned by [`ResponseCache`] removes expired entries from
//! both tiers every `expiry_interval_secs`.
//!
//! # Quick Start
//!
//! ```no_run
//! use promptcache::{CacheConfig, EvictionPolicy, Parameters, ResponseCache};
//! use serde_json::json;
//!
//! # async fn example() -> promptcache::Result<()> {
//! let config = CacheConfig::default()
//!     .with_policy(EvictionPolicy::Lru)
//!     .with_store_path("/tmp/responses.db");
//! let cache = ResponseCache::open(config)?;
//!
//! let params = Parameters::from([("temperature".to_string(), json!(0.2))]);
//! cache.set("Summarize this", "gpt-4", &params, "A summary").await?;
//!
//! let hit: Option<String> = cache.get("Summarize this", "gpt-4", &params).await;
//! assert_eq!(hit.as_deref(), Some("A summary"));
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod index;
pub mod key;
pub mod stats;
pub mod store;

pub use cache::ResponseCache;
pub use client::{CachedClient, CombinedStatistics, Generator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Encoded, EntryCodec};
pub use config::{CacheConfig, CompressionAlgorithm, EvictionPolicy};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use eviction::EvictionEngine;
pub use index::MemoryIndex;
pub use key::{fingerprint, CacheKey, Parameters};
pub use stats::CacheStatistics;
pub use store::{DurableStore, SqliteStore, StorePredicate, StoreStatistics};
