//! Cached client adapter: wraps a generation backend with the response cache.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::key::Parameters;
use crate::stats::CacheStatistics;
use crate::store::StoreStatistics;

/// An asynchronous "generate" operation, typically a call to an LLM API.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Response type; must round-trip through the cache's encoding.
    type Output: Serialize + DeserializeOwned + Send + Sync;
    type Error: Send;

    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
    ) -> Result<Self::Output, Self::Error>;
}

/// Memory-tier counters plus the durable-tier aggregate, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedStatistics {
    pub memory: CacheStatistics,
    pub store: Option<StoreStatistics>,
}

/// A [`Generator`] fronted by a [`ResponseCache`].
pub struct CachedClient<G> {
    generator: G,
    cache: Arc<ResponseCache>,
}

impl<G: Generator> CachedClient<G> {
    pub fn new(generator: G, cache: Arc<ResponseCache>) -> Self {
        Self { generator, cache }
    }

    /// Return a cached response or generate and cache a fresh one.
    ///
    /// With `use_cache` false the cache is neither read nor written.
    /// Generator errors are returned unchanged and nothing is cached.
    pub async fn generate_cached(
        &self,
        prompt: &str,
        model: &str,
        parameters: &Parameters,
        use_cache: bool,
    ) -> Result<G::Output, G::Error> {
        if !use_cache {
            return self.generator.generate(prompt, model, parameters).await;
        }

        if let Some(cached) = self.cache.get(prompt, model, parameters).await {
            debug!(model, "Serving cached response");
            return Ok(cached);
        }

        let response = self.generator.generate(prompt, model, parameters).await?;

        // A cache failure never fails the request
        if let Err(e) = self.cache.set(prompt, model, parameters, &response).await {
            warn!(model, "Failed to cache response: {}", e);
        }

        Ok(response)
    }

    pub async fn cache_stats(&self) -> CombinedStatistics {
        CombinedStatistics {
            memory: self.cache.statistics().await,
            store: self.cache.store_statistics().await,
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the prompt back and counts invocations.
    #[derive(Default)]
    struct SpyGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for SpyGenerator {
        type Output = String;
        type Error = String;

        async fn generate(
            &self,
            prompt: &str,
            model: &str,
            _parameters: &Parameters,
        ) -> Result<String, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if prompt == "fail" {
                return Err("upstream unavailable".to_string());
            }
            Ok(format!("{model} says {prompt} (#{n})"))
        }
    }

    fn client() -> CachedClient<SpyGenerator> {
        let cache = ResponseCache::open(CacheConfig::default().in_memory_only()).unwrap();
        CachedClient::new(SpyGenerator::default(), Arc::new(cache))
    }

    fn calls(client: &CachedClient<SpyGenerator>) -> usize {
        client.generator().calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let client = client();
        let params = Parameters::from([("max_tokens".to_string(), json!(100))]);

        let first = client
            .generate_cached("hi", "m", &params, true)
            .await
            .unwrap();
        let second = client
            .generate_cached("hi", "m", &params, true)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls(&client), 1);

        let stats = client.cache_stats().await;
        assert_eq!(stats.memory.hits, 1);
        assert_eq!(stats.memory.misses, 1);
        assert!(stats.store.is_none());
    }

    #[tokio::test]
    async fn test_bypass_skips_cache_entirely() {
        let client = client();
        let params = Parameters::new();
        client
            .generate_cached("hi", "m", &params, true)
            .await
            .unwrap();
        let before = client.cache_stats().await;

        for _ in 0..3 {
            let fresh = client
                .generate_cached("hi", "m", &params, false)
                .await
                .unwrap();
            assert!(fresh.starts_with("m says hi"));
        }

        assert_eq!(calls(&client), 4);
        assert_eq!(client.cache_stats().await, before);
    }

    #[tokio::test]
    async fn test_generator_error_not_cached() {
        let client = client();
        let params = Parameters::new();

        let err = client
            .generate_cached("fail", "m", &params, true)
            .await
            .unwrap_err();
        assert_eq!(err, "upstream unavailable");
        assert!(client
            .generate_cached("fail", "m", &params, true)
            .await
            .is_err());

        assert_eq!(calls(&client), 2);
        assert_eq!(client.cache_stats().await.memory.entry_count, 0);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_regeneration() {
        let client = client();
        let params = Parameters::new();

        client
            .generate_cached("hi", "m", &params, true)
            .await
            .unwrap();
        client.clear_cache().await;
        let again = client
            .generate_cached("hi", "m", &params, true)
            .await
            .unwrap();

        assert_eq!(again, "m says hi (#2)");
        assert_eq!(calls(&client), 2);
    }
}
