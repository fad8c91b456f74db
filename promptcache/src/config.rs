//! Cache configuration
//!
//! Default store location: ~/.promptcache/responses.db
//!
//! ```toml
//! max_size_bytes = 104857600
//! eviction_policy = "hybrid"
//! default_ttl_secs = 86400
//! compression_threshold_bytes = 1024
//! compression = "zstd:3"
//! store_path = "~/.promptcache/responses.db"
//! expiry_interval_secs = 300
//! eviction_target_ratio = 0.8
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Ordering rule used to pick eviction victims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently accessed first
    Lru,
    /// Least frequently accessed first
    Lfu,
    /// Oldest created first
    Ttl,
    /// Fewest accesses first, ties broken by least recent access
    #[default]
    Hybrid,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Ttl => "ttl",
            EvictionPolicy::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Compression applied to payloads above the size threshold.
///
/// Written in config as `"lz4"`, `"zstd"`, `"zstd:LEVEL"` or `"none"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CompressionAlgorithm {
    /// LZ4 - very fast, moderate ratio
    Lz4,
    /// Zstd - better ratio, configurable level
    Zstd {
        /// Compression level (1-22, default 3)
        level: i32,
    },
    /// Never compress
    None,
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        Self::zstd()
    }
}

impl CompressionAlgorithm {
    /// Zstd with the default level.
    pub fn zstd() -> Self {
        Self::Zstd { level: 3 }
    }

    /// Zstd with a custom level, clamped to 1-22.
    pub fn zstd_level(level: i32) -> Self {
        Self::Zstd {
            level: level.clamp(1, 22),
        }
    }
}

impl TryFrom<String> for CompressionAlgorithm {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self> {
        match value.as_str() {
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::zstd()),
            "none" => Ok(Self::None),
            other => {
                if let Some(level_str) = other.strip_prefix("zstd:") {
                    let level: i32 = level_str.parse().map_err(|_| {
                        CacheError::Config(format!("Invalid zstd level: {}", level_str))
                    })?;
                    Ok(Self::zstd_level(level))
                } else {
                    Err(CacheError::Config(format!(
                        "Unknown compression algorithm: {}. Use 'lz4', 'zstd', 'zstd:LEVEL', or 'none'",
                        other
                    )))
                }
            }
        }
    }
}

impl From<CompressionAlgorithm> for String {
    fn from(value: CompressionAlgorithm) -> Self {
        match value {
            CompressionAlgorithm::Lz4 => "lz4".to_string(),
            CompressionAlgorithm::Zstd { level } => format!("zstd:{}", level),
            CompressionAlgorithm::None => "none".to_string(),
        }
    }
}

/// Construction parameters for [`ResponseCache`](crate::ResponseCache).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Total capacity of the memory tier before eviction triggers
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    #[serde(default)]
    pub eviction_policy: EvictionPolicy,

    /// TTL applied when `set` omits one. `None` means entries never expire.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: Option<u64>,

    /// Serialized payloads larger than this are offered to the compressor
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold_bytes: usize,

    #[serde(default)]
    pub compression: CompressionAlgorithm,

    /// Durable store file. `None` runs the cache memory-only.
    #[serde(default = "default_store_path")]
    pub store_path: Option<PathBuf>,

    /// Wake period of the expiry worker
    #[serde(default = "default_expiry_interval")]
    pub expiry_interval_secs: u64,

    /// Fraction of capacity that eviction drains down to
    #[serde(default = "default_eviction_target_ratio")]
    pub eviction_target_ratio: f64,
}

fn default_max_size_bytes() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_ttl_secs() -> Option<u64> {
    Some(24 * 60 * 60)
}

fn default_compression_threshold() -> usize {
    1024
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".promptcache")
}

fn default_store_path() -> Option<PathBuf> {
    Some(default_data_dir().join("responses.db"))
}

fn default_expiry_interval() -> u64 {
    300
}

fn default_eviction_target_ratio() -> f64 {
    0.8
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            eviction_policy: EvictionPolicy::default(),
            default_ttl_secs: default_ttl_secs(),
            compression_threshold_bytes: default_compression_threshold(),
            compression: CompressionAlgorithm::default(),
            store_path: default_store_path(),
            expiry_interval_secs: default_expiry_interval(),
            eviction_target_ratio: default_eviction_target_ratio(),
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| CacheError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir()
            .ok_or_else(|| CacheError::Config("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl CacheConfig {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            CacheConfig::default()
        };

        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CacheError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn expand_paths(&mut self) -> Result<()> {
        if let Some(ref p) = self.store_path {
            self.store_path = Some(expand_tilde(p)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size_bytes == 0 {
            return Err(CacheError::Config(
                "max_size_bytes must be greater than zero".to_string(),
            ));
        }
        if !(self.eviction_target_ratio > 0.0 && self.eviction_target_ratio <= 1.0) {
            return Err(CacheError::Config(format!(
                "eviction_target_ratio must be in (0, 1], got {}",
                self.eviction_target_ratio
            )));
        }
        if self.expiry_interval_secs == 0 {
            return Err(CacheError::Config(
                "expiry_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl_secs == Some(0) {
            return Err(CacheError::Config(
                "default_ttl_secs must be greater than zero; omit it to never expire".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Run without a durable tier.
    pub fn in_memory_only(mut self) -> Self {
        self.store_path = None;
        self
    }

    /// Sub-second remainders round up, so a TTL never shrinks.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl_secs = ttl.map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0));
        self
    }

    pub fn with_compression_threshold(mut self, bytes: usize) -> Self {
        self.compression_threshold_bytes = bytes;
        self
    }

    pub fn with_compression(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.compression = algorithm;
        self
    }

    pub fn with_expiry_interval(mut self, interval: Duration) -> Self {
        self.expiry_interval_secs = interval.as_secs().max(1);
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs)
    }

    /// Size eviction drains down to before headroom for the incoming entry.
    pub fn target_size_bytes(&self) -> u64 {
        (self.max_size_bytes as f64 * self.eviction_target_ratio) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size_bytes, 100 * 1024 * 1024);
        assert_eq!(config.eviction_policy, EvictionPolicy::Hybrid);
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(86400)));
        assert_eq!(config.compression_threshold_bytes, 1024);
        assert_eq!(config.expiry_interval(), Duration::from_secs(300));
        assert!(config.store_path.as_ref().unwrap().ends_with(".promptcache/responses.db"));
        assert_eq!(config.target_size_bytes(), 83886080);
    }

    #[test]
    fn test_parse_toml() {
        let config: CacheConfig = toml::from_str(
            r#"
            max_size_bytes = 2048
            eviction_policy = "lfu"
            compression = "zstd:9"
            expiry_interval_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.max_size_bytes, 2048);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lfu);
        assert_eq!(config.compression, CompressionAlgorithm::Zstd { level: 9 });
        assert_eq!(config.expiry_interval_secs, 10);
        // Unspecified fields fall back to defaults
        assert_eq!(config.compression_threshold_bytes, 1024);
        assert_eq!(config.eviction_target_ratio, 0.8);
    }

    #[test]
    fn test_parse_compression_names() {
        assert_eq!(
            CompressionAlgorithm::try_from("lz4".to_string()).unwrap(),
            CompressionAlgorithm::Lz4
        );
        assert_eq!(
            CompressionAlgorithm::try_from("none".to_string()).unwrap(),
            CompressionAlgorithm::None
        );
        assert_eq!(
            CompressionAlgorithm::try_from("zstd:99".to_string()).unwrap(),
            CompressionAlgorithm::Zstd { level: 22 }
        );
        assert!(CompressionAlgorithm::try_from("brotli".to_string()).is_err());
        assert!(CompressionAlgorithm::try_from("zstd:high".to_string()).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(CacheConfig::default().with_max_size_bytes(0).validate().is_err());

        let mut config = CacheConfig::default();
        config.eviction_target_ratio = 1.5;
        assert!(config.validate().is_err());

        config.eviction_target_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = CacheConfig::default();
        config.expiry_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = CacheConfig::default();
        config.default_ttl_secs = Some(0);
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));

        assert!(CacheConfig::default().validate().is_ok());
        assert!(CacheConfig::default()
            .with_default_ttl(None)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_default_ttl_rounds_up() {
        let config = CacheConfig::default().with_default_ttl(Some(Duration::from_millis(500)));
        assert_eq!(config.default_ttl_secs, Some(1));
        assert!(config.validate().is_ok());

        let config = CacheConfig::default().with_default_ttl(Some(Duration::from_millis(1500)));
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(2)));

        let config = CacheConfig::default().with_default_ttl(Some(Duration::from_secs(30)));
        assert_eq!(config.default_ttl_secs, Some(30));

        let config = CacheConfig::default().with_default_ttl(Some(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.max_size_bytes, default_max_size_bytes());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/cache.toml");

        let config = CacheConfig::default()
            .with_max_size_bytes(4096)
            .with_policy(EvictionPolicy::Lru)
            .with_compression(CompressionAlgorithm::Lz4)
            .with_store_path(dir.path().join("cache.db"));
        config.save(&path).unwrap();

        let loaded = CacheConfig::load(&path).unwrap();
        assert_eq!(loaded.max_size_bytes, 4096);
        assert_eq!(loaded.eviction_policy, EvictionPolicy::Lru);
        assert_eq!(loaded.compression, CompressionAlgorithm::Lz4);
        assert_eq!(loaded.store_path, Some(dir.path().join("cache.db")));
    }

    #[test]
    fn test_expand_tilde() {
        let plain = expand_tilde(Path::new("/var/cache/x.db")).unwrap();
        assert_eq!(plain, PathBuf::from("/var/cache/x.db"));

        if let Some(home) = dirs::home_dir() {
            let expanded = expand_tilde(Path::new("~/x.db")).unwrap();
            assert_eq!(expanded, home.join("x.db"));
        }
    }
}
