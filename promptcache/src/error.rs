//! Cache error types.

use thiserror::Error;

/// Errors produced by the cache components.
///
/// The facade swallows store failures (they degrade to a miss or a
/// memory-only write), so callers of [`ResponseCache`](crate::ResponseCache)
/// normally only ever see [`CacheError::Encoding`].
#[derive(Error, Debug)]
pub enum CacheError {
    /// Value could not be serialized; the entry is not stored
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Stored bytes could not be turned back into a value
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Durable store unreachable or corrupt
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Input that is not well formed, such as a key that is not a fingerprint
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
