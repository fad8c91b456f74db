//! Request fingerprinting.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CacheError, Result};

/// Generation parameters, kept ordered by name so equal sets fingerprint equally.
pub type Parameters = BTreeMap<String, Value>;

/// Length of a fingerprint in hex characters.
pub const KEY_LEN: usize = 64;

/// Fingerprint of a logical request. Fixed-length lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `(prompt, model, parameters)`.
    pub fn fingerprint(prompt: &str, model: &str, parameters: &Parameters) -> Self {
        // serde_json::Map is ordered, so nested objects are canonical as well.
        let canonical = json!({
            "model": model,
            "parameters": parameters,
            "prompt": prompt,
        });

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Accept an already computed fingerprint, e.g. a row key read from
    /// the store. Anything but [`KEY_LEN`] lowercase hex digits is rejected.
    pub fn parse(hash: impl Into<String>) -> Result<Self> {
        let hash = hash.into();
        let well_formed = hash.len() == KEY_LEN
            && hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(CacheError::Validation(format!(
                "malformed cache key: {:?}",
                hash
            )));
        }
        Ok(Self(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shorthand for [`CacheKey::fingerprint`].
pub fn fingerprint(prompt: &str, model: &str, parameters: &Parameters) -> CacheKey {
    CacheKey::fingerprint(prompt, model, parameters)
}
