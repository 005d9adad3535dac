//! Cache Key Module
//!
//! Builds prefixed, versioned keys and enforces memcached key rules.

use std::fmt;

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

// == Cache Key ==
/// A key that is safe to send to memcached.
///
/// At most 250 bytes, no whitespace or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validates a full key.
    pub fn parse(key: impl Into<String>) -> Result<Self> {
        let key = key.into();

        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidKey(format!(
                "key is {} bytes, memcached allows at most {}",
                key.len(),
                MAX_KEY_LENGTH
            )));
        }

        if let Some(pos) = key.bytes().position(|b| b <= b' ' || b == 0x7f) {
            return Err(CacheError::InvalidKey(format!(
                "key contains whitespace or control character at byte {}",
                pos
            )));
        }

        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// == Key Builder ==
/// Turns caller keys into `prefix:version:key`.
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    prefix: String,
    version: u32,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>, version: u32) -> Self {
        Self {
            prefix: prefix.into(),
            version,
        }
    }

    /// Default version used when none is given.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Same prefix, another default version.
    pub fn with_version(&self, version: u32) -> Self {
        Self {
            prefix: self.prefix.clone(),
            version,
        }
    }

    /// Builds and validates the full key for `key` at the default version.
    pub fn build(&self, key: &str) -> Result<CacheKey> {
        self.build_versioned(key, self.version)
    }

    /// Builds and validates the full key for `key` at `version`.
    pub fn build_versioned(&self, key: &str, version: u32) -> Result<CacheKey> {
        CacheKey::parse(format!("{}:{}:{}", self.prefix, version, key))
    }
}
