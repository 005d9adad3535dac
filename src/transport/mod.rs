//! Transport Module
//!
//! The byte-level seam between the cache adapter and memcached.
//!
//! # Implementations
//! - `PooledTransport` - `memcache` crate client over an r2d2 pool
//! - `LocalTransport` - in-process store with memcached semantics
//! - `RetryingTransport` - retries once on a broken connection

mod local;
mod lru;
mod pooled;
mod retry;

use std::collections::HashMap;

use crate::error::Result;

pub use local::LocalTransport;
pub use lru::LruTracker;
pub use pooled::{map_memcache_error, PooledTransport};
pub use retry::RetryingTransport;

// == Transport Trait ==
/// Raw memcached operations on validated keys and encoded values.
///
/// `exptime` follows memcached: 0 = never, up to 30 days = relative
/// seconds, anything larger = absolute unix time.
pub trait MemcachedTransport: Send + Sync {
    /// Short name for logs and stats.
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Only keys that were found appear in the result.
    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8], exptime: u32) -> Result<()>;

    /// Returns false when the key already exists.
    fn add(&self, key: &str, value: &[u8], exptime: u32) -> Result<bool>;

    /// Returns false when there was nothing to delete.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Returns None when the key is absent.
    fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>>;

    /// Returns None when the key is absent. Floors at zero.
    fn decr(&self, key: &str, delta: u64) -> Result<Option<u64>>;

    /// Returns false when the key is absent.
    fn touch(&self, key: &str, exptime: u32) -> Result<bool>;

    fn flush(&self) -> Result<()>;
}
