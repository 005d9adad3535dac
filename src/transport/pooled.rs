//! Pooled Transport
//!
//! Talks to real memcached servers through the `memcache` crate, which keeps
//! an r2d2 pool per server and shards keys across servers.

use std::collections::HashMap;

use memcache::{Client, CommandError, MemcacheError};
use tracing::info;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::transport::MemcachedTransport;

// == Pooled Transport ==
pub struct PooledTransport {
    client: Client,
}

impl PooledTransport {
    /// Opens the pools for every configured server.
    ///
    /// Blocks until the pools are established or the connect timeout passes.
    pub fn connect(config: &Config) -> Result<Self> {
        let urls = config.server_urls();
        let client = Client::with_pool_size(urls, config.pool_size).map_err(map_memcache_error)?;

        info!(
            "memcached pool ready: servers={:?}, pool_size={}, binary={}, sasl={}",
            config.servers,
            config.pool_size,
            config.binary,
            config.has_credentials()
        );

        Ok(Self { client })
    }
}

/// Maps client library errors onto the adapter's error kinds.
///
/// IO and pool failures are connection errors; everything the server or
/// the protocol layer rejects is a server error.
pub fn map_memcache_error(err: MemcacheError) -> CacheError {
    match err {
        MemcacheError::IOError(e) => CacheError::Connection(e.to_string()),
        MemcacheError::PoolError(e) => CacheError::Connection(e.to_string()),
        other => CacheError::Server(other.to_string()),
    }
}

fn is_key_not_found(err: &MemcacheError) -> bool {
    matches!(err, MemcacheError::CommandError(CommandError::KeyNotFound))
}

impl MemcachedTransport for PooledTransport {
    fn name(&self) -> &'static str {
        "memcached"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.client.get::<Vec<u8>>(key).map_err(map_memcache_error)
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        self.client.gets::<Vec<u8>>(keys).map_err(map_memcache_error)
    }

    fn set(&self, key: &str, value: &[u8], exptime: u32) -> Result<()> {
        self.client.set(key, value, exptime).map_err(map_memcache_error)
    }

    fn add(&self, key: &str, value: &[u8], exptime: u32) -> Result<bool> {
        match self.client.add(key, value, exptime) {
            Ok(()) => Ok(true),
            // NOT_STORED / KEY_EXISTS
            Err(MemcacheError::CommandError(_)) => Ok(false),
            Err(e) => Err(map_memcache_error(e)),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.client.delete(key).map_err(map_memcache_error)
    }

    fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>> {
        match self.client.increment(key, delta) {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_key_not_found(&e) => Ok(None),
            Err(e) => Err(map_memcache_error(e)),
        }
    }

    fn decr(&self, key: &str, delta: u64) -> Result<Option<u64>> {
        match self.client.decrement(key, delta) {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_key_not_found(&e) => Ok(None),
            Err(e) => Err(map_memcache_error(e)),
        }
    }

    fn touch(&self, key: &str, exptime: u32) -> Result<bool> {
        self.client.touch(key, exptime).map_err(map_memcache_error)
    }

    fn flush(&self) -> Result<()> {
        self.client.flush().map_err(map_memcache_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_is_connection() {
        let err = MemcacheError::from(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        assert!(map_memcache_error(err).is_connection());
    }

    #[test]
    fn test_command_error_is_server() {
        let err = MemcacheError::CommandError(CommandError::KeyExists);
        assert!(matches!(map_memcache_error(err), CacheError::Server(_)));
    }

    #[test]
    fn test_key_not_found_detection() {
        assert!(is_key_not_found(&MemcacheError::CommandError(
            CommandError::KeyNotFound
        )));
        assert!(!is_key_not_found(&MemcacheError::CommandError(
            CommandError::KeyExists
        )));
    }
}
