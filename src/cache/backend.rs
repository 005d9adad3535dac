//! Memcached Cache Adapter
//!
//! Translates cache operations into transport calls: builds and validates
//! keys, encodes values, resolves timeouts and maps failures. Misses are
//! `None`, never errors.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, CacheStats, KeyBuilder, StatsSnapshot, Timeout, ValueCodec};
use crate::config::{BackendKind, Config};
use crate::error::{CacheError, Result};
use crate::transport::{LocalTransport, MemcachedTransport, PooledTransport, RetryingTransport};

// == Memcached Cache ==
/// Cache backend over a shared memcached transport.
///
/// Cloning is cheap: clones share the connection pool and the counters.
///
/// ```ignore
/// let cache = MemcachedCache::from_config(&Config::from_env())?;
/// cache.set("greeting", "hello", Timeout::Seconds(60))?;
/// let greeting: Option<String> = cache.get("greeting")?;
/// ```
#[derive(Clone)]
pub struct MemcachedCache {
    transport: Arc<dyn MemcachedTransport>,
    keys: KeyBuilder,
    codec: ValueCodec,
    /// Seconds, None = never expire
    default_timeout: Option<u64>,
    stats: Arc<CacheStats>,
}

impl std::fmt::Debug for MemcachedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedCache")
            .field("transport", &self.transport.name())
            .field("keys", &self.keys)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl MemcachedCache {
    // == Constructors ==
    /// Wraps an existing transport with the key, codec and timeout settings of `config`.
    pub fn new(transport: Arc<dyn MemcachedTransport>, config: &Config) -> Self {
        Self {
            transport,
            keys: KeyBuilder::new(config.key_prefix.clone(), config.version),
            codec: ValueCodec::new(config.min_compress_len, config.compress_level),
            default_timeout: config.default_timeout,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Validates `config` and opens the configured transport.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let transport: Arc<dyn MemcachedTransport> = match config.backend {
            BackendKind::Local => Arc::new(LocalTransport::new(config.local_max_entries)),
            BackendKind::Memcached => {
                let pooled = PooledTransport::connect(config)?;
                if config.retry_on_broken_connection {
                    Arc::new(RetryingTransport::new(pooled))
                } else {
                    Arc::new(pooled)
                }
            }
        };

        Ok(Self::new(transport, config))
    }

    /// A handle on the same pool that builds keys with `version`.
    pub fn with_version(&self, version: u32) -> Self {
        Self {
            keys: self.keys.with_version(version),
            ..self.clone()
        }
    }

    pub fn version(&self) -> u32 {
        self.keys.version()
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Full key for `key` at the current version.
    pub fn make_key(&self, key: &str) -> Result<CacheKey> {
        self.keys.build(key)
    }

    // == Reads ==
    /// Returns the value for `key`, or None on a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.track("get", key, || {
            let full = self.keys.build(key)?;
            match self.transport.get(full.as_str())? {
                Some(bytes) => {
                    self.stats.record_hits(1);
                    self.codec.decode(&bytes).map(Some)
                }
                None => {
                    self.stats.record_misses(1);
                    Ok(None)
                }
            }
        })
    }

    /// Returns the value for `key`, or `default` on a miss.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Returns the present keys only; misses are left out.
    pub fn get_many<T: DeserializeOwned>(&self, keys: &[&str]) -> Result<HashMap<String, T>> {
        self.track("get_many", "*", || {
            let mut originals: HashMap<String, &str> = HashMap::with_capacity(keys.len());
            for key in keys {
                originals.insert(self.keys.build(key)?.into_string(), *key);
            }

            let full_keys: Vec<&str> = originals.keys().map(String::as_str).collect();
            let found = self.transport.get_multi(&full_keys)?;

            let mut values: HashMap<String, T> = HashMap::with_capacity(found.len());
            for (full, bytes) in found {
                if let Some(original) = originals.get(&full) {
                    values.insert(original.to_string(), self.codec.decode(&bytes)?);
                }
            }

            self.stats.record_hits(values.len() as u64);
            self.stats
                .record_misses(originals.len().saturating_sub(values.len()) as u64);
            Ok(values)
        })
    }

    /// True when `key` is present. Does not decode or count as a hit.
    pub fn has_key(&self, key: &str) -> Result<bool> {
        self.track("has_key", key, || {
            let full = self.keys.build(key)?;
            Ok(self.transport.get(full.as_str())?.is_some())
        })
    }

    // == Writes ==
    /// Stores `value` under `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, timeout: Timeout) -> Result<()> {
        self.track("set", key, || {
            let full = self.keys.build(key)?;
            let bytes = self.codec.encode(value)?;
            let exptime = self.exptime(timeout);

            self.transport.set(full.as_str(), &bytes, exptime)?;
            self.stats.record_set();
            debug!("set '{}' ({} bytes, exptime={})", full, bytes.len(), exptime);
            Ok(())
        })
    }

    /// Stores `value` only if `key` is absent. Returns whether it was stored.
    pub fn add<T: Serialize + ?Sized>(&self, key: &str, value: &T, timeout: Timeout) -> Result<bool> {
        self.track("add", key, || {
            let full = self.keys.build(key)?;
            let bytes = self.codec.encode(value)?;

            let added = self
                .transport
                .add(full.as_str(), &bytes, self.exptime(timeout))?;
            if added {
                self.stats.record_set();
            }
            Ok(added)
        })
    }

    /// Stores every item. Returns the keys the server refused; connection
    /// errors abort and surface.
    ///
    /// Every key and value is checked before the first write, so an invalid
    /// key or unserializable value stores nothing.
    pub fn set_many<K, V, I>(&self, items: I, timeout: Timeout) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        self.track("set_many", "*", || {
            let prepared = items
                .into_iter()
                .map(|(key, value)| -> Result<(String, CacheKey, Vec<u8>)> {
                    let key = key.as_ref();
                    Ok((key.to_string(), self.keys.build(key)?, self.codec.encode(&value)?))
                })
                .collect::<Result<Vec<_>>>()?;

            let exptime = self.exptime(timeout);
            let mut failed = Vec::new();

            for (key, full, bytes) in prepared {
                match self.transport.set(full.as_str(), &bytes, exptime) {
                    Ok(()) => self.stats.record_set(),
                    Err(err) if err.is_connection() => return Err(err),
                    Err(err) => {
                        warn!("set_many: server refused '{}': {}", full, err);
                        failed.push(key);
                    }
                }
            }
            Ok(failed)
        })
    }

    /// Refreshes the expiration of `key`. Returns false on a miss.
    pub fn touch(&self, key: &str, timeout: Timeout) -> Result<bool> {
        self.track("touch", key, || {
            let full = self.keys.build(key)?;
            self.transport.touch(full.as_str(), self.exptime(timeout))
        })
    }

    // == Deletes ==
    /// Removes `key`. Deleting an absent key is not an error; the result
    /// tells whether something was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.track("delete", key, || {
            let full = self.keys.build(key)?;
            let deleted = self.transport.delete(full.as_str())?;
            if deleted {
                self.stats.record_delete();
            }
            Ok(deleted)
        })
    }

    /// Removes every key. All keys are validated before the first delete.
    pub fn delete_many(&self, keys: &[&str]) -> Result<()> {
        self.track("delete_many", "*", || {
            let full_keys = keys
                .iter()
                .map(|key| self.keys.build(key))
                .collect::<Result<Vec<_>>>()?;

            for full in full_keys {
                if self.transport.delete(full.as_str())? {
                    self.stats.record_delete();
                }
            }
            Ok(())
        })
    }

    /// Flushes every entry on every server.
    pub fn clear(&self) -> Result<()> {
        self.track("clear", "*", || {
            self.transport.flush()?;
            info!("flushed {} cache", self.transport.name());
            Ok(())
        })
    }

    // == Counters ==
    /// Adds `delta` to an integer value. A negative delta decrements.
    ///
    /// Fails with `NotFound` when the key is absent; counters are never
    /// created implicitly.
    pub fn incr(&self, key: &str, delta: i64) -> Result<u64> {
        self.track("incr", key, || {
            self.apply_delta(key, delta >= 0, delta.unsigned_abs())
        })
    }

    /// Subtracts `delta` from an integer value, flooring at zero.
    pub fn decr(&self, key: &str, delta: i64) -> Result<u64> {
        self.track("decr", key, || {
            self.apply_delta(key, delta < 0, delta.unsigned_abs())
        })
    }

    fn apply_delta(&self, key: &str, up: bool, amount: u64) -> Result<u64> {
        let full = self.keys.build(key)?;
        let result = if up {
            self.transport.incr(full.as_str(), amount)?
        } else {
            self.transport.decr(full.as_str(), amount)?
        };
        result.ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    // == Versions ==
    /// Moves `key` from the current version to `version + delta`.
    ///
    /// Returns the new version. The entry keeps its bytes but gets the
    /// default timeout.
    pub fn incr_version(&self, key: &str, delta: i64) -> Result<u32> {
        self.track("incr_version", key, || {
            let version = self.keys.version();
            let new_version = i64::from(version)
                .checked_add(delta)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    CacheError::InvalidRequest(format!(
                        "version {} {:+} is out of range",
                        version, delta
                    ))
                })?;

            let from = self.keys.build_versioned(key, version)?;
            let to = self.keys.build_versioned(key, new_version)?;

            let bytes = self
                .transport
                .get(from.as_str())?
                .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
            self.transport
                .set(to.as_str(), &bytes, self.exptime(Timeout::Default))?;
            self.transport.delete(from.as_str())?;

            debug!("moved '{}' to '{}'", from, to);
            Ok(new_version)
        })
    }

    pub fn decr_version(&self, key: &str, delta: i64) -> Result<u32> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| CacheError::InvalidRequest("version delta overflow".to_string()))?;
        self.incr_version(key, delta)
    }

    // == Helpers ==
    fn exptime(&self, timeout: Timeout) -> u32 {
        timeout.to_exptime(self.default_timeout, Utc::now())
    }

    /// Runs `op`, counting and logging any error before it surfaces.
    ///
    /// Caller mistakes are logged at debug level and not counted.
    fn track<R>(&self, op: &str, key: &str, call: impl FnOnce() -> Result<R>) -> Result<R> {
        let result = call();
        match &result {
            Err(
                err @ (CacheError::NotFound(_)
                | CacheError::InvalidKey(_)
                | CacheError::InvalidRequest(_)),
            ) => debug!("{} '{}' rejected: {}", op, key, err),
            Err(err) => {
                self.stats.record_error();
                error!("{} '{}' failed: {}", op, key, err);
            }
            Ok(_) => {}
        }
        result
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::thread;

    fn local_cache() -> MemcachedCache {
        MemcachedCache::new(Arc::new(LocalTransport::new(100)), &Config::local())
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user_id: u64,
        roles: Vec<String>,
    }

    #[test]
    fn test_set_and_get() {
        let cache = local_cache();
        cache.set("greeting", "hello", Timeout::Default).unwrap();

        let value: Option<String> = cache.get("greeting").unwrap();
        assert_eq!(value.as_deref(), Some("hello"));
    }

    #[test]
    fn test_struct_round_trip() {
        let cache = local_cache();
        let session = Session {
            user_id: 7,
            roles: vec!["admin".to_string()],
        };
        cache.set("session", &session, Timeout::Seconds(60)).unwrap();
        assert_eq!(cache.get::<Session>("session").unwrap(), Some(session));
    }

    #[test]
    fn test_miss_is_none() {
        let cache = local_cache();
        assert_eq!(cache.get::<String>("missing").unwrap(), None);
        assert_eq!(cache.get_or("missing", 5u32).unwrap(), 5);

        let stats = cache.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let cache = local_cache();
        assert!(matches!(
            cache.set("bad key", "v", Timeout::Default),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(cache.get::<String>("bad\nkey"), Err(CacheError::InvalidKey(_))));
        assert_eq!(cache.stats().errors, 0);
    }

    #[test]
    fn test_negative_timeout_expires_immediately() {
        let cache = local_cache();
        cache.set("k", "v", Timeout::Seconds(-1)).unwrap();
        assert_eq!(cache.get::<String>("k").unwrap(), None);
    }

    #[test]
    fn test_add() {
        let cache = local_cache();
        assert!(cache.add("k", "first", Timeout::Default).unwrap());
        assert!(!cache.add("k", "second", Timeout::Default).unwrap());
        assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let cache = local_cache();
        cache.set("k", "v", Timeout::Default).unwrap();
        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
        assert!(!cache.delete("never-set").unwrap());
    }

    #[test]
    fn test_incr_decr() {
        let cache = local_cache();
        cache.set("hits", &10u64, Timeout::Default).unwrap();

        assert_eq!(cache.incr("hits", 1).unwrap(), 11);
        assert_eq!(cache.incr("hits", -3).unwrap(), 8);
        assert_eq!(cache.decr("hits", 2).unwrap(), 6);
        assert_eq!(cache.decr("hits", -4).unwrap(), 10);
        assert_eq!(cache.decr("hits", 100).unwrap(), 0);
        assert_eq!(cache.get::<u64>("hits").unwrap(), Some(0));
    }

    #[test]
    fn test_incr_missing_is_not_found() {
        let cache = local_cache();
        assert!(matches!(cache.incr("nope", 1), Err(CacheError::NotFound(_))));
        assert!(matches!(cache.decr("nope", 1), Err(CacheError::NotFound(_))));
        // No implicit creation
        assert!(!cache.has_key("nope").unwrap());
    }

    #[test]
    fn test_get_many_only_present() {
        let cache = local_cache();
        cache.set("a", &1u64, Timeout::Default).unwrap();
        cache.set("b", &2u64, Timeout::Default).unwrap();

        let values: HashMap<String, u64> = cache.get_many(&["a", "b", "c"]).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["a"], 1);
        assert_eq!(values["b"], 2);
        assert!(!values.contains_key("c"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_get_many_empty() {
        let cache = local_cache();
        let values: HashMap<String, u64> = cache.get_many(&[]).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_set_many_and_delete_many() {
        let cache = local_cache();
        let failed = cache
            .set_many([("x", 1u64), ("y", 2u64)], Timeout::Default)
            .unwrap();
        assert!(failed.is_empty());

        cache.delete_many(&["x", "y", "z"]).unwrap();
        let values: HashMap<String, u64> = cache.get_many(&["x", "y"]).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_set_many_invalid_key_stores_nothing() {
        let cache = local_cache();
        assert!(matches!(
            cache.set_many([("good", 1u64), ("bad key", 2u64)], Timeout::Default),
            Err(CacheError::InvalidKey(_))
        ));

        assert_eq!(cache.get::<u64>("good").unwrap(), None);
        assert_eq!(cache.stats().sets, 0);
    }

    #[test]
    fn test_delete_many_invalid_key_deletes_nothing() {
        let cache = local_cache();
        cache.set("a", &1u64, Timeout::Default).unwrap();

        assert!(matches!(
            cache.delete_many(&["a", "bad key"]),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(cache.has_key("a").unwrap());
    }

    #[test]
    fn test_touch() {
        let cache = local_cache();
        cache.set("k", "v", Timeout::Seconds(60)).unwrap();
        assert!(cache.touch("k", Timeout::Never).unwrap());
        assert!(!cache.touch("missing", Timeout::Never).unwrap());
    }

    #[test]
    fn test_clear() {
        let cache = local_cache();
        cache.set("k", "v", Timeout::Default).unwrap();
        cache.clear().unwrap();
        assert!(!cache.has_key("k").unwrap());
    }

    #[test]
    fn test_versions_are_isolated() {
        let cache = local_cache();
        let v2 = cache.with_version(2);

        cache.set("k", "one", Timeout::Default).unwrap();
        v2.set("k", "two", Timeout::Default).unwrap();

        assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("one"));
        assert_eq!(v2.get::<String>("k").unwrap().as_deref(), Some("two"));
        assert_eq!(v2.version(), 2);
    }

    #[test]
    fn test_incr_version_moves_entry() {
        let cache = local_cache();
        cache.set("k", "v", Timeout::Default).unwrap();

        assert_eq!(cache.incr_version("k", 1).unwrap(), 2);
        assert_eq!(cache.get::<String>("k").unwrap(), None);
        assert_eq!(
            cache.with_version(2).get::<String>("k").unwrap().as_deref(),
            Some("v")
        );

        assert_eq!(cache.with_version(2).decr_version("k", 1).unwrap(), 1);
        assert_eq!(cache.get::<String>("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_incr_version_missing_and_out_of_range() {
        let cache = local_cache();
        assert!(matches!(cache.incr_version("nope", 1), Err(CacheError::NotFound(_))));

        cache.set("k", "v", Timeout::Default).unwrap();
        assert!(matches!(cache.decr_version("k", 5), Err(CacheError::InvalidRequest(_))));
    }

    #[test]
    fn test_serialization_error_surfaces() {
        let cache = local_cache();
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], "non-string map key");
        assert!(matches!(
            cache.set("k", &bad, Timeout::Default),
            Err(CacheError::Serialization(_))
        ));
        assert_eq!(cache.stats().errors, 1);
    }

    #[test]
    fn test_clones_share_state() {
        let cache = local_cache();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        let key = format!("t{}_{}", i, j);
                        cache.set(&key, &j, Timeout::Default).unwrap();
                        assert_eq!(cache.get::<u64>(&key).unwrap(), Some(j));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.stats().sets, 400);
        assert_eq!(cache.stats().hits, 400);
    }

    #[test]
    fn test_from_config_local() {
        let cache = MemcachedCache::from_config(&Config::local()).unwrap();
        assert_eq!(cache.transport_name(), "locmem");
        assert_eq!(cache.make_key("k").unwrap().as_str(), ":1:k");
    }
}
