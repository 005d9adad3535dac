//! Local Transport
//!
//! In-process store that behaves like a single memcached server: exptime
//! rules, `add` only when absent, decimal `incr`/`decr`, LRU eviction at a
//! fixed entry cap.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::timeout::MAX_RELATIVE_EXPTIME;
use crate::error::{CacheError, Result};
use crate::transport::{LruTracker, MemcachedTransport};

// == Local Entry ==
#[derive(Debug, Clone)]
struct LocalEntry {
    value: Vec<u8>,
    /// Unix milliseconds, None = no expiration
    expires_at: Option<u64>,
}

impl LocalEntry {
    fn new(value: Vec<u8>, exptime: u32, now: u64) -> Self {
        Self {
            value,
            expires_at: expires_at(exptime, now),
        }
    }

    /// Expired once the current time reaches the expiration time.
    fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }
}

/// Resolves a memcached exptime into an absolute unix-milliseconds deadline.
fn expires_at(exptime: u32, now: u64) -> Option<u64> {
    match exptime {
        0 => None,
        secs if i64::from(secs) <= MAX_RELATIVE_EXPTIME => Some(now + u64::from(secs) * 1000),
        unix => Some(u64::from(unix) * 1000),
    }
}

/// Returns current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Local Store ==
#[derive(Debug)]
struct LocalStore {
    entries: HashMap<String, LocalEntry>,
    lru: LruTracker,
    max_entries: usize,
    evictions: u64,
}

impl LocalStore {
    /// Live entry for `key`; drops it if expired.
    fn live(&mut self, key: &str, now: u64) -> Option<&mut LocalEntry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        self.lru.touch(key);
        Some(entry)
    }

    fn insert(&mut self, key: &str, entry: LocalEntry) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            if let Some(evicted) = self.lru.evict_oldest() {
                self.entries.remove(&evicted);
                self.evictions += 1;
            }
        }
        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);
    }

    fn remove(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        self.entries.remove(key).is_some()
    }

    /// Applies `op` to a decimal value, memcached style.
    fn update_counter(
        &mut self,
        key: &str,
        now: u64,
        op: impl FnOnce(u64) -> u64,
    ) -> Result<Option<u64>> {
        let Some(entry) = self.live(key, now) else {
            return Ok(None);
        };

        let current = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.trim_end_matches(' ').parse::<u64>().ok())
            .ok_or_else(|| {
                CacheError::Server(
                    "cannot increment or decrement non-numeric value".to_string(),
                )
            })?;

        let next = op(current);
        entry.value = next.to_string().into_bytes();
        Ok(Some(next))
    }
}

// == Local Transport ==
/// Thread-safe in-process memcached stand-in.
#[derive(Debug)]
pub struct LocalTransport {
    store: Mutex<LocalStore>,
}

impl LocalTransport {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Mutex::new(LocalStore {
                entries: HashMap::new(),
                lru: LruTracker::new(),
                max_entries: max_entries.max(1),
                evictions: 0,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LocalStore>> {
        self.store
            .lock()
            .map_err(|_| CacheError::Internal("local store lock poisoned".to_string()))
    }

    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let now = current_timestamp_ms();
        let mut store = self.lock()?;

        let expired: Vec<String> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.remove(key);
        }
        Ok(expired.len())
    }

    /// Entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries dropped to stay under the cap.
    pub fn evictions(&self) -> u64 {
        self.lock().map(|s| s.evictions).unwrap_or(0)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MemcachedTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "locmem"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = current_timestamp_ms();
        Ok(self.lock()?.live(key, now).map(|e| e.value.clone()))
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        let now = current_timestamp_ms();
        let mut store = self.lock()?;

        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = store.live(key, now) {
                found.insert(key.to_string(), entry.value.clone());
            }
        }
        Ok(found)
    }

    fn set(&self, key: &str, value: &[u8], exptime: u32) -> Result<()> {
        let now = current_timestamp_ms();
        let entry = LocalEntry::new(value.to_vec(), exptime, now);
        let mut store = self.lock()?;

        if entry.is_expired(now) {
            store.remove(key);
        } else {
            store.insert(key, entry);
        }
        Ok(())
    }

    fn add(&self, key: &str, value: &[u8], exptime: u32) -> Result<bool> {
        let now = current_timestamp_ms();
        let mut store = self.lock()?;

        if store.live(key, now).is_some() {
            return Ok(false);
        }
        let entry = LocalEntry::new(value.to_vec(), exptime, now);
        if !entry.is_expired(now) {
            store.insert(key, entry);
        }
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let now = current_timestamp_ms();
        let mut store = self.lock()?;
        let existed = store.live(key, now).is_some();
        store.remove(key);
        Ok(existed)
    }

    fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>> {
        let now = current_timestamp_ms();
        // memcached wraps at 64 bits on incr
        self.lock()?.update_counter(key, now, |n| n.wrapping_add(delta))
    }

    fn decr(&self, key: &str, delta: u64) -> Result<Option<u64>> {
        let now = current_timestamp_ms();
        self.lock()?.update_counter(key, now, |n| n.saturating_sub(delta))
    }

    fn touch(&self, key: &str, exptime: u32) -> Result<bool> {
        let now = current_timestamp_ms();
        let mut store = self.lock()?;

        let Some(entry) = store.live(key, now) else {
            return Ok(false);
        };
        entry.expires_at = expires_at(exptime, now);
        if entry.is_expired(now) {
            store.remove(key);
        }
        Ok(true)
    }

    fn flush(&self) -> Result<()> {
        let mut store = self.lock()?;
        store.entries.clear();
        store.lru.clear();
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::timeout::EXPIRED;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_set_and_get() {
        let local = LocalTransport::new(10);
        local.set("k", b"v", 0).unwrap();
        assert_eq!(local.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(local.get("missing").unwrap(), None);
    }

    #[test]
    fn test_relative_expiration() {
        let local = LocalTransport::new(10);
        local.set("k", b"v", 1).unwrap();
        assert!(local.get("k").unwrap().is_some());

        sleep(Duration::from_millis(1100));
        assert!(local.get("k").unwrap().is_none());
    }

    #[test]
    fn test_absolute_past_expiration_is_not_stored() {
        let local = LocalTransport::new(10);
        local.set("k", b"old", 0).unwrap();
        local.set("k", b"v", EXPIRED).unwrap();
        assert!(local.get("k").unwrap().is_none());
        assert!(local.is_empty());
    }

    #[test]
    fn test_absolute_future_expiration() {
        let local = LocalTransport::new(10);
        let in_an_hour = (current_timestamp_ms() / 1000 + 3600) as u32;
        local.set("k", b"v", in_an_hour).unwrap();
        assert!(local.get("k").unwrap().is_some());
    }

    #[test]
    fn test_add_only_when_absent() {
        let local = LocalTransport::new(10);
        assert!(local.add("k", b"first", 0).unwrap());
        assert!(!local.add("k", b"second", 0).unwrap());
        assert_eq!(local.get("k").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn test_delete_reports_existence() {
        let local = LocalTransport::new(10);
        local.set("k", b"v", 0).unwrap();
        assert!(local.delete("k").unwrap());
        assert!(!local.delete("k").unwrap());
    }

    #[test]
    fn test_incr_decr() {
        let local = LocalTransport::new(10);
        local.set("n", b"10", 0).unwrap();
        assert_eq!(local.incr("n", 5).unwrap(), Some(15));
        assert_eq!(local.decr("n", 20).unwrap(), Some(0));
        assert_eq!(local.get("n").unwrap(), Some(b"0".to_vec()));
    }

    #[test]
    fn test_incr_missing_key() {
        let local = LocalTransport::new(10);
        assert_eq!(local.incr("missing", 1).unwrap(), None);
        assert_eq!(local.decr("missing", 1).unwrap(), None);
    }

    #[test]
    fn test_incr_non_numeric() {
        let local = LocalTransport::new(10);
        local.set("s", b"j\"text\"", 0).unwrap();
        assert!(matches!(local.incr("s", 1), Err(CacheError::Server(_))));
    }

    #[test]
    fn test_touch() {
        let local = LocalTransport::new(10);
        local.set("k", b"v", 1).unwrap();
        assert!(local.touch("k", 0).unwrap());
        sleep(Duration::from_millis(1100));
        assert!(local.get("k").unwrap().is_some());
        assert!(!local.touch("missing", 0).unwrap());
    }

    #[test]
    fn test_lru_eviction() {
        let local = LocalTransport::new(3);
        local.set("k1", b"1", 0).unwrap();
        local.set("k2", b"2", 0).unwrap();
        local.set("k3", b"3", 0).unwrap();

        // k1 becomes most recent, k2 is now oldest
        local.get("k1").unwrap();
        local.set("k4", b"4", 0).unwrap();

        assert_eq!(local.len(), 3);
        assert_eq!(local.evictions(), 1);
        assert!(local.get("k2").unwrap().is_none());
        assert!(local.get("k1").unwrap().is_some());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let local = LocalTransport::new(2);
        local.set("a", b"1", 0).unwrap();
        local.set("b", b"2", 0).unwrap();
        local.set("a", b"3", 0).unwrap();
        assert_eq!(local.evictions(), 0);
        assert_eq!(local.get("a").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_get_multi_only_present() {
        let local = LocalTransport::new(10);
        local.set("a", b"1", 0).unwrap();
        local.set("b", b"2", 0).unwrap();

        let found = local.get_multi(&["a", "b", "c"]).unwrap();
        assert_eq!(found.len(), 2);
        assert!(!found.contains_key("c"));
    }

    #[test]
    fn test_cleanup_expired() {
        let local = LocalTransport::new(10);
        local.set("short", b"v", 1).unwrap();
        local.set("long", b"v", 10).unwrap();

        sleep(Duration::from_millis(1100));

        assert_eq!(local.cleanup_expired().unwrap(), 1);
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_flush() {
        let local = LocalTransport::new(10);
        local.set("a", b"1", 0).unwrap();
        local.flush().unwrap();
        assert!(local.is_empty());
    }
}
