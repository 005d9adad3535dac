//! Retrying Transport
//!
//! Long-lived pooled connections can be dropped by the server or a
//! middlebox; the first use then fails even though the server is reachable.
//! This decorator retries such an operation exactly once.

use std::collections::HashMap;

use tracing::warn;

use crate::error::Result;
use crate::transport::MemcachedTransport;

pub struct RetryingTransport<T> {
    inner: T,
}

impl<T: MemcachedTransport> RetryingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    #[cfg(test)]
    fn inner(&self) -> &T {
        &self.inner
    }

    fn retry<R>(&self, op: &str, key: &str, call: impl Fn(&T) -> Result<R>) -> Result<R> {
        match call(&self.inner) {
            Err(err) if err.is_connection() => {
                warn!("{} '{}' hit a broken connection ({}), retrying once", op, key, err);
                call(&self.inner)
            }
            result => result,
        }
    }
}

impl<T: MemcachedTransport> MemcachedTransport for RetryingTransport<T> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.retry("get", key, |t| t.get(key))
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        self.retry("get_multi", "*", |t| t.get_multi(keys))
    }

    fn set(&self, key: &str, value: &[u8], exptime: u32) -> Result<()> {
        self.retry("set", key, |t| t.set(key, value, exptime))
    }

    fn add(&self, key: &str, value: &[u8], exptime: u32) -> Result<bool> {
        self.retry("add", key, |t| t.add(key, value, exptime))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.retry("delete", key, |t| t.delete(key))
    }

    fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>> {
        self.retry("incr", key, |t| t.incr(key, delta))
    }

    fn decr(&self, key: &str, delta: u64) -> Result<Option<u64>> {
        self.retry("decr", key, |t| t.decr(key, delta))
    }

    // Not retried: touch and flush are not part of the broken-connection set
    fn touch(&self, key: &str, exptime: u32) -> Result<bool> {
        self.inner.touch(key, exptime)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}
