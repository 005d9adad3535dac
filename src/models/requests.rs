//! Request DTOs for the gateway API
//!
//! Defines the structure of incoming HTTP request bodies.
//!
//! Timeout fields follow the cache's conventions: `timeout` absent uses the
//! configured default, `null` never expires, a number is relative seconds
//! (0 = never, negative = expired). `expires_at` (RFC 3339) wins over
//! `timeout` when both are given.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::cache::Timeout;

/// Largest key list accepted by the bulk endpoints
pub const MAX_BATCH_KEYS: usize = 1000;

/// Keeps "field absent" apart from "field is null".
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn resolve_timeout(timeout: Option<Option<i64>>, expires_at: Option<DateTime<Utc>>) -> Timeout {
    match (expires_at, timeout) {
        (Some(at), _) => Timeout::At(at),
        (None, None) => Timeout::Default,
        (None, Some(None)) => Timeout::Never,
        (None, Some(Some(secs))) => Timeout::Seconds(secs),
    }
}

/// Request body for PUT /cache/:key and POST /cache/:key/add
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// Any JSON value
    pub value: Value,
    #[serde(default, deserialize_with = "present")]
    pub timeout: Option<Option<i64>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SetRequest {
    pub fn timeout(&self) -> Timeout {
        resolve_timeout(self.timeout, self.expires_at)
    }
}

/// Request body for POST /cache/:key/touch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TouchRequest {
    #[serde(default, deserialize_with = "present")]
    pub timeout: Option<Option<i64>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TouchRequest {
    pub fn timeout(&self) -> Timeout {
        resolve_timeout(self.timeout, self.expires_at)
    }
}

fn default_delta() -> i64 {
    1
}

/// Request body for POST /cache/:key/incr and /decr
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaRequest {
    #[serde(default = "default_delta")]
    pub delta: i64,
}

impl Default for DeltaRequest {
    fn default() -> Self {
        Self {
            delta: default_delta(),
        }
    }
}

/// Request body for POST /many/get and /many/delete
#[derive(Debug, Clone, Deserialize)]
pub struct KeysRequest {
    pub keys: Vec<String>,
}

impl KeysRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.keys.len() > MAX_BATCH_KEYS {
            return Some(format!("At most {} keys per request", MAX_BATCH_KEYS));
        }
        None
    }

    pub fn key_refs(&self) -> Vec<&str> {
        self.keys.iter().map(String::as_str).collect()
    }
}

/// Request body for POST /many/set
#[derive(Debug, Clone, Deserialize)]
pub struct SetManyRequest {
    pub values: HashMap<String, Value>,
    #[serde(default, deserialize_with = "present")]
    pub timeout: Option<Option<i64>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SetManyRequest {
    pub fn validate(&self) -> Option<String> {
        if self.values.len() > MAX_BATCH_KEYS {
            return Some(format!("At most {} values per request", MAX_BATCH_KEYS));
        }
        None
    }

    pub fn timeout(&self) -> Timeout {
        resolve_timeout(self.timeout, self.expires_at)
    }
}
