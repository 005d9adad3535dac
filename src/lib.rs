//! memcached backend - a cache adapter over pooled memcached connections
//!
//! Validates and versions keys, serializes values, translates timeouts into
//! memcached expiration times and maps protocol failures onto [`CacheError`].
//! An in-process transport with the same semantics backs tests and local
//! development, and an HTTP gateway exposes the adapter as JSON endpoints.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;
pub mod transport;

pub use api::AppState;
pub use cache::{MemcachedCache, Timeout};
pub use config::Config;
pub use error::CacheError;
pub use tasks::spawn_cleanup_task;
