//! Cache Module
//!
//! The memcached cache adapter and the pieces it is built from: key
//! validation, value encoding, timeout translation and counters.

mod backend;
mod codec;
mod key;
mod stats;
pub mod timeout;


// Re-export public types
pub use backend::MemcachedCache;
pub use codec::ValueCodec;
pub use key::{CacheKey, KeyBuilder};
pub use stats::{CacheStats, StatsSnapshot};
pub use timeout::Timeout;

// == Public Constants ==
/// Maximum key length memcached accepts, in bytes
pub const MAX_KEY_LENGTH: usize = 250;
