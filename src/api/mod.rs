//! API Module
//!
//! HTTP gateway exposing the cache adapter's method set as JSON endpoints.
//!
//! # Endpoints
//! - `GET /cache/:key` - Retrieve a value (404 on miss)
//! - `PUT /cache/:key` - Store a value
//! - `DELETE /cache/:key` - Delete a key (idempotent)
//! - `POST /cache/:key/add` - Store only if absent
//! - `POST /cache/:key/incr`, `/decr` - Adjust an integer value
//! - `POST /cache/:key/touch` - Refresh expiration
//! - `POST /many/get`, `/many/set`, `/many/delete` - Bulk operations
//! - `DELETE /cache` - Flush
//! - `GET /stats` - Adapter statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
