//! Background Tasks Module
//!
//! Contains background tasks that run periodically during gateway operation.
//!
//! # Tasks
//! - Expiry sweep: drops expired entries from the in-process transport

mod cleanup;

pub use cleanup::spawn_cleanup_task;
