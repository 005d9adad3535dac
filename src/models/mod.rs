//! Request and Response models for the gateway API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{DeltaRequest, KeysRequest, SetManyRequest, SetRequest, TouchRequest};
pub use responses::{
    AddResponse, CounterResponse, DeleteResponse, ErrorResponse, GetResponse, HealthResponse,
    ManyResponse, MessageResponse, SetManyResponse, SetResponse, StatsResponse, TouchResponse,
};
