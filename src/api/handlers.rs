//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint. The cache adapter does
//! blocking network IO, so every call runs on tokio's blocking pool.

use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::MemcachedCache;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    AddResponse, CounterResponse, DeleteResponse, DeltaRequest, GetResponse, HealthResponse,
    KeysRequest, ManyResponse, MessageResponse, SetManyRequest, SetManyResponse, SetRequest,
    SetResponse, StatsResponse, TouchRequest, TouchResponse,
};

/// Application state shared across all handlers.
///
/// The adapter is cheap to clone and internally shared, so no extra lock.
#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: MemcachedCache,
}

impl AppState {
    pub fn new(cache: MemcachedCache) -> Self {
        Self { cache }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens the configured transport; this blocks while the pool connects.
    pub fn from_config(config: &Config) -> Result<Self> {
        MemcachedCache::from_config(config).map(Self::new)
    }

    /// Runs `op` against the cache on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&MemcachedCache) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || op(&cache))
            .await
            .map_err(|e| CacheError::Internal(format!("cache task failed: {}", e)))?
    }
}

/// Body of an endpoint whose request body is optional.
///
/// Only a missing body falls back to the default; a body that is present but
/// malformed is rejected.
fn optional_body<T: Default>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    match body {
        Ok(Json(req)) => Ok(req),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(CacheError::InvalidRequest(rejection.body_text())),
    }
}

/// Handler for GET /cache/:key
///
/// A miss is reported as 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let lookup = key.clone();
    let value = state
        .run(move |cache| cache.get::<Value>(&lookup))
        .await?
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for PUT /cache/:key
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    let target = key.clone();
    state
        .run(move |cache| cache.set(&target, &req.value, req.timeout()))
        .await?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for POST /cache/:key/add
pub async fn add_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetRequest>,
) -> Result<Json<AddResponse>> {
    let target = key.clone();
    let added = state
        .run(move |cache| cache.add(&target, &req.value, req.timeout()))
        .await?;

    Ok(Json(AddResponse { key, added }))
}

/// Handler for DELETE /cache/:key
///
/// Always succeeds for valid keys; `deleted` tells whether anything was removed.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let target = key.clone();
    let deleted = state.run(move |cache| cache.delete(&target)).await?;

    Ok(Json(DeleteResponse { key, deleted }))
}

/// Handler for POST /cache/:key/incr
///
/// Body is optional; `delta` defaults to 1. A missing key is 404.
pub async fn incr_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: std::result::Result<Json<DeltaRequest>, JsonRejection>,
) -> Result<Json<CounterResponse>> {
    let delta = optional_body(body)?.delta;
    let target = key.clone();
    let value = state.run(move |cache| cache.incr(&target, delta)).await?;

    Ok(Json(CounterResponse { key, value }))
}

/// Handler for POST /cache/:key/decr
pub async fn decr_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: std::result::Result<Json<DeltaRequest>, JsonRejection>,
) -> Result<Json<CounterResponse>> {
    let delta = optional_body(body)?.delta;
    let target = key.clone();
    let value = state.run(move |cache| cache.decr(&target, delta)).await?;

    Ok(Json(CounterResponse { key, value }))
}

/// Handler for POST /cache/:key/touch
pub async fn touch_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: std::result::Result<Json<TouchRequest>, JsonRejection>,
) -> Result<Json<TouchResponse>> {
    let timeout = optional_body(body)?.timeout();
    let target = key.clone();
    let touched = state
        .run(move |cache| cache.touch(&target, timeout))
        .await?;

    Ok(Json(TouchResponse { key, touched }))
}

/// Handler for POST /many/get
pub async fn get_many_handler(
    State(state): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<Json<ManyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let values: HashMap<String, Value> = state
        .run(move |cache| cache.get_many(&req.key_refs()))
        .await?;

    Ok(Json(ManyResponse { values }))
}

/// Handler for POST /many/set
pub async fn set_many_handler(
    State(state): State<AppState>,
    Json(req): Json<SetManyRequest>,
) -> Result<Json<SetManyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let total = req.values.len();
    let timeout = req.timeout();
    let failed = state
        .run(move |cache| cache.set_many(req.values, timeout))
        .await?;

    Ok(Json(SetManyResponse {
        stored: total - failed.len(),
        failed,
    }))
}

/// Handler for POST /many/delete
pub async fn delete_many_handler(
    State(state): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<Json<MessageResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let count = req.keys.len();
    state
        .run(move |cache| cache.delete_many(&req.key_refs()))
        .await?;

    Ok(Json(MessageResponse::new(format!("{} keys deleted", count))))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>> {
    state.run(|cache| cache.clear()).await?;
    Ok(Json(MessageResponse::new("Cache flushed")))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.transport_name(),
        state.cache.stats(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::transport::LocalTransport;

    fn test_state() -> AppState {
        let cache = MemcachedCache::new(Arc::new(LocalTransport::new(100)), &Config::local());
        AppState::new(cache)
    }

    fn set_request(value: Value) -> SetRequest {
        SetRequest {
            value,
            timeout: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state();

        let result = set_handler(
            State(state.clone()),
            Path("test_key".to_string()),
            Json(set_request(Value::from("test_value"))),
        )
        .await;
        assert!(result.is_ok());

        let response = get_handler(State(state), Path("test_key".to_string()))
            .await
            .unwrap();
        assert_eq!(response.value, Value::from("test_value"));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let state = test_state();

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler_idempotent() {
        let state = test_state();
        set_handler(
            State(state.clone()),
            Path("to_delete".to_string()),
            Json(set_request(Value::from(1))),
        )
        .await
        .unwrap();

        let first = delete_handler(State(state.clone()), Path("to_delete".to_string()))
            .await
            .unwrap();
        assert!(first.deleted);

        let second = delete_handler(State(state), Path("to_delete".to_string()))
            .await
            .unwrap();
        assert!(!second.deleted);
    }

    #[tokio::test]
    async fn test_incr_handler_default_delta() {
        let state = test_state();
        set_handler(
            State(state.clone()),
            Path("n".to_string()),
            Json(set_request(Value::from(41))),
        )
        .await
        .unwrap();

        let response = incr_handler(
            State(state),
            Path("n".to_string()),
            Ok(Json(DeltaRequest::default())),
        )
        .await
        .unwrap();
        assert_eq!(response.value, 42);
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let state = test_state();
        let result = set_handler(
            State(state),
            Path("bad key".to_string()),
            Json(set_request(Value::from(1))),
        )
        .await;
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state();
        let response = stats_handler(State(state)).await;
        assert_eq!(response.backend, "locmem");
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
