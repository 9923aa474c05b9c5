//! API Handlers
//!
//! HTTP request handlers for each introspection endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheStore, SharedCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    HealthResponse, InvalidateRequest, InvalidateResponse, InvalidateTarget, ResetResponse,
    StatsResponse,
};
use crate::recovery::{ErrorRecovery, RecoveryStatus};

/// Application state shared across all handlers.
///
/// Holds the single cache and executor instances the process was built with.
#[derive(Clone)]
pub struct AppState {
    pub cache: SharedCache<Value>,
    pub recovery: Arc<ErrorRecovery>,
}

impl AppState {
    pub fn new(cache: SharedCache<Value>, recovery: Arc<ErrorRecovery>) -> Self {
        Self { cache, recovery }
    }

    /// Builds the cache and executor from configuration.
    ///
    /// The periodic sweep is not started here.
    pub fn from_config(config: &Config) -> Self {
        let store = CacheStore::from_config(&config.cache);
        Self::new(
            SharedCache::new(store),
            Arc::new(ErrorRecovery::new(config.recovery.clone())),
        )
    }
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats().await))
}

/// Handler for GET /recovery
pub async fn recovery_handler(State(state): State<AppState>) -> Json<RecoveryStatus> {
    Json(state.recovery.get_recovery_status())
}

/// Handler for POST /invalidate
///
/// Removes by key, tag or pattern. An invalid pattern is a 400.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    let target = req.validate().map_err(CacheError::InvalidRequest)?;

    let removed = match target {
        InvalidateTarget::Key(key) => state.cache.invalidate(&key).await,
        InvalidateTarget::Tag(tag) => state.cache.invalidate_by_tag(&tag).await,
        InvalidateTarget::Pattern(pattern) => state.cache.invalidate_by_pattern(&pattern).await?,
    };

    Ok(Json(InvalidateResponse { removed }))
}

/// Handler for POST /circuits/:operation_id/reset
pub async fn reset_circuit_handler(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<ResetResponse>> {
    if !state.recovery.reset_circuit_breaker(&operation_id) {
        return Err(CacheError::NotFound(format!(
            "No circuit breaker for operation '{}'",
            operation_id
        )));
    }

    Ok(Json(ResetResponse::new(operation_id)))
}
