//! Response DTOs for the introspection API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_entries: usize,
    pub capacity: usize,
    /// Percentage of lookups that hit
    pub hit_rate: f64,
    pub utilization_percent: f64,
    pub memory_usage_bytes: usize,
    pub last_cleanup: Option<DateTime<Utc>>,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            utilization_percent: stats.utilization_percent(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            total_entries: stats.total_entries,
            capacity: stats.capacity,
            memory_usage_bytes: stats.memory_usage_bytes,
            last_cleanup: stats.last_cleanup,
        }
    }
}

/// Response body for POST /invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Number of entries removed
    pub removed: usize,
}

/// Response body for POST /circuits/:operation_id/reset
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub message: String,
    pub operation_id: String,
}

impl ResetResponse {
    pub fn new(operation_id: impl Into<String>) -> Self {
        let operation_id = operation_id.into();
        Self {
            message: format!("Circuit breaker '{}' reset", operation_id),
            operation_id,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_response_from_stats() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            total_entries: 50,
            capacity: 200,
            ..CacheStats::default()
        };
        let resp = StatsResponse::from(stats);

        assert!((resp.hit_rate - 80.0).abs() < 0.001);
        assert!((resp.utilization_percent - 25.0).abs() < 0.001);
    }

    #[test]
    fn test_stats_response_zero_requests() {
        let resp = StatsResponse::from(CacheStats::default());
        assert_eq!(resp.hit_rate, 0.0);
        assert!(resp.last_cleanup.is_none());
    }

    #[test]
    fn test_reset_response_serialize() {
        let json = serde_json::to_string(&ResetResponse::new("fetch_users")).unwrap();
        assert!(json.contains("fetch_users"));
        assert!(json.contains("reset"));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("Something went wrong"));
    }
}
