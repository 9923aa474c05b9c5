//! Configuration Module
//!
//! Handles loading cache and recovery tuning from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::EvictionStrategy;

/// Cache engine parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// TTL for entries stored without an explicit one
    pub default_ttl: Duration,
    /// Period of the background sweep
    pub cleanup_interval: Duration,
    /// Eviction strategy used when `set` does not name one
    pub default_strategy: EvictionStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60),
            default_strategy: EvictionStrategy::Lru,
        }
    }
}

/// Retry, backoff and circuit breaker parameters.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    /// Per-attempt deadline
    pub timeout: Duration,
    /// Consecutive failures that open a breaker
    pub circuit_breaker_threshold: u32,
    /// Cooldown before an open breaker lets a probe through
    pub circuit_breaker_timeout: Duration,
    /// Consecutive half-open successes that close a breaker
    pub circuit_success_threshold: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            timeout: Duration::from_millis(30_000),
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_millis(60_000),
            circuit_success_threshold: 2,
        }
    }
}

/// Top-level configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub recovery: RecoveryConfig,
    /// Introspection API port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` (default: 1000)
    /// - `CACHE_DEFAULT_TTL_MS` (default: 300000)
    /// - `CACHE_CLEANUP_INTERVAL_MS` (default: 60000, zero falls back to the default)
    /// - `CACHE_DEFAULT_STRATEGY` - `lru`, `lfu` or `ttl` (default: lru)
    /// - `RETRY_MAX_RETRIES` (default: 3)
    /// - `RETRY_INITIAL_DELAY_MS` (default: 1000)
    /// - `RETRY_MAX_DELAY_MS` (default: 30000)
    /// - `RETRY_BACKOFF_MULTIPLIER` (default: 2.0)
    /// - `RETRY_JITTER_FACTOR` (default: 0.1)
    /// - `RETRY_TIMEOUT_MS` (default: 30000)
    /// - `CIRCUIT_BREAKER_THRESHOLD` (default: 5)
    /// - `CIRCUIT_BREAKER_TIMEOUT_MS` (default: 60000)
    /// - `CIRCUIT_BREAKER_SUCCESS_THRESHOLD` (default: 2)
    /// - `SERVER_PORT` (default: 3000)
    pub fn from_env() -> Self {
        let cache_defaults = CacheConfig::default();
        let recovery_defaults = RecoveryConfig::default();

        Self {
            cache: CacheConfig {
                max_entries: env_or("CACHE_MAX_ENTRIES", cache_defaults.max_entries),
                default_ttl: env_ms_or("CACHE_DEFAULT_TTL_MS", cache_defaults.default_ttl),
                cleanup_interval: env_nonzero_ms_or(
                    "CACHE_CLEANUP_INTERVAL_MS",
                    cache_defaults.cleanup_interval,
                ),
                default_strategy: env_or(
                    "CACHE_DEFAULT_STRATEGY",
                    cache_defaults.default_strategy,
                ),
            },
            recovery: RecoveryConfig {
                max_retries: env_or("RETRY_MAX_RETRIES", recovery_defaults.max_retries),
                initial_delay: env_ms_or(
                    "RETRY_INITIAL_DELAY_MS",
                    recovery_defaults.initial_delay,
                ),
                max_delay: env_ms_or("RETRY_MAX_DELAY_MS", recovery_defaults.max_delay),
                backoff_multiplier: env_or(
                    "RETRY_BACKOFF_MULTIPLIER",
                    recovery_defaults.backoff_multiplier,
                ),
                jitter_factor: env_or("RETRY_JITTER_FACTOR", recovery_defaults.jitter_factor),
                timeout: env_ms_or("RETRY_TIMEOUT_MS", recovery_defaults.timeout),
                circuit_breaker_threshold: env_or(
                    "CIRCUIT_BREAKER_THRESHOLD",
                    recovery_defaults.circuit_breaker_threshold,
                ),
                circuit_breaker_timeout: env_ms_or(
                    "CIRCUIT_BREAKER_TIMEOUT_MS",
                    recovery_defaults.circuit_breaker_timeout,
                ),
                circuit_success_threshold: env_or(
                    "CIRCUIT_BREAKER_SUCCESS_THRESHOLD",
                    recovery_defaults.circuit_success_threshold,
                ),
            },
            server_port: env_or("SERVER_PORT", 3000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            recovery: RecoveryConfig::default(),
            server_port: 3000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms_or(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Like [`env_ms_or`], but zero also falls back to the default.
fn env_nonzero_ms_or(name: &str, default: Duration) -> Duration {
    Some(env_ms_or(name, default))
        .filter(|d| !d.is_zero())
        .unwrap_or(default)
}
