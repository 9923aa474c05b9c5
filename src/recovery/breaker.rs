//! # Circuit Breaker
//!
//! Per-operation fault isolation with three states: Closed (normal
//! operation), Open (failing fast) and Half-Open (one probe at a time to test
//! recovery). Breakers are created lazily the first time an operation id is
//! seen and live until reset or cleared.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::RecoveryConfig;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a single probe call at a time
    HalfOpen,
}

/// Thresholds shared by every breaker in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures that open a closed breaker
    pub failure_threshold: u32,
    /// Time after the last failure before an open breaker admits a probe
    pub cooldown: Duration,
    /// Consecutive half-open successes that close the breaker
    pub success_threshold: u32,
}

impl BreakerSettings {
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_threshold.max(1),
            cooldown: config.circuit_breaker_timeout,
            success_threshold: config.circuit_success_threshold.max(1),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

/// State of one operation's breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    /// Consecutive failures
    failure_count: u32,
    /// Consecutive successes
    success_count: u32,
    last_failure_at: Option<Instant>,
    /// Start of the half-open probe currently in flight
    probe_started_at: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            probe_started_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    /// Decides whether a call may run now.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open here and
    /// admits the caller as its probe. While a probe is in flight other
    /// callers are rejected; a probe older than the cooldown is presumed lost.
    pub fn try_acquire(&mut self, settings: &BreakerSettings, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure_at
                    .map_or(true, |at| now.saturating_duration_since(at) >= settings.cooldown);
                if cooled_down {
                    self.state = CircuitState::HalfOpen;
                    self.success_count = 0;
                    self.probe_started_at = Some(now);
                }
                cooled_down
            }
            CircuitState::HalfOpen => {
                let idle = self
                    .probe_started_at
                    .map_or(true, |at| now.saturating_duration_since(at) >= settings.cooldown);
                if idle {
                    self.probe_started_at = Some(now);
                }
                idle
            }
        }
    }

    /// Records a successful call. Returns the new state if it changed.
    pub fn record_success(&mut self, settings: &BreakerSettings) -> Option<CircuitState> {
        self.success_count += 1;

        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.probe_started_at = None;
                if self.success_count >= settings.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.success_count = 0;
                    Some(CircuitState::Closed)
                } else {
                    None
                }
            }
            // A call admitted before the breaker opened
            CircuitState::Open => None,
        }
    }

    /// Records a failed call. Returns the new state if it changed.
    pub fn record_failure(&mut self, settings: &BreakerSettings, now: Instant) -> Option<CircuitState> {
        self.failure_count += 1;
        self.success_count = 0;
        self.last_failure_at = Some(now);

        match self.state {
            CircuitState::Closed if self.failure_count >= settings.failure_threshold => {
                self.state = CircuitState::Open;
                Some(CircuitState::Open)
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.probe_started_at = None;
                Some(CircuitState::Open)
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self, now: Instant) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            last_failure_ms_ago: self
                .last_failure_at
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
        }
    }
}

/// Serializable view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_ms_ago: Option<u64>,
}

/// Breakers keyed by operation id.
///
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct CircuitBreakers {
    settings: BreakerSettings,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl CircuitBreakers {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Admission check for `operation_id`, creating its breaker on first use.
    pub fn try_acquire(&self, operation_id: &str) -> bool {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(operation_id.to_string()).or_default();
        let was_open = breaker.state() == CircuitState::Open;
        let allowed = breaker.try_acquire(&self.settings, Instant::now());

        if was_open && allowed {
            info!(
                operation_id = %operation_id,
                "Circuit breaker half-open, allowing probe"
            );
        }
        allowed
    }

    pub fn record_success(&self, operation_id: &str) -> Option<CircuitState> {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(operation_id.to_string()).or_default();
        let transition = breaker.record_success(&self.settings);

        if transition == Some(CircuitState::Closed) {
            info!(operation_id = %operation_id, "Circuit breaker closed (recovered)");
        }
        transition
    }

    pub fn record_failure(&self, operation_id: &str) -> Option<CircuitState> {
        let mut breakers = self.breakers.lock();
        let breaker = breakers.entry(operation_id.to_string()).or_default();
        let transition = breaker.record_failure(&self.settings, Instant::now());

        if transition == Some(CircuitState::Open) {
            warn!(
                operation_id = %operation_id,
                consecutive_failures = breaker.failure_count(),
                cooldown_ms = self.settings.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            );
        }
        transition
    }

    pub fn state(&self, operation_id: &str) -> Option<CircuitState> {
        self.breakers.lock().get(operation_id).map(CircuitBreaker::state)
    }

    /// Closes the breaker for `operation_id`. Returns false if it never existed.
    pub fn reset(&self, operation_id: &str) -> bool {
        match self.breakers.lock().get_mut(operation_id) {
            Some(breaker) => {
                breaker.reset();
                info!(operation_id = %operation_id, "Circuit breaker reset");
                true
            }
            None => false,
        }
    }

    /// Forgets every breaker.
    pub fn clear(&self) {
        self.breakers.lock().clear();
    }

    pub fn snapshot(&self) -> BTreeMap<String, CircuitSnapshot> {
        let now = Instant::now();
        self.breakers
            .lock()
            .iter()
            .map(|(id, breaker)| (id.clone(), breaker.snapshot(now)))
            .collect()
    }
}
