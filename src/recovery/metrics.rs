//! Recovery Metrics
//!
//! Counters describing retry activity. Observational only.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::recovery::ErrorKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryMetrics {
    /// Failed attempts of any kind
    pub total_errors: u64,
    /// Attempts after the first, whatever their outcome
    pub total_retries: u64,
    /// Retries that succeeded
    pub successful_retries: u64,
    /// Retries that failed
    pub failed_retries: u64,
    /// Transitions of any breaker into the open state
    pub circuit_breaker_trips: u64,
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
}

impl RecoveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed attempt. `attempt` is 1-based.
    pub fn record_failure(&mut self, kind: ErrorKind, attempt: u32) {
        self.total_errors += 1;
        *self.errors_by_kind.entry(kind).or_insert(0) += 1;

        if attempt > 1 {
            self.total_retries += 1;
            self.failed_retries += 1;
        }
    }

    /// Records a successful attempt. `attempt` is 1-based.
    pub fn record_success(&mut self, attempt: u32) {
        if attempt > 1 {
            self.total_retries += 1;
            self.successful_retries += 1;
        }
    }

    pub fn record_trip(&mut self) {
        self.circuit_breaker_trips += 1;
    }
}
