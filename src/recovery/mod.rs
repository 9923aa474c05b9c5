//! Resilience executor: error classification, retry with backoff, and
//! per-operation circuit breaking.

mod backoff;
mod breaker;
mod classify;
mod executor;
mod metrics;

pub use backoff::Backoff;
pub use breaker::{BreakerSettings, CircuitBreaker, CircuitBreakers, CircuitSnapshot, CircuitState};
pub use classify::{classify, Classify, ErrorKind, OperationError, RetryPolicy};
pub use executor::{
    BulkItemOutcome, BulkOptions, BulkReport, ErrorRecovery, RecoveryStatus, RetryOptions,
};
pub use metrics::RecoveryMetrics;
