//! # Recovery Executor
//!
//! Runs asynchronous operations with a per-attempt timeout, classified
//! retries with exponential backoff, and per-operation circuit breaking.
//!
//! Attempts within one `with_retry` call are strictly sequential. A timed-out
//! attempt's future is dropped, which cancels it at its next suspension
//! point; work it spawned elsewhere keeps running.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::RecoveryConfig;
use crate::error::RecoveryError;
use crate::recovery::{
    Backoff, BreakerSettings, CircuitBreakers, CircuitSnapshot, CircuitState, Classify,
    ErrorKind, RecoveryMetrics, RetryPolicy,
};

type RetryHook<E> = Arc<dyn Fn(&RecoveryError<E>, u32, Duration) + Send + Sync>;
type FinalFailureHook<E> = Arc<dyn Fn(&RecoveryError<E>, u32) + Send + Sync>;
type ItemSuccessHook<T> = Arc<dyn Fn(&T, usize) + Send + Sync>;
type ItemFailureHook<E> = Arc<dyn Fn(&RecoveryError<E>, usize) + Send + Sync>;
type ProgressHook = Arc<dyn Fn(usize, usize) + Send + Sync>;

const DEFAULT_OPERATION_ID: &str = "default";
const DEFAULT_BULK_PREFIX: &str = "bulk";

// == Retry Options ==
/// Per-call settings for [`ErrorRecovery::with_retry`].
pub struct RetryOptions<E> {
    /// Names the circuit breaker guarding this call
    pub operation_id: String,
    /// Upper bound on retries; the error kind's policy may lower it
    pub max_retries: Option<u32>,
    /// Per-attempt deadline
    pub timeout: Option<Duration>,
    /// Replaces the classified kind's default policy
    pub policy: Option<RetryPolicy>,
    on_retry: Option<RetryHook<E>>,
    on_final_failure: Option<FinalFailureHook<E>>,
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            operation_id: self.operation_id.clone(),
            max_retries: self.max_retries,
            timeout: self.timeout,
            policy: self.policy,
            on_retry: self.on_retry.clone(),
            on_final_failure: self.on_final_failure.clone(),
        }
    }
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self::new(DEFAULT_OPERATION_ID)
    }
}

impl<E> RetryOptions<E> {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            max_retries: None,
            timeout: None,
            policy: None,
            on_retry: None,
            on_final_failure: None,
        }
    }

    pub fn operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = operation_id.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Called before each backoff sleep with the error, the 1-based attempt
    /// that failed, and the delay about to be waited.
    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RecoveryError<E>, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Called once with the terminal error and the number of retries made.
    pub fn on_final_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RecoveryError<E>, u32) + Send + Sync + 'static,
    {
        self.on_final_failure = Some(Arc::new(hook));
        self
    }
}

// == Bulk Options ==
/// Settings for [`ErrorRecovery::with_bulk_retry`].
pub struct BulkOptions<T, E> {
    /// Items run concurrently per group
    pub concurrency: usize,
    /// Stop after the first group containing a failure
    pub fail_fast: bool,
    /// Template for each item; its operation id becomes the prefix of
    /// `<prefix>_<index>`
    pub retry: RetryOptions<E>,
    on_item_success: Option<ItemSuccessHook<T>>,
    on_item_failure: Option<ItemFailureHook<E>>,
    on_progress: Option<ProgressHook>,
}

impl<T, E> Default for BulkOptions<T, E> {
    fn default() -> Self {
        Self {
            concurrency: 3,
            fail_fast: false,
            retry: RetryOptions::new(DEFAULT_BULK_PREFIX),
            on_item_success: None,
            on_item_failure: None,
            on_progress: None,
        }
    }
}

impl<T, E> BulkOptions<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn retry(mut self, retry: RetryOptions<E>) -> Self {
        self.retry = retry;
        self
    }

    pub fn on_item_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T, usize) + Send + Sync + 'static,
    {
        self.on_item_success = Some(Arc::new(hook));
        self
    }

    pub fn on_item_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RecoveryError<E>, usize) + Send + Sync + 'static,
    {
        self.on_item_failure = Some(Arc::new(hook));
        self
    }

    /// Called after each item settles with `(completed, total)`.
    pub fn on_progress<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(hook));
        self
    }
}

// == Bulk Report ==
#[derive(Debug)]
pub enum BulkItemOutcome<T, E> {
    Success(T),
    Failure(RecoveryError<E>),
    /// Never dispatched because an earlier group failed under `fail_fast`
    Skipped,
}

impl<T, E> BulkItemOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, BulkItemOutcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BulkItemOutcome::Failure(_))
    }
}

impl<T, E> From<Result<T, RecoveryError<E>>> for BulkItemOutcome<T, E> {
    fn from(result: Result<T, RecoveryError<E>>) -> Self {
        match result {
            Ok(value) => BulkItemOutcome::Success(value),
            Err(err) => BulkItemOutcome::Failure(err),
        }
    }
}

/// Per-item outcomes, in input order, plus aggregate counts.
#[derive(Debug)]
pub struct BulkReport<T, E> {
    pub outcomes: Vec<BulkItemOutcome<T, E>>,
    pub success_count: usize,
    pub error_count: usize,
    pub skipped_count: usize,
    /// Work stopped early under `fail_fast`
    pub aborted: bool,
}

impl<T, E> BulkReport<T, E> {
    fn from_outcomes(outcomes: Vec<BulkItemOutcome<T, E>>, aborted: bool) -> Self {
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        let error_count = outcomes.iter().filter(|o| o.is_failure()).count();
        let skipped_count = outcomes.len() - success_count - error_count;

        Self {
            outcomes,
            success_count,
            error_count,
            skipped_count,
            aborted,
        }
    }
}

// == Recovery Status ==
/// Read-only snapshot for dashboards and logs.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatus {
    /// Some call is currently waiting out a backoff delay
    pub is_recovering: bool,
    pub last_error: Option<String>,
    /// Retries made by the most recently finished call
    pub retry_attempts: u32,
    pub metrics: RecoveryMetrics,
    pub circuit_breakers: BTreeMap<String, CircuitSnapshot>,
}

#[derive(Debug, Default)]
struct RecoveryState {
    metrics: RecoveryMetrics,
    last_error: Option<String>,
    retry_attempts: u32,
}

/// Marks a call as recovering for as long as it is held.
struct Recovering<'a>(&'a AtomicUsize);

impl<'a> Recovering<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Recovering<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// == Error Recovery ==
/// Retry and circuit-breaker executor.
///
/// Construct once and share by reference (or `Arc`) with every caller that
/// should see the same breakers and metrics.
#[derive(Debug)]
pub struct ErrorRecovery {
    config: RecoveryConfig,
    backoff: Backoff,
    breakers: CircuitBreakers,
    state: Mutex<RecoveryState>,
    recovering: AtomicUsize,
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

impl ErrorRecovery {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            backoff: Backoff::from_config(&config),
            breakers: CircuitBreakers::new(BreakerSettings::from_config(&config)),
            config,
            state: Mutex::new(RecoveryState::default()),
            recovering: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    // == With Retry ==
    /// Runs `operation` until it succeeds, fails terminally, or exhausts its
    /// retries.
    ///
    /// Fails with `CircuitOpen` without running anything when the breaker for
    /// `options.operation_id` rejects the call. Otherwise each failure is
    /// classified and recorded against the breaker; it is retried only when
    /// its policy is retryable, retries remain, and the breaker has not just
    /// opened. The last error is returned unchanged.
    pub async fn with_retry<T, E, F, Fut>(
        &self,
        mut operation: F,
        options: RetryOptions<E>,
    ) -> Result<T, RecoveryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let operation_id = options.operation_id.as_str();

        if !self.breakers.try_acquire(operation_id) {
            warn!("Circuit breaker is open for operation: {}", operation_id);
            return Err(RecoveryError::CircuitOpen {
                operation_id: operation_id.to_string(),
            });
        }

        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let started = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            let outcome = match tokio::time::timeout(timeout, operation()).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(RecoveryError::Operation(err)),
                Err(_) => Err(RecoveryError::Timeout(timeout)),
            };

            let error = match outcome {
                Ok(value) => {
                    self.breakers.record_success(operation_id);
                    self.finish_success(attempt);
                    if attempt > 1 {
                        info!(
                            "Operation {} succeeded after {} retries in {:?}",
                            operation_id,
                            attempt - 1,
                            started.elapsed()
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = error.kind().unwrap_or(ErrorKind::Unknown);
            let policy = options.policy.unwrap_or_else(|| kind.default_policy());
            let tripped = self.breakers.record_failure(operation_id) == Some(CircuitState::Open);
            self.record_failure(kind, attempt, tripped);

            let retries_made = attempt - 1;
            let retry_limit = max_retries.min(policy.max_retries);

            if !policy.retryable || retries_made >= retry_limit || tripped {
                self.finish_failure(&error, retries_made);
                error!(
                    "Operation {} failed after {} retries ({}): {}",
                    operation_id, retries_made, kind, error
                );
                if let Some(hook) = &options.on_final_failure {
                    hook(&error, retries_made);
                }
                return Err(error);
            }

            let delay = self.backoff.delay(attempt, policy.base_delay);
            if let Some(hook) = &options.on_retry {
                hook(&error, attempt, delay);
            }
            warn!(
                "Retry attempt {} for {} in {:?} due to: {}",
                attempt, operation_id, delay, error
            );

            {
                let _recovering = Recovering::enter(&self.recovering);
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    // == With Bulk Retry ==
    /// Runs `operations` in groups of `options.concurrency`, each item under
    /// its own [`with_retry`](Self::with_retry) with operation id
    /// `<prefix>_<index>`.
    ///
    /// Items in a group run concurrently; the next group starts only once the
    /// current one has fully settled. Under `fail_fast` no group starts after
    /// one containing a failure, and the remaining items are reported as
    /// skipped.
    pub async fn with_bulk_retry<T, E, F, Fut>(
        &self,
        operations: Vec<F>,
        options: BulkOptions<T, E>,
    ) -> Result<BulkReport<T, E>, RecoveryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        if options.concurrency == 0 {
            return Err(RecoveryError::Configuration(
                "Bulk concurrency must be at least 1".to_string(),
            ));
        }

        let total = operations.len();
        let completed = AtomicUsize::new(0);
        let mut outcomes: Vec<BulkItemOutcome<T, E>> = Vec::with_capacity(total);
        let mut pending = operations.into_iter().enumerate();
        let mut aborted = false;

        loop {
            let group: Vec<(usize, F)> = pending.by_ref().take(options.concurrency).collect();
            if group.is_empty() {
                break;
            }

            let options = &options;
            let completed = &completed;
            let results = join_all(group.into_iter().map(|(index, operation)| async move {
                let retry = options
                    .retry
                    .clone()
                    .operation_id(format!("{}_{}", options.retry.operation_id, index));
                let result = self.with_retry(operation, retry).await;

                match &result {
                    Ok(value) => {
                        if let Some(hook) = &options.on_item_success {
                            hook(value, index);
                        }
                    }
                    Err(err) => {
                        if let Some(hook) = &options.on_item_failure {
                            hook(err, index);
                        }
                    }
                }

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(hook) = &options.on_progress {
                    hook(done, total);
                }
                result
            }))
            .await;

            let group_failed = results.iter().any(Result::is_err);
            outcomes.extend(results.into_iter().map(BulkItemOutcome::from));

            if options.fail_fast && group_failed {
                aborted = true;
                outcomes.extend(pending.by_ref().map(|_| BulkItemOutcome::Skipped));
                warn!(
                    "Bulk retry aborted after first failing group: {} of {} items skipped",
                    total - completed.load(Ordering::SeqCst),
                    total
                );
                break;
            }
        }

        Ok(BulkReport::from_outcomes(outcomes, aborted))
    }

    // == Status ==
    pub fn get_recovery_status(&self) -> RecoveryStatus {
        let state = self.state.lock();
        RecoveryStatus {
            is_recovering: self.recovering.load(Ordering::SeqCst) > 0,
            last_error: state.last_error.clone(),
            retry_attempts: state.retry_attempts,
            metrics: state.metrics.clone(),
            circuit_breakers: self.breakers.snapshot(),
        }
    }

    pub fn circuit_state(&self, operation_id: &str) -> Option<CircuitState> {
        self.breakers.state(operation_id)
    }

    /// Closes the breaker for `operation_id`. Returns false if none exists.
    pub fn reset_circuit_breaker(&self, operation_id: &str) -> bool {
        self.breakers.reset(operation_id)
    }

    /// Zeroes all metrics and forgets every breaker.
    pub fn clear_metrics(&self) {
        *self.state.lock() = RecoveryState::default();
        self.breakers.clear();
        info!("Recovery metrics and circuit breakers cleared");
    }

    fn record_failure(&self, kind: ErrorKind, attempt: u32, tripped: bool) {
        let mut state = self.state.lock();
        state.metrics.record_failure(kind, attempt);
        if tripped {
            state.metrics.record_trip();
        }
    }

    fn finish_success(&self, attempt: u32) {
        let mut state = self.state.lock();
        state.metrics.record_success(attempt);
        state.retry_attempts = attempt - 1;
        state.last_error = None;
    }

    fn finish_failure<E: Display>(&self, error: &RecoveryError<E>, retries_made: u32) {
        let mut state = self.state.lock();
        state.retry_attempts = retries_made;
        state.last_error = Some(error.to_string());
    }
}
