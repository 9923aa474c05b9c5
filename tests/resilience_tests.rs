//! Integration Tests for the cache and the recovery executor together
//!
//! Exercises the usual client pattern: a flaky fetch wrapped in retries,
//! with successful results memoized in the shared cache.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_cache::cache::{MemoizeOptions, SharedCache};
use resilient_cache::recovery::{
    BulkItemOutcome, BulkOptions, CircuitState, ErrorKind, ErrorRecovery, OperationError,
    RetryOptions,
};
use resilient_cache::{CacheStore, RecoveryError, SetOptions};
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

fn cache() -> SharedCache<String> {
    SharedCache::new(CacheStore::new(50, Duration::from_secs(300)))
}

/// Fails with a network error `failures` times, then returns `value`.
fn flaky(
    calls: Arc<AtomicU32>,
    failures: u32,
    value: &'static str,
) -> impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, OperationError>> + Send>>
{
    move || {
        let calls = Arc::clone(&calls);
        Box::pin(async move {
            if calls.fetch_add(1, Ordering::SeqCst) < failures {
                Err(OperationError::new(ErrorKind::Network, "connection reset"))
            } else {
                Ok(value.to_string())
            }
        })
    }
}

// == Retry + Cache ==

#[tokio::test(start_paused = true)]
async fn test_retried_result_is_cached() {
    let cache = cache();
    let recovery = ErrorRecovery::default();
    let calls = Arc::new(AtomicU32::new(0));

    let key = "dashboard:42";
    assert!(cache.get(key).await.is_none());

    let fetch = flaky(Arc::clone(&calls), 2, "dashboard payload");
    let value = assert_ok!(
        recovery
            .with_retry(fetch, RetryOptions::new("fetch_dashboard"))
            .await
    );
    cache.set(key, value, SetOptions::new()).await;

    assert_eq!(cache.get(key).await.as_deref(), Some("dashboard payload"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);

    let status = recovery.get_recovery_status();
    assert_eq!(status.retry_attempts, 2);
    assert_eq!(status.metrics.successful_retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_memoized_fetch_through_retry() {
    let cache = cache();
    let recovery = Arc::new(ErrorRecovery::default());
    let calls = Arc::new(AtomicU32::new(0));

    let memoized = {
        let recovery = Arc::clone(&recovery);
        let calls = Arc::clone(&calls);
        cache.memoize(
            move |user_id: u32| {
                let recovery = Arc::clone(&recovery);
                let fetch = flaky(Arc::clone(&calls), 1, "profile");
                async move {
                    recovery
                        .with_retry(fetch, RetryOptions::new(format!("profile_{}", user_id)))
                        .await
                        .map_err(|err| err.to_string())
                }
            },
            MemoizeOptions::with_key_generator(|user_id: &u32| Some(format!("profile:{}", user_id)))
                .tags(["profiles"]),
        )
    };

    assert_eq!(assert_ok!(memoized.call(7).await), "profile");
    assert_eq!(assert_ok!(memoized.call(7).await), "profile");
    // One failure plus one success; the second call was served from cache
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(cache.invalidate_by_tag("profiles").await, 1);
    assert_eq!(assert_ok!(memoized.call(7).await), "profile");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_not_cached() {
    let cache = cache();
    let recovery = ErrorRecovery::default();

    let result = recovery
        .with_retry(
            || async { Err::<String, _>(OperationError::with_status(404, "no such user")) },
            RetryOptions::new("user_lookup"),
        )
        .await;
    let err = assert_err!(result);

    assert_eq!(err.kind(), Some(ErrorKind::Client));
    assert!(cache.is_empty().await);
}

// == Circuit Breaking ==

#[tokio::test(start_paused = true)]
async fn test_open_circuit_rejects_without_running() {
    let recovery = ErrorRecovery::default();
    let calls = Arc::new(AtomicU32::new(0));

    // Server errors allow two retries, so two calls make six failed attempts
    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        let result = recovery
            .with_retry(
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(OperationError::with_status(503, "unavailable")) }
                },
                RetryOptions::new("reports"),
            )
            .await;
        assert_err!(result);
    }

    // The fifth failure opened the circuit during the second call
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(recovery.circuit_state("reports"), Some(CircuitState::Open));

    let seen = Arc::clone(&calls);
    let result = recovery
        .with_retry(
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, OperationError>(()) }
            },
            RetryOptions::new("reports"),
        )
        .await;
    assert!(matches!(
        result,
        Err(RecoveryError::CircuitOpen { ref operation_id }) if operation_id == "reports"
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    // Unrelated operations are unaffected
    assert_ok!(
        recovery
            .with_retry(|| async { Ok::<_, OperationError>(()) }, RetryOptions::new("settings"))
            .await
    );

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_ok!(
        recovery
            .with_retry(|| async { Ok::<_, OperationError>(()) }, RetryOptions::new("reports"))
            .await
    );
    assert_eq!(recovery.circuit_state("reports"), Some(CircuitState::HalfOpen));
}

// == Bulk + Preload ==

#[tokio::test(start_paused = true)]
async fn test_bulk_results_warm_the_cache() {
    let cache = cache();
    let recovery = ErrorRecovery::default();
    let calls = Arc::new(AtomicU32::new(0));

    let operations: Vec<_> = (0..4)
        .map(|i| {
            let calls = Arc::clone(&calls);
            move || {
                let calls = Arc::clone(&calls);
                async move {
                    // Item 2 fails once before succeeding
                    if i == 2 && calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(OperationError::new(ErrorKind::Timeout, "slow upstream"))
                    } else {
                        Ok((format!("item:{}", i), format!("value {}", i)))
                    }
                }
            }
        })
        .collect();

    let report = assert_ok!(
        recovery
            .with_bulk_retry(operations, BulkOptions::new().concurrency(2))
            .await
    );
    assert_eq!(report.success_count, 4);

    let entries = report.outcomes.into_iter().filter_map(|outcome| match outcome {
        BulkItemOutcome::Success((key, value)) => Some((key, value, SetOptions::new())),
        _ => None,
    });
    cache.warmup(entries).await;

    assert_eq!(cache.len().await, 4);
    assert_eq!(cache.get("item:2").await.as_deref(), Some("value 2"));
    assert_eq!(recovery.get_recovery_status().metrics.successful_retries, 1);
}

#[tokio::test]
async fn test_preload_reports_each_key() {
    let cache = cache();
    cache.set("a", "cached".to_string(), SetOptions::new()).await;

    let outcomes = cache
        .preload(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            |key| async move {
                if key == "c" {
                    Err(OperationError::with_status(500, "boom"))
                } else {
                    Ok(format!("fetched {}", key))
                }
            },
        )
        .await;

    assert!(outcomes[0].cached);
    assert!(outcomes[1].success && !outcomes[1].cached);
    assert!(!outcomes[2].success);
    assert_eq!(outcomes[2].error.as_deref(), Some("boom"));

    assert_eq!(cache.get("a").await.as_deref(), Some("cached"));
    assert_eq!(cache.get("b").await.as_deref(), Some("fetched b"));
    assert!(cache.get("c").await.is_none());
}
