//! Chaos tests for the parallel executor
//!
//! These tests verify the executor's contract under adverse conditions:
//! - Mixed successes, failures, and timeouts in one batch
//! - Pool bounds under load
//! - Response-completeness reconciliation (exactly one response per
//!   submitted assignment, always)
//!
//! Scenarios are deterministic: per-request behavior derives from the
//! assignment index, not wall-clock randomness.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use llm_relay::{
    ConverseRequest, ExecutorConfig, InferenceBackend, InvokeSuccess, InvokeTarget, Message,
    ParallelExecutor, ProviderError, ProviderErrorKind, RegionAssignment, Relay, RelayConfig,
    RequestPayload, RetryExhaustedError,
};

// =============================================================================
// Helpers
// =============================================================================

/// Route executor logs through `RUST_LOG` when debugging these tests
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn assignment(index: usize) -> RegionAssignment {
    RegionAssignment::with_id(
        format!("req-{index}"),
        ConverseRequest::new(
            vec!["sonnet".to_string()],
            vec!["us-east-1".to_string()],
            RequestPayload::new().with_message(Message::user_text(format!("prompt {index}"))),
        ),
    )
}

fn index_of(id: &str) -> usize {
    id.trim_start_matches("req-").parse().unwrap_or(0)
}

fn ok_response(request: &ConverseRequest) -> llm_relay::ConverseResponse {
    llm_relay::ConverseResponse {
        request_id: request.request_id,
        success: true,
        output: Some(InvokeSuccess {
            content: "done".to_string(),
            stop_reason: None,
            usage: None,
            duration_ms: 1,
        }),
        model_id: Some("m".to_string()),
        region: Some("us-east-1".to_string()),
        access_method: None,
        profile_id: None,
        attempts: Vec::new(),
        adaptation: Default::default(),
        warnings: Vec::new(),
    }
}

// =============================================================================
// Test 1: Completeness Under Mixed Outcomes
// =============================================================================

/// A batch where requests succeed, fail, and time out still produces
/// exactly one response per assignment, with the right shape for each.
#[tokio::test]
async fn test_completeness_under_mixed_outcomes() {
    init_tracing();
    const TOTAL: usize = 30;

    let executor = ParallelExecutor::new(ExecutorConfig {
        max_concurrent_requests: 8,
        request_timeout_seconds: 1,
    });

    // The assignment id rides in the first model name so the runner can
    // pick its behavior deterministically.
    let assignments: Vec<RegionAssignment> = (0..TOTAL)
        .map(|i| {
            RegionAssignment::with_id(
                format!("req-{i}"),
                ConverseRequest::new(
                    vec![format!("{i}")],
                    vec!["us-east-1".to_string()],
                    RequestPayload::new(),
                ),
            )
        })
        .collect();

    let responses = executor
        .execute(assignments, |request| async move {
            let index: usize = request.models[0].parse().unwrap_or(0);
            match index % 3 {
                // Succeeds quickly
                0 => Ok(ok_response(&request)),
                // Fails with exhaustion
                1 => Err(RetryExhaustedError {
                    request_id: request.request_id,
                    candidates_tried: 2,
                    attempts: Vec::new(),
                }),
                // Sleeps past the timeout
                _ => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(ok_response(&request))
                }
            }
        })
        .await;

    assert_eq!(responses.len(), TOTAL, "response mapping must be complete");

    for (id, response) in &responses {
        match index_of(id) % 3 {
            0 => assert!(response.success, "{id} should have succeeded"),
            1 => {
                assert!(!response.success);
                assert!(response.warnings.iter().any(|w| w.contains("failed")));
            }
            _ => {
                assert!(!response.success);
                assert!(
                    response.warnings.iter().any(|w| w.contains("timed out")),
                    "{id} should carry a timeout warning"
                );
            }
        }
    }
}

// =============================================================================
// Test 2: Pool Bound Under Load
// =============================================================================

/// Fifty requests through a pool of five never exceed five in flight.
#[tokio::test]
async fn test_pool_bound_under_load() {
    init_tracing();
    let executor = ParallelExecutor::new(ExecutorConfig {
        max_concurrent_requests: 5,
        request_timeout_seconds: 10,
    });
    let assignments: Vec<RegionAssignment> = (0..50).map(assignment).collect();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let responses = {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        executor
            .execute(assignments, move |request| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(ok_response(&request))
                }
            })
            .await
    };

    assert_eq!(responses.len(), 50);
    assert!(responses.values().all(|r| r.success));
    assert!(
        peak.load(Ordering::SeqCst) <= 5,
        "peak concurrency {} exceeded the pool bound",
        peak.load(Ordering::SeqCst)
    );
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Test 3: Relay-Level Parallel Execution
// =============================================================================

/// Backend that fails for one specific prompt marker and succeeds otherwise
struct SelectiveBackend;

#[async_trait]
impl InferenceBackend for SelectiveBackend {
    fn name(&self) -> &str {
        "selective"
    }

    async fn invoke(
        &self,
        target: &InvokeTarget,
        payload: &RequestPayload,
    ) -> Result<InvokeSuccess, ProviderError> {
        let text = serde_json::to_string(&payload.messages).unwrap_or_default();
        if text.contains("poison") {
            return Err(ProviderError::new(
                ProviderErrorKind::AccessDenied,
                "access denied",
            ));
        }
        Ok(InvokeSuccess {
            content: format!("served by {}", target.resolved_id),
            stop_reason: None,
            usage: None,
            duration_ms: 1,
        })
    }
}

/// End-to-end: a batch through `Relay::converse_parallel` where some
/// requests exhaust every candidate still completes with full attempt
/// histories on the failures.
#[tokio::test]
async fn test_relay_parallel_mixed_batch() {
    let config = RelayConfig {
        models: vec!["sonnet".to_string()],
        regions: vec!["us-east-1".to_string()],
        fetch_enabled: false,
        cache: llm_relay::CacheConfig {
            mode: llm_relay::CacheMode::None,
            max_age_hours: 1.0,
            file_path: None,
        },
        ..RelayConfig::default()
    };
    let relay = Relay::with_backend(config, Arc::new(SelectiveBackend), None).unwrap();

    let assignments: Vec<RegionAssignment> = (0..8)
        .map(|i| {
            let prompt = if i % 4 == 0 { "poison" } else { "fine" };
            RegionAssignment::with_id(
                format!("req-{i}"),
                ConverseRequest::new(
                    vec!["sonnet".to_string()],
                    vec!["us-east-1".to_string()],
                    RequestPayload::new().with_message(Message::user_text(prompt)),
                ),
            )
        })
        .collect();

    let responses = relay.converse_parallel(assignments).await;
    assert_eq!(responses.len(), 8);

    for (id, response) in &responses {
        if index_of(id) % 4 == 0 {
            assert!(!response.success);
            // The synthesized failure still carries the attempt history
            assert!(!response.attempts.is_empty(), "{id} lost its history");
            assert!(response.attempts.iter().all(|a| !a.success));
        } else {
            assert!(response.success, "{id} should have succeeded");
        }
    }
}

// =============================================================================
// Test 4: Empty Batch
// =============================================================================

/// An empty batch returns an empty mapping without hanging.
#[tokio::test]
async fn test_empty_batch() {
    let executor = ParallelExecutor::new(ExecutorConfig::default());
    let responses = executor
        .execute(Vec::new(), |request: ConverseRequest| async move {
            Ok(ok_response(&request))
        })
        .await;
    assert!(responses.is_empty());
}
