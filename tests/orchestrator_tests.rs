//! Integration tests for retry/failover orchestration
//!
//! These tests drive whole logical requests through the real catalog
//! (bundled snapshot), tracker, and orchestrator against a scripted
//! gateway, verifying:
//! - Cross-region and cross-model failover
//! - Request adaptation (parameter stripping, feature fallback, profile
//!   redirect) composing in one request
//! - Attempt-history integrity on success and exhaustion
//! - Preference learning carrying across requests

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use llm_relay::{
    AccessMethod, AccessMethodTracker, ConverseRequest, InferenceBackend, InvokeSuccess,
    InvokeTarget, Message, ModelCatalog, ProviderError, ProviderErrorKind, RequestPayload,
    RetryOrchestrator, RetryPolicy,
};

// =============================================================================
// Scripted Gateway Infrastructure
// =============================================================================

/// Backend with per-target scripted outcomes.
///
/// Each resolved id owns a queue of outcomes; once the queue drains (or if
/// no queue was registered) the target succeeds. Every call is logged.
#[derive(Default)]
struct ScriptedGateway {
    outcomes: Mutex<HashMap<String, VecDeque<Result<(), ProviderError>>>>,
    log: Mutex<Vec<(String, String)>>,
}

impl ScriptedGateway {
    fn new() -> Self {
        Self::default()
    }

    fn script(&self, resolved_id: &str, outcomes: Vec<Result<(), ProviderError>>) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(resolved_id.to_string(), outcomes.into());
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted-gateway"
    }

    async fn invoke(
        &self,
        target: &InvokeTarget,
        _payload: &RequestPayload,
    ) -> Result<InvokeSuccess, ProviderError> {
        self.log
            .lock()
            .unwrap()
            .push((target.resolved_id.clone(), target.region.clone()));

        let next = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(&target.resolved_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()));

        next.map(|()| InvokeSuccess {
            content: format!("response from {}", target.resolved_id),
            stop_reason: Some("end_turn".to_string()),
            usage: None,
            duration_ms: 1,
        })
    }
}

fn harness(
    backend: Arc<ScriptedGateway>,
    policy: RetryPolicy,
) -> (RetryOrchestrator, AccessMethodTracker) {
    let catalog = Arc::new(ModelCatalog::with_snapshot(
        llm_relay::catalog::bundled::bundled_snapshot(),
    ));
    let tracker = AccessMethodTracker::new();
    let orchestrator = RetryOrchestrator::new(catalog, tracker.clone(), backend, policy);
    (orchestrator, tracker)
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay_ms: 1,
        backoff_multiplier: 1.0,
        max_delay_ms: 2,
        enable_feature_fallback: true,
    }
}

fn request(models: &[&str], regions: &[&str]) -> ConverseRequest {
    ConverseRequest::new(
        models.iter().map(ToString::to_string).collect(),
        regions.iter().map(ToString::to_string).collect(),
        RequestPayload::new().with_message(Message::user_text("hello")),
    )
}

fn denied() -> ProviderError {
    ProviderError::new(ProviderErrorKind::AccessDenied, "access denied")
}

// Direct and regional-profile ids for "Claude 3.5 Sonnet" from the bundled
// tables, used throughout these scenarios.
const SONNET_DIRECT: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";
const SONNET_US_PROFILE: &str = "us.anthropic.claude-3-5-sonnet-20240620-v1:0";

// =============================================================================
// Test 1: Cross-Region Failover
// =============================================================================

/// A model whose us-east-1 access is denied on every method fails over to
/// the next region and succeeds there, with the full history preserved.
#[tokio::test]
async fn test_cross_region_failover() {
    let backend = Arc::new(ScriptedGateway::new());
    // Both us-east-1 paths for Claude 3.5 Sonnet are denied; the direct id
    // is shared across regions, so its queue holds exactly one failure and
    // the eu-central-1 call that follows drains to success.
    backend.script(SONNET_DIRECT, vec![Err(denied())]);
    backend.script(SONNET_US_PROFILE, vec![Err(denied())]);
    let (orchestrator, _) = harness(Arc::clone(&backend), quick_policy());

    let response = orchestrator
        .execute(request(&["Claude 3.5 Sonnet"], &["us-east-1", "eu-central-1"]))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.region.as_deref(), Some("eu-central-1"));
    // History shows the us-east-1 attempts before the winner
    assert_eq!(response.attempts.len(), 3);
    assert!(response.attempts.iter().take(2).all(|a| a.region == "us-east-1"));
    assert!(response.attempts.last().unwrap().success);
}

// =============================================================================
// Test 2: Cross-Model Failover
// =============================================================================

/// When every candidate of the first model fails, the second configured
/// model serves the request.
#[tokio::test]
async fn test_cross_model_failover() {
    let backend = Arc::new(ScriptedGateway::new());
    backend.script(
        "mistral.mistral-large-2402-v1:0",
        vec![Err(denied()), Err(denied())],
    );
    let (orchestrator, _) = harness(Arc::clone(&backend), quick_policy());

    let response = orchestrator
        .execute(request(
            &["Mistral Large 2402", "Nova Micro"],
            &["us-east-1"],
        ))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.model_id.as_deref(), Some("amazon.nova-micro-v1:0"));
}

// =============================================================================
// Test 3: Composed Adaptation
// =============================================================================

/// One candidate survives a parameter rejection followed by a content
/// feature rejection; both adaptations are reported on the response.
#[tokio::test]
async fn test_parameter_then_feature_adaptation() {
    use llm_relay::{ContentBlock, ImageFormat, MessageRole};

    let backend = Arc::new(ScriptedGateway::new());
    backend.script(
        SONNET_DIRECT,
        vec![
            Err(ProviderError::new(
                ProviderErrorKind::Validation,
                "Malformed input request: extraneous key [reasoning_budget] is not permitted",
            )),
            Err(ProviderError::new(
                ProviderErrorKind::Validation,
                "This model does not support image content blocks",
            )),
        ],
    );
    let (orchestrator, _) = harness(Arc::clone(&backend), quick_policy());

    let mut req = request(&["Claude 3.5 Sonnet"], &["us-east-1"]);
    req.payload = RequestPayload::new()
        .with_message(Message {
            role: MessageRole::User,
            blocks: vec![
                ContentBlock::Text("what is in this image".to_string()),
                ContentBlock::Image {
                    format: ImageFormat::Jpeg,
                    data: "aGVsbG8=".to_string(),
                },
            ],
        })
        .with_extended_param("reasoning_budget", serde_json::json!(2048));

    let response = orchestrator.execute(req).await.unwrap();

    assert!(response.success);
    assert_eq!(response.attempts.len(), 3);
    assert_eq!(
        response.adaptation.removed_params,
        vec!["reasoning_budget".to_string()]
    );
    assert_eq!(
        response.adaptation.disabled_features,
        vec!["image".to_string()]
    );
    // Before/after parameter visibility
    assert!(response
        .adaptation
        .params_before
        .as_ref()
        .unwrap()
        .contains_key("reasoning_budget"));
    assert!(response
        .adaptation
        .params_after
        .as_ref()
        .unwrap()
        .is_empty());
}

// =============================================================================
// Test 4: Preference Learning Across Requests
// =============================================================================

/// A profile-required redirect on the first request teaches the tracker;
/// the second request goes straight to the profile with a single call.
#[tokio::test]
async fn test_preference_learned_across_requests() {
    let backend = Arc::new(ScriptedGateway::new());
    backend.script(
        SONNET_DIRECT,
        vec![Err(ProviderError::new(
            ProviderErrorKind::Validation,
            format!(
                "Invocation of model ID {SONNET_DIRECT} with on-demand throughput isn't \
                 supported. Retry your request with the ID or ARN of an inference profile."
            ),
        ))],
    );
    let (orchestrator, tracker) = harness(Arc::clone(&backend), quick_policy());

    // First request: direct fails, profile redirect succeeds
    let first = orchestrator
        .execute(request(&["Claude 3.5 Sonnet"], &["us-east-1"]))
        .await
        .unwrap();
    assert_eq!(first.access_method, Some(AccessMethod::RegionalProfile));
    assert_eq!(
        tracker.get_preferred(SONNET_DIRECT, "us-east-1"),
        Some(AccessMethod::RegionalProfile)
    );

    // Second request: the learned profile candidate is attempted first
    let calls_before = backend.calls().len();
    let second = orchestrator
        .execute(request(&["Claude 3.5 Sonnet"], &["us-east-1"]))
        .await
        .unwrap();
    assert!(second.success);
    let calls = backend.calls();
    assert_eq!(calls.len(), calls_before + 1);
    assert_eq!(calls.last().unwrap().0, SONNET_US_PROFILE);
}

// =============================================================================
// Test 5: Exhaustion History Integrity
// =============================================================================

/// When everything fails, the terminal error carries every attempt in
/// order with sequential numbering and matching error text.
#[tokio::test]
async fn test_exhaustion_history_integrity() {
    let backend = Arc::new(ScriptedGateway::new());
    backend.script(SONNET_DIRECT, vec![Err(denied()); 4]);
    backend.script(SONNET_US_PROFILE, vec![Err(denied()); 4]);
    let (orchestrator, _) = harness(Arc::clone(&backend), quick_policy());

    let err = orchestrator
        .execute(request(&["Claude 3.5 Sonnet"], &["us-east-1"]))
        .await
        .unwrap_err();

    assert_eq!(err.candidates_tried, 2);
    assert_eq!(err.attempts.len(), 2);
    for (index, attempt) in err.attempts.iter().enumerate() {
        assert_eq!(attempt.attempt_number, index as u32 + 1);
        assert!(!attempt.success);
        assert!(attempt.error.as_ref().unwrap().contains("access denied"));
        assert!(attempt.ended_at.is_some());
        assert!(attempt.ended_at.unwrap() >= attempt.started_at);
    }
}

// =============================================================================
// Test 6: Transient Budget Is Global
// =============================================================================

/// The transient retry budget spans candidates: once it is spent on the
/// first candidate, later candidates are not granted a fresh budget.
#[tokio::test]
async fn test_transient_budget_is_global() {
    let throttle =
        || ProviderError::new(ProviderErrorKind::Throttling, "Too many requests, slow down");

    let backend = Arc::new(ScriptedGateway::new());
    backend.script(SONNET_DIRECT, vec![Err(throttle()); 8]);
    backend.script(SONNET_US_PROFILE, vec![Err(throttle()); 8]);

    let policy = RetryPolicy {
        max_retries: 2,
        base_delay_ms: 1,
        backoff_multiplier: 1.0,
        max_delay_ms: 2,
        enable_feature_fallback: true,
    };
    let (orchestrator, _) = harness(Arc::clone(&backend), policy);

    let err = orchestrator
        .execute(request(&["Claude 3.5 Sonnet"], &["us-east-1"]))
        .await
        .unwrap_err();

    // Candidate 1: initial attempt + 2 budgeted retries = 3 attempts.
    // Candidate 2: budget empty, single attempt.
    assert_eq!(err.attempts.len(), 4);
    assert_eq!(err.candidates_tried, 2);
}
