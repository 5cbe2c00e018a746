//! Retry Orchestration Types
//!
//! The value objects that flow through a single logical request: the
//! candidates tried, the per-attempt records, and the final response with
//! its adaptation metadata. Attempt records are append-only and the full
//! ordered list rides on every outcome, success or failure, so callers can
//! always see which model/region/method combinations were tried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::traits::{InvokeSuccess, InvokeTarget, RequestPayload};
use crate::catalog::types::AccessMethod;

// ============================================================================
// Logical Request
// ============================================================================

/// One logical conversation request.
///
/// `models` and `regions` are ordered: earlier entries are preferred. The
/// orchestrator expands them into candidates (model × region × access
/// method) and works through the list.
#[derive(Clone, Debug)]
pub struct ConverseRequest {
    /// Unique id for correlation across attempts and logs
    pub request_id: Uuid,
    /// Model names to try, in order (resolved through the catalog)
    pub models: Vec<String>,
    /// Regions to try, in order
    pub regions: Vec<String>,
    /// The fully-built payload
    pub payload: RequestPayload,
}

impl ConverseRequest {
    /// Create a request with a fresh id
    #[must_use]
    pub fn new(models: Vec<String>, regions: Vec<String>, payload: RequestPayload) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            models,
            regions,
            payload,
        }
    }
}

// ============================================================================
// Candidates
// ============================================================================

/// One attemptable (model, region, access method) combination
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Canonical model name
    pub model_name: String,
    /// Provider model id
    pub model_id: String,
    /// Region to invoke in
    pub region: String,
    /// Access method this candidate uses
    pub access_method: AccessMethod,
    /// The id actually sent to the backend (model id or profile id)
    pub resolved_id: String,
}

impl Candidate {
    /// The invocation target for the backend
    #[must_use]
    pub fn target(&self) -> InvokeTarget {
        InvokeTarget {
            resolved_id: self.resolved_id.clone(),
            region: self.region.clone(),
        }
    }
}

// ============================================================================
// Attempt Records
// ============================================================================

/// Record of one invocation attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Model id of the candidate
    pub model_id: String,
    /// Region of the candidate
    pub region: String,
    /// Access method used
    pub access_method: AccessMethod,
    /// 1-based attempt number across the whole request
    pub attempt_number: u32,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// When the attempt finished (absent if it was abandoned)
    pub ended_at: Option<DateTime<Utc>>,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Provider error text for failed attempts
    pub error: Option<String>,
}

// ============================================================================
// Adaptation Metadata
// ============================================================================

/// What the orchestrator changed about the payload to get a response through
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptationReport {
    /// Extended-parameter fields stripped after provider rejections
    pub removed_params: Vec<String>,
    /// Extended params as originally submitted (set when anything was removed)
    pub params_before: Option<serde_json::Map<String, serde_json::Value>>,
    /// Extended params actually sent on the successful attempt
    pub params_after: Option<serde_json::Map<String, serde_json::Value>>,
    /// Content features disabled after provider rejections
    pub disabled_features: Vec<String>,
}

impl AdaptationReport {
    /// Whether any adaptation happened
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed_params.is_empty() && self.disabled_features.is_empty()
    }
}

// ============================================================================
// Response
// ============================================================================

/// The outcome of one logical request.
///
/// Successful responses carry the provider output plus the candidate that
/// won; synthesized failures (timeouts, reconciliation gaps) carry warnings
/// instead. Either way the complete attempt history is attached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConverseResponse {
    /// Id of the logical request
    pub request_id: Uuid,
    /// Whether the request produced provider output
    pub success: bool,
    /// Provider output, present on success
    pub output: Option<InvokeSuccess>,
    /// Model id that served the request, present on success
    pub model_id: Option<String>,
    /// Region that served the request, present on success
    pub region: Option<String>,
    /// Access method that served the request, present on success
    pub access_method: Option<AccessMethod>,
    /// Profile id used, when the access method was profile-based
    pub profile_id: Option<String>,
    /// Every attempt made, in order
    pub attempts: Vec<AttemptRecord>,
    /// Payload adaptations applied along the way
    pub adaptation: AdaptationReport,
    /// Human-readable warnings (timeouts, reconciliation, legacy names)
    pub warnings: Vec<String>,
}

impl ConverseResponse {
    /// Build a synthesized failure carrying a warning and no output
    #[must_use]
    pub fn synthesized_failure(
        request_id: Uuid,
        attempts: Vec<AttemptRecord>,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            success: false,
            output: None,
            model_id: None,
            region: None,
            access_method: None,
            profile_id: None,
            attempts,
            adaptation: AdaptationReport::default(),
            warnings: vec![warning.into()],
        }
    }

    /// Text content of the output, if any
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.output.as_ref().map(|o| o.content.as_str())
    }
}

// ============================================================================
// Terminal Error
// ============================================================================

/// Every candidate was exhausted without a successful response
#[derive(Clone, Debug, Error)]
#[error("retries exhausted after {} attempts across {candidates_tried} candidates", .attempts.len())]
pub struct RetryExhaustedError {
    /// Id of the logical request
    pub request_id: Uuid,
    /// Number of distinct candidates tried
    pub candidates_tried: usize,
    /// Complete attempt history across all candidates
    pub attempts: Vec<AttemptRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_target() {
        let candidate = Candidate {
            model_name: "Test Model".to_string(),
            model_id: "acme.test-v1:0".to_string(),
            region: "us-east-1".to_string(),
            access_method: AccessMethod::RegionalProfile,
            resolved_id: "us.acme.test-v1:0".to_string(),
        };
        let target = candidate.target();
        assert_eq!(target.resolved_id, "us.acme.test-v1:0");
        assert_eq!(target.region, "us-east-1");
    }

    #[test]
    fn test_synthesized_failure_shape() {
        let id = Uuid::new_v4();
        let response = ConverseResponse::synthesized_failure(id, Vec::new(), "timed out");

        assert!(!response.success);
        assert!(response.output.is_none());
        assert_eq!(response.warnings, vec!["timed out".to_string()]);
        assert!(response.adaptation.is_empty());
    }

    #[test]
    fn test_exhausted_error_display() {
        let err = RetryExhaustedError {
            request_id: Uuid::new_v4(),
            candidates_tried: 3,
            attempts: Vec::new(),
        };
        assert!(err.to_string().contains("3 candidates"));
    }
}
