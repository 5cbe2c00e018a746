//! Retry & Failover Orchestration
//!
//! Drives one logical request through an ordered list of candidates,
//! classifying each failure and reacting to it:
//!
//! ```text
//! GENERATING ──> ATTEMPTING ──┬──> SUCCESS   (record preference, return)
//!     ^              │        ├──> ADAPTING  (strip param / disable
//!     │              │        │               feature / switch to profile,
//!     │              │        │               retry same candidate)
//!     │              │        └──> ADVANCING (next candidate)
//!     │              └─ transient: backoff, retry same candidate
//!     └── no candidates left ────> EXHAUSTED (terminal error)
//! ```
//!
//! Candidate order is the cartesian product of models × regions × access
//! methods (declaration order, with access methods in direct → regional →
//! global preference), reordered so that tracker-preferred combinations
//! are attempted first.
//!
//! # Budgets
//!
//! Transient retries consume a global retry budget (`max_retries` across
//! the whole request). Adaptation retries don't touch that budget, but
//! *every* attempt counts against a hard per-candidate cap of
//! `max_retries + 1`, so no candidate can loop forever.

pub mod classify;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::backend::traits::InferenceBackend;
use crate::catalog::types::AccessMethod;
use crate::catalog::ModelCatalog;
use crate::tracker::AccessMethodTracker;

use self::classify::{classify, ErrorClass};
use self::types::{
    AdaptationReport, AttemptRecord, Candidate, ConverseRequest, ConverseResponse,
    RetryExhaustedError,
};

// ============================================================================
// Retry Policy
// ============================================================================

/// Retry and adaptation settings for one orchestrator
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Global transient-retry budget per logical request
    pub max_retries: u32,
    /// Initial backoff delay
    pub base_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Backoff cap
    pub max_delay_ms: u64,
    /// Whether content-feature fallback (disable and retry) is allowed
    pub enable_feature_fallback: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            enable_feature_fallback: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying attempt N (0-indexed):
    /// `min(max_delay, base_delay * multiplier^N)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(raw.min(self.max_delay_ms as f64) as u64)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Per-request failover driver
pub struct RetryOrchestrator {
    catalog: Arc<ModelCatalog>,
    tracker: AccessMethodTracker,
    backend: Arc<dyn InferenceBackend>,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    /// Create an orchestrator over a catalog, tracker, and backend
    #[must_use]
    pub fn new(
        catalog: Arc<ModelCatalog>,
        tracker: AccessMethodTracker,
        backend: Arc<dyn InferenceBackend>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            catalog,
            tracker,
            backend,
            policy,
        }
    }

    /// Run one logical request to completion.
    ///
    /// # Errors
    ///
    /// Returns [`RetryExhaustedError`] with the complete attempt history
    /// when every candidate fails.
    pub async fn execute(
        &self,
        request: ConverseRequest,
    ) -> Result<ConverseResponse, RetryExhaustedError> {
        let mut warnings = Vec::new();
        let candidates = self.generate_candidates(&request, &mut warnings);
        tracing::debug!(
            request_id = %request.request_id,
            candidates = candidates.len(),
            "candidate list generated"
        );

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut payload = request.payload.clone();
        let params_before = payload.extended_params.clone();
        let mut adaptation = AdaptationReport::default();
        let mut retries_used: u32 = 0;
        let attempt_cap = self.policy.max_retries.saturating_add(1);

        for candidate in &candidates {
            let mut candidate = candidate.clone();
            let mut candidate_attempts: u32 = 0;
            let mut profile_redirected = false;

            'attempt: while candidate_attempts < attempt_cap {
                candidate_attempts += 1;
                let attempt_number = attempts.len() as u32 + 1;
                let started_at = Utc::now();

                tracing::debug!(
                    request_id = %request.request_id,
                    model_id = %candidate.model_id,
                    region = %candidate.region,
                    method = %candidate.access_method,
                    attempt = attempt_number,
                    "attempting candidate"
                );

                let result = self.backend.invoke(&candidate.target(), &payload).await;
                let ended_at = Utc::now();

                match result {
                    Ok(output) => {
                        attempts.push(AttemptRecord {
                            model_id: candidate.model_id.clone(),
                            region: candidate.region.clone(),
                            access_method: candidate.access_method,
                            attempt_number,
                            started_at,
                            ended_at: Some(ended_at),
                            success: true,
                            error: None,
                        });
                        self.tracker.record_success(
                            &candidate.model_id,
                            &candidate.region,
                            candidate.access_method,
                        );
                        if !adaptation.removed_params.is_empty() {
                            adaptation.params_before = Some(params_before);
                            adaptation.params_after = Some(payload.extended_params.clone());
                        }
                        let profile_id = (candidate.access_method != AccessMethod::Direct)
                            .then(|| candidate.resolved_id.clone());
                        return Ok(ConverseResponse {
                            request_id: request.request_id,
                            success: true,
                            output: Some(output),
                            model_id: Some(candidate.model_id.clone()),
                            region: Some(candidate.region.clone()),
                            access_method: Some(candidate.access_method),
                            profile_id,
                            attempts,
                            adaptation,
                            warnings,
                        });
                    }
                    Err(error) => {
                        attempts.push(AttemptRecord {
                            model_id: candidate.model_id.clone(),
                            region: candidate.region.clone(),
                            access_method: candidate.access_method,
                            attempt_number,
                            started_at,
                            ended_at: Some(ended_at),
                            success: false,
                            error: Some(error.to_string()),
                        });

                        let class = classify(&error);
                        tracing::debug!(
                            request_id = %request.request_id,
                            model_id = %candidate.model_id,
                            class = ?class,
                            "attempt failed"
                        );

                        match class {
                            ErrorClass::Transient => {
                                if retries_used < self.policy.max_retries
                                    && candidate_attempts < attempt_cap
                                {
                                    retries_used += 1;
                                    let delay =
                                        self.policy.delay_for_attempt(candidate_attempts - 1);
                                    tracing::debug!(
                                        delay_ms = delay.as_millis() as u64,
                                        "transient failure, backing off"
                                    );
                                    tokio::time::sleep(delay).await;
                                    continue 'attempt;
                                }
                            }
                            ErrorClass::ProfileRequired { model_id } => {
                                if !profile_redirected && candidate_attempts < attempt_cap {
                                    if let Some(redirected) =
                                        self.redirect_to_profile(&candidate, model_id.as_deref())
                                    {
                                        tracing::debug!(
                                            from = %candidate.resolved_id,
                                            to = %redirected.resolved_id,
                                            "switching to profile-based access"
                                        );
                                        candidate = redirected;
                                        profile_redirected = true;
                                        continue 'attempt;
                                    }
                                }
                            }
                            ErrorClass::ParameterIncompatible { field } => {
                                if let Some(field) = field {
                                    if candidate_attempts < attempt_cap
                                        && payload.remove_extended_param(&field).is_some()
                                    {
                                        tracing::info!(
                                            field = %field,
                                            "removed unsupported parameter, retrying"
                                        );
                                        adaptation.removed_params.push(field);
                                        continue 'attempt;
                                    }
                                }
                            }
                            ErrorClass::ContentFeatureIncompatible { feature } => {
                                if let (true, Some(feature)) =
                                    (self.policy.enable_feature_fallback, feature)
                                {
                                    if candidate_attempts < attempt_cap
                                        && payload.disable_feature(feature)
                                    {
                                        tracing::info!(
                                            feature = feature.name(),
                                            "disabled unsupported content feature, retrying"
                                        );
                                        adaptation
                                            .disabled_features
                                            .push(feature.name().to_string());
                                        continue 'attempt;
                                    }
                                }
                            }
                            ErrorClass::Fatal => {}
                        }

                        // ADVANCING: abandon this candidate
                        self.tracker.record_failure(
                            &candidate.model_id,
                            &candidate.region,
                            candidate.access_method,
                        );
                        break 'attempt;
                    }
                }
            }
        }

        tracing::warn!(
            request_id = %request.request_id,
            candidates = candidates.len(),
            attempts = attempts.len(),
            "all candidates exhausted"
        );
        Err(RetryExhaustedError {
            request_id: request.request_id,
            candidates_tried: candidates.len(),
            attempts,
        })
    }

    /// Build the ordered candidate list for a request.
    ///
    /// Unresolvable model names are skipped with a warning rather than
    /// failing the whole request; legacy names add a warning but resolve.
    fn generate_candidates(
        &self,
        request: &ConverseRequest,
        warnings: &mut Vec<String>,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for model_name in &request.models {
            let resolved = match self.catalog.resolve(model_name) {
                Ok(resolved) => resolved,
                Err(err) => {
                    tracing::warn!(model = %model_name, error = %err, "model name skipped");
                    warnings.push(format!("model name {model_name:?} skipped: {err}"));
                    continue;
                }
            };
            if resolved.name_match.legacy_name_found {
                warnings.push(format!(
                    "model name {:?} is a legacy name for {:?}",
                    model_name, resolved.name_match.canonical
                ));
            }

            for region in &request.regions {
                let Some(access) = resolved.descriptor.access_in(region) else {
                    continue;
                };
                for method in access.available_methods() {
                    let Some(resolved_id) = access.resolved_id_for(method) else {
                        continue;
                    };
                    candidates.push(Candidate {
                        model_name: resolved.descriptor.model_name.clone(),
                        model_id: resolved.descriptor.model_id.clone(),
                        region: region.clone(),
                        access_method: method,
                        resolved_id: resolved_id.to_string(),
                    });
                }
            }
        }

        self.reorder_by_preference(candidates)
    }

    /// Hoist tracker-preferred combinations to the front, keeping the
    /// declaration order stable within each group
    fn reorder_by_preference(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let (mut preferred, rest): (Vec<Candidate>, Vec<Candidate>) =
            candidates.into_iter().partition(|c| {
                self.tracker.get_preferred(&c.model_id, &c.region) == Some(c.access_method)
            });
        preferred.extend(rest);
        preferred
    }

    /// Re-resolve a candidate onto its profile-based access method.
    ///
    /// Prefers the regional profile, then the global one; returns `None`
    /// when the candidate is already profile-based or no profile exists.
    fn redirect_to_profile(
        &self,
        candidate: &Candidate,
        reported_model_id: Option<&str>,
    ) -> Option<Candidate> {
        if let Some(reported) = reported_model_id {
            if reported != candidate.model_id && reported != candidate.resolved_id {
                tracing::debug!(
                    reported,
                    candidate_id = %candidate.model_id,
                    "profile error names a different model id"
                );
            }
        }

        let info = self
            .catalog
            .get_model_info(&candidate.model_name, &candidate.region)?;
        for method in [AccessMethod::RegionalProfile, AccessMethod::GlobalProfile] {
            if method == candidate.access_method {
                continue;
            }
            if let Some(profile_id) = info.access.resolved_id_for(method) {
                return Some(Candidate {
                    access_method: method,
                    resolved_id: profile_id.to_string(),
                    ..candidate.clone()
                });
            }
        }
        None
    }
}
