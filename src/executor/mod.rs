//! Parallel Request Execution
//!
//! Runs many independent logical requests concurrently through an injected
//! single-request function (normally a [`crate::retry::RetryOrchestrator`]
//! run) under a bounded worker pool.
//!
//! # Guarantees
//!
//! - At most `max_concurrent_requests` requests are in flight at once.
//! - Every submitted assignment gets exactly one response: timeouts and
//!   internal failures are converted into synthesized failed responses,
//!   never propagated as exceptions, and a final reconciliation pass fills
//!   any gap with an explanatory failure.
//! - No ordering is guaranteed between requests.
//!
//! # Cancellation is best-effort
//!
//! A request that exceeds its timeout is *abandoned*: the worker task is
//! aborted, but an already in-flight remote call may still complete on the
//! provider side. The late result is discarded with the task — it is never
//! delivered to the caller or merged into shared state.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::retry::types::{ConverseRequest, ConverseResponse, RetryExhaustedError};

// ============================================================================
// Configuration
// ============================================================================

/// Executor pool settings
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Worker pool size
    pub max_concurrent_requests: usize,
    /// Per-request timeout
    pub request_timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 4,
            request_timeout_seconds: 120,
        }
    }
}

// ============================================================================
// Assignments
// ============================================================================

/// One logical request submitted for parallel execution.
///
/// The request's `regions` field carries the ordered region assignment;
/// `assignment_id` keys the response in the output mapping and must be
/// unique within one `execute` call.
#[derive(Clone, Debug)]
pub struct RegionAssignment {
    /// Unique key for this assignment
    pub assignment_id: String,
    /// The logical request to run
    pub request: ConverseRequest,
}

impl RegionAssignment {
    /// Create an assignment with a generated id
    #[must_use]
    pub fn new(request: ConverseRequest) -> Self {
        Self {
            assignment_id: Uuid::new_v4().to_string(),
            request,
        }
    }

    /// Create an assignment with an explicit id
    pub fn with_id(assignment_id: impl Into<String>, request: ConverseRequest) -> Self {
        Self {
            assignment_id: assignment_id.into(),
            request,
        }
    }
}

// ============================================================================
// Execution Context
// ============================================================================

/// Progress counters, readable while a batch runs.
///
/// All fields sit behind one coarse lock and are metrics only: nothing in
/// the control flow depends on them.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    inner: Mutex<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    active: HashSet<String>,
    completed: HashSet<String>,
    failed: HashSet<String>,
    region_load: HashMap<String, usize>,
    started_at: Option<Instant>,
}

/// Point-in-time progress snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionProgress {
    /// Assignments currently in flight
    pub active: usize,
    /// Assignments that produced a successful response
    pub completed: usize,
    /// Assignments that produced a failed response
    pub failed: usize,
    /// Requests started per first-choice region
    pub region_load: HashMap<String, usize>,
    /// Time since the batch started
    pub elapsed: Option<Duration>,
}

impl ExecutionContext {
    fn batch_started(&self) {
        let mut inner = self.inner.lock();
        inner.started_at = Some(Instant::now());
    }

    fn request_started(&self, id: &str, first_region: Option<&str>) {
        let mut inner = self.inner.lock();
        inner.active.insert(id.to_string());
        if let Some(region) = first_region {
            *inner.region_load.entry(region.to_string()).or_insert(0) += 1;
        }
    }

    fn request_finished(&self, id: &str, success: bool) {
        let mut inner = self.inner.lock();
        inner.active.remove(id);
        if success {
            inner.completed.insert(id.to_string());
        } else {
            inner.failed.insert(id.to_string());
        }
    }

    /// Snapshot the current progress
    #[must_use]
    pub fn progress(&self) -> ExecutionProgress {
        let inner = self.inner.lock();
        ExecutionProgress {
            active: inner.active.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
            region_load: inner.region_load.clone(),
            elapsed: inner.started_at.map(|s| s.elapsed()),
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Bounded-concurrency executor over logical requests
pub struct ParallelExecutor {
    config: ExecutorConfig,
    context: Arc<ExecutionContext>,
}

impl ParallelExecutor {
    /// Create an executor with the given pool settings
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            context: Arc::new(ExecutionContext::default()),
        }
    }

    /// Progress counters for the current (or last) batch
    #[must_use]
    pub fn context(&self) -> Arc<ExecutionContext> {
        Arc::clone(&self.context)
    }

    /// Run every assignment through `run_one` and return one response per
    /// assignment, keyed by `assignment_id`.
    ///
    /// `run_one` is the injected single-request execution function; its
    /// error becomes a failed response carrying the attempt history.
    /// Postcondition: the mapping has exactly one entry per submitted
    /// assignment — no omissions, no duplicates.
    pub async fn execute<F, Fut>(
        &self,
        assignments: Vec<RegionAssignment>,
        run_one: F,
    ) -> HashMap<String, ConverseResponse>
    where
        F: Fn(ConverseRequest) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<ConverseResponse, RetryExhaustedError>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests.max(1)));
        let timeout = Duration::from_secs(self.config.request_timeout_seconds);
        self.context.batch_started();

        tracing::info!(
            assignments = assignments.len(),
            workers = self.config.max_concurrent_requests,
            timeout_secs = self.config.request_timeout_seconds,
            "parallel execution started"
        );

        let mut tasks: JoinSet<(String, ConverseResponse)> = JoinSet::new();
        let mut submitted: Vec<(String, Uuid)> = Vec::new();

        for assignment in assignments {
            if submitted.iter().any(|(id, _)| *id == assignment.assignment_id) {
                tracing::warn!(
                    assignment_id = %assignment.assignment_id,
                    "duplicate assignment id, keeping the first"
                );
                continue;
            }
            submitted.push((assignment.assignment_id.clone(), assignment.request.request_id));

            let semaphore = Arc::clone(&semaphore);
            let context = Arc::clone(&self.context);
            let run_one = run_one.clone();
            tasks.spawn(async move {
                // Closed only if the semaphore is dropped, which we never do
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    let response = ConverseResponse::synthesized_failure(
                        assignment.request.request_id,
                        Vec::new(),
                        "worker pool shut down before execution",
                    );
                    return (assignment.assignment_id, response);
                };

                let id = assignment.assignment_id;
                let request_id = assignment.request.request_id;
                context.request_started(&id, assignment.request.regions.first().map(String::as_str));

                let mut work = tokio::spawn(run_one(assignment.request));
                let response = match tokio::time::timeout(timeout, &mut work).await {
                    Ok(Ok(Ok(response))) => response,
                    Ok(Ok(Err(exhausted))) => {
                        let warning = format!("request failed: {exhausted}");
                        ConverseResponse::synthesized_failure(
                            exhausted.request_id,
                            exhausted.attempts,
                            warning,
                        )
                    }
                    Ok(Err(join_error)) => ConverseResponse::synthesized_failure(
                        request_id,
                        Vec::new(),
                        format!("request task failed: {join_error}"),
                    ),
                    Err(_elapsed) => {
                        // Best-effort abandonment: the remote call may still
                        // complete server-side; its result is discarded.
                        work.abort();
                        tracing::warn!(assignment_id = %id, "request timed out, abandoning");
                        ConverseResponse::synthesized_failure(
                            request_id,
                            Vec::new(),
                            format!(
                                "request timed out after {}s and was abandoned",
                                timeout.as_secs()
                            ),
                        )
                    }
                };

                context.request_finished(&id, response.success);
                (id, response)
            });
        }

        let mut responses: HashMap<String, ConverseResponse> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, response)) => {
                    responses.insert(id, response);
                }
                Err(join_error) => {
                    // The worker itself died; reconciliation below fills the gap
                    tracing::warn!(error = %join_error, "executor worker panicked");
                }
            }
        }

        // Reconciliation: exactly one response per submitted assignment
        for (assignment_id, request_id) in &submitted {
            if !responses.contains_key(assignment_id) {
                tracing::warn!(
                    assignment_id = %assignment_id,
                    "no response computed for assignment, synthesizing failure"
                );
                responses.insert(
                    assignment_id.clone(),
                    ConverseResponse::synthesized_failure(
                        *request_id,
                        Vec::new(),
                        "no response was computed for this assignment",
                    ),
                );
            }
        }

        let progress = self.context.progress();
        tracing::info!(
            completed = progress.completed,
            failed = progress.failed,
            "parallel execution finished"
        );

        responses
    }
}
