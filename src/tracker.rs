//! Access Method Tracker
//!
//! Learned preferences for how to reach a `(model, region)` pair. When a
//! request succeeds through some access method, the tracker remembers it so
//! later candidate lists try that method first. This is a bias, never a
//! gate: a pair with no recorded preference executes exactly as before.
//!
//! The tracker is an explicitly constructed, cheaply cloneable handle —
//! inject it wherever it's needed and call [`AccessMethodTracker::reset`]
//! for test isolation. All state sits behind one coarse lock; every
//! operation is an O(1) map access.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::catalog::types::AccessMethod;

/// Learned state for one `(model_id, region)` pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPreference {
    /// Method that last succeeded, if any has
    pub preferred: Option<AccessMethod>,
    /// Successful invocations recorded
    pub successes: u64,
    /// Failed invocations recorded
    pub failures: u64,
    /// Last time this pair was updated
    pub updated_at: DateTime<Utc>,
}

impl AccessPreference {
    fn empty() -> Self {
        Self {
            preferred: None,
            successes: 0,
            failures: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Aggregate tracker statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerStatistics {
    /// Number of `(model, region)` pairs with recorded state
    pub total_tracked: usize,
    /// Pairs that currently carry a preferred method
    pub with_preference: usize,
    /// Total successes across all pairs
    pub total_successes: u64,
    /// Total failures across all pairs
    pub total_failures: u64,
}

/// Process-lifetime store of learned access preferences
#[derive(Clone, Debug, Default)]
pub struct AccessMethodTracker {
    inner: Arc<Mutex<HashMap<(String, String), AccessPreference>>>,
}

impl AccessMethodTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful invocation; `method` becomes the preference
    pub fn record_success(&self, model_id: &str, region: &str, method: AccessMethod) {
        let mut map = self.inner.lock();
        let entry = map
            .entry((model_id.to_string(), region.to_string()))
            .or_insert_with(AccessPreference::empty);
        entry.preferred = Some(method);
        entry.successes = entry.successes.saturating_add(1);
        entry.updated_at = Utc::now();
        tracing::debug!(model_id, region, method = %method, "access method preference recorded");
    }

    /// Record a failed invocation.
    ///
    /// Counters update; the remembered preference only drops when the
    /// failing method *is* the preference (it just stopped working).
    pub fn record_failure(&self, model_id: &str, region: &str, method: AccessMethod) {
        let mut map = self.inner.lock();
        let entry = map
            .entry((model_id.to_string(), region.to_string()))
            .or_insert_with(AccessPreference::empty);
        entry.failures = entry.failures.saturating_add(1);
        if entry.preferred == Some(method) {
            entry.preferred = None;
        }
        entry.updated_at = Utc::now();
    }

    /// The preferred method for a pair, if one has been learned
    #[must_use]
    pub fn get_preferred(&self, model_id: &str, region: &str) -> Option<AccessMethod> {
        self.inner
            .lock()
            .get(&(model_id.to_string(), region.to_string()))
            .and_then(|p| p.preferred)
    }

    /// Full recorded state for a pair
    #[must_use]
    pub fn get_preference(&self, model_id: &str, region: &str) -> Option<AccessPreference> {
        self.inner
            .lock()
            .get(&(model_id.to_string(), region.to_string()))
            .cloned()
    }

    /// Aggregate statistics
    #[must_use]
    pub fn get_statistics(&self) -> TrackerStatistics {
        let map = self.inner.lock();
        TrackerStatistics {
            total_tracked: map.len(),
            with_preference: map.values().filter(|p| p.preferred.is_some()).count(),
            total_successes: map.values().map(|p| p.successes).sum(),
            total_failures: map.values().map(|p| p.failures).sum(),
        }
    }

    /// Drop all learned state (test isolation; not a normal operational path)
    pub fn reset(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker_has_no_preference() {
        let tracker = AccessMethodTracker::new();
        assert!(tracker.get_preferred("m", "us-east-1").is_none());
        assert_eq!(tracker.get_statistics(), TrackerStatistics::default());
    }

    #[test]
    fn test_success_sets_preference() {
        let tracker = AccessMethodTracker::new();
        tracker.record_success("m", "us-east-1", AccessMethod::RegionalProfile);

        assert_eq!(
            tracker.get_preferred("m", "us-east-1"),
            Some(AccessMethod::RegionalProfile)
        );
        // A different region is untouched
        assert!(tracker.get_preferred("m", "eu-west-1").is_none());
    }

    #[test]
    fn test_latest_success_wins() {
        let tracker = AccessMethodTracker::new();
        tracker.record_success("m", "us-east-1", AccessMethod::Direct);
        tracker.record_success("m", "us-east-1", AccessMethod::GlobalProfile);

        assert_eq!(
            tracker.get_preferred("m", "us-east-1"),
            Some(AccessMethod::GlobalProfile)
        );
        let pref = tracker.get_preference("m", "us-east-1").unwrap();
        assert_eq!(pref.successes, 2);
    }

    #[test]
    fn test_failure_of_preferred_method_drops_preference() {
        let tracker = AccessMethodTracker::new();
        tracker.record_success("m", "us-east-1", AccessMethod::Direct);
        tracker.record_failure("m", "us-east-1", AccessMethod::Direct);

        assert!(tracker.get_preferred("m", "us-east-1").is_none());
        let pref = tracker.get_preference("m", "us-east-1").unwrap();
        assert_eq!(pref.failures, 1);
    }

    #[test]
    fn test_failure_of_other_method_keeps_preference() {
        let tracker = AccessMethodTracker::new();
        tracker.record_success("m", "us-east-1", AccessMethod::Direct);
        tracker.record_failure("m", "us-east-1", AccessMethod::GlobalProfile);

        assert_eq!(
            tracker.get_preferred("m", "us-east-1"),
            Some(AccessMethod::Direct)
        );
    }

    #[test]
    fn test_statistics_aggregate() {
        let tracker = AccessMethodTracker::new();
        tracker.record_success("a", "us-east-1", AccessMethod::Direct);
        tracker.record_success("b", "us-east-1", AccessMethod::Direct);
        tracker.record_failure("b", "eu-west-1", AccessMethod::Direct);

        let stats = tracker.get_statistics();
        assert_eq!(stats.total_tracked, 3);
        assert_eq!(stats.with_preference, 2);
        assert_eq!(stats.total_successes, 2);
        assert_eq!(stats.total_failures, 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let tracker = AccessMethodTracker::new();
        tracker.record_success("m", "us-east-1", AccessMethod::Direct);

        tracker.reset();
        assert!(tracker.get_preferred("m", "us-east-1").is_none());
        assert_eq!(tracker.get_statistics().total_tracked, 0);
    }

    #[test]
    fn test_clones_share_state() {
        let tracker = AccessMethodTracker::new();
        let clone = tracker.clone();
        clone.record_success("m", "us-east-1", AccessMethod::Direct);

        assert_eq!(
            tracker.get_preferred("m", "us-east-1"),
            Some(AccessMethod::Direct)
        );
    }
}
