//! Catalog Refresh Pipeline
//!
//! Fans out over the configured regions through a [`ModelSource`], with a
//! bounded worker count and per-call retry on transient source errors.
//! Regions succeed or fail independently; listings from all successful
//! regions are merged into a single snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;

use super::types::{CatalogSnapshot, ModelDescriptor, SnapshotMetadata, SnapshotSource};

// ============================================================================
// Model Source Trait
// ============================================================================

/// Failure listing models from a region
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Worth retrying (throttled, connection reset, briefly unavailable)
    #[error("transient source failure: {0}")]
    Transient(String),

    /// Not worth retrying for this region (auth, unsupported region)
    #[error("source failure: {0}")]
    Fatal(String),
}

/// A remote surface that can list the models available in a region.
///
/// Implemented by the HTTP gateway backend and by test doubles.
#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Source name for logs
    fn name(&self) -> &str;

    /// List the models reachable in `region`
    async fn list_region_models(&self, region: &str) -> Result<Vec<ModelDescriptor>, SourceError>;
}

// ============================================================================
// Fetch Policy
// ============================================================================

/// Retry and concurrency settings for the refresh fan-out
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    /// Retries per region call (attempts = retries + 1)
    pub retries: u32,
    /// Initial backoff delay
    pub base_delay_ms: u64,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Backoff cap
    pub max_delay_ms: u64,
    /// Maximum concurrent region fetches
    pub max_workers: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay_ms: 250,
            multiplier: 2.0,
            max_delay_ms: 5_000,
            max_workers: 4,
        }
    }
}

impl FetchPolicy {
    /// Backoff duration before retry N (0-indexed), capped and jittered
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);
        // Up to 25% jitter so synchronized retries spread out
        let jitter = rand::random::<f64>() * 0.25;
        Duration::from_millis((capped * (1.0 + jitter)) as u64)
    }
}

// ============================================================================
// Refresh
// ============================================================================

/// Remote refresh failed for every queried region
#[derive(Clone, Debug, Error)]
#[error("catalog fetch failed for all {} regions", .per_region.len())]
pub struct CatalogFetchError {
    /// Per-region failure descriptions
    pub per_region: Vec<(String, String)>,
}

/// Result of a successful (possibly partial) refresh
#[derive(Clone, Debug)]
pub struct RefreshOutcome {
    /// Merged snapshot over all successful regions
    pub snapshot: CatalogSnapshot,
    /// Regions that failed, with their final errors
    pub failed_regions: Vec<(String, String)>,
}

/// Fetch one region with per-call retry on transient errors
async fn fetch_region(
    source: &dyn ModelSource,
    region: &str,
    policy: &FetchPolicy,
) -> Result<Vec<ModelDescriptor>, SourceError> {
    let mut attempt = 0;
    loop {
        match source.list_region_models(region).await {
            Ok(models) => {
                tracing::debug!(region, models = models.len(), "region listing fetched");
                return Ok(models);
            }
            Err(SourceError::Transient(msg)) if attempt < policy.retries => {
                let delay = policy.backoff_for_attempt(attempt);
                tracing::debug!(
                    region,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %msg,
                    "transient listing failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Query all regions in parallel and merge the listings.
///
/// # Errors
///
/// Returns [`CatalogFetchError`] only when every region failed.
pub async fn refresh_from_source(
    source: Arc<dyn ModelSource>,
    regions: &[String],
    policy: &FetchPolicy,
) -> Result<RefreshOutcome, CatalogFetchError> {
    let results: Vec<(String, Result<Vec<ModelDescriptor>, SourceError>)> =
        stream::iter(regions.iter().cloned())
            .map(|region| {
                let source = Arc::clone(&source);
                let policy = policy.clone();
                async move {
                    let result = fetch_region(source.as_ref(), &region, &policy).await;
                    (region, result)
                }
            })
            .buffer_unordered(policy.max_workers.max(1))
            .collect()
            .await;

    let mut listings = Vec::new();
    let mut failed_regions = Vec::new();
    for (region, result) in results {
        match result {
            Ok(models) => listings.push((region, models)),
            Err(err) => {
                tracing::warn!(region = %region, error = %err, "region listing failed");
                failed_regions.push((region, err.to_string()));
            }
        }
    }

    if listings.is_empty() {
        return Err(CatalogFetchError {
            per_region: failed_regions,
        });
    }

    let mut succeeded: Vec<String> = listings.iter().map(|(r, _)| r.clone()).collect();
    succeeded.sort();

    let snapshot = CatalogSnapshot {
        models: merge_listings(listings),
        metadata: SnapshotMetadata {
            source: SnapshotSource::Remote,
            retrieved_at: Utc::now(),
            regions_queried: succeeded,
            bundled_version: None,
        },
    };

    Ok(RefreshOutcome {
        snapshot,
        failed_regions,
    })
}

/// Merge per-region listings into one name-keyed map.
///
/// A model listed by several regions gets the union of their access entries.
/// Conflicting descriptors (same name, different `model_id`) and duplicate
/// ids under different names are dropped with a warning so the snapshot
/// invariants hold.
fn merge_listings(
    listings: Vec<(String, Vec<ModelDescriptor>)>,
) -> BTreeMap<String, ModelDescriptor> {
    let mut merged: BTreeMap<String, ModelDescriptor> = BTreeMap::new();

    for (region, models) in listings {
        for descriptor in models {
            match merged.get_mut(&descriptor.model_name) {
                None => {
                    merged.insert(descriptor.model_name.clone(), descriptor);
                }
                Some(existing) => {
                    if existing.model_id != descriptor.model_id {
                        tracing::warn!(
                            model = %descriptor.model_name,
                            region = %region,
                            kept = %existing.model_id,
                            dropped = %descriptor.model_id,
                            "conflicting model ids for one name, keeping first"
                        );
                        continue;
                    }
                    existing.region_access.extend(descriptor.region_access);
                }
            }
        }
    }

    // Enforce the cross-model invariant: model_id unique across the catalog
    let mut seen_ids = BTreeMap::new();
    let mut dropped: Vec<String> = Vec::new();
    for (name, descriptor) in &merged {
        if let Some(first) = seen_ids.insert(descriptor.model_id.clone(), name.clone()) {
            tracing::warn!(
                model_id = %descriptor.model_id,
                kept = %first,
                dropped = %name,
                "duplicate model id across names, dropping later entry"
            );
            dropped.push(name.clone());
        }
    }
    for name in dropped {
        merged.remove(&name);
    }

    merged
}
