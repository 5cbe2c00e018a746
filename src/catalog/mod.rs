//! Model Catalog
//!
//! The catalog owns everything about *what can be called where*: the set of
//! known models, their per-region access options, and the resolution of
//! user-supplied names onto canonical entries.
//!
//! # Snapshot lifecycle
//!
//! ```text
//! ensure_available()
//!   ├─ already loaded            -> done
//!   ├─ cache.load() fresh        -> serve from cache
//!   └─ refresh()
//!        ├─ remote fan-out ok    -> merge, persist through cache
//!        └─ all regions failed
//!           or fetching disabled -> bundled built-in snapshot
//! ```
//!
//! Lookup and resolution never fail for lack of data: if nothing has been
//! loaded yet they fall back to the bundled snapshot on the spot.

pub mod bundled;
pub mod refresh;
pub mod resolve;
pub mod types;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::CacheManager;

use self::bundled::bundled_snapshot;
use self::refresh::{refresh_from_source, FetchPolicy, ModelSource};
use self::resolve::{resolve_name, NameMatch, ResolutionError};
use self::types::{
    AccessInfo, CatalogSnapshot, ModelDescriptor, ModelFilter, SnapshotMetadata, SnapshotSource,
};

// ============================================================================
// Configuration
// ============================================================================

/// Catalog construction settings
#[derive(Clone, Debug)]
pub struct CatalogConfig {
    /// Regions to query on refresh
    pub regions: Vec<String>,
    /// Whether remote fetching is enabled at all
    pub fetch_enabled: bool,
    /// Fan-out retry and concurrency policy
    pub fetch: FetchPolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            regions: vec!["us-east-1".to_string(), "us-west-2".to_string()],
            fetch_enabled: true,
            fetch: FetchPolicy::default(),
        }
    }
}

// ============================================================================
// Resolution Result
// ============================================================================

/// A resolved model: the descriptor plus how its name was matched
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedModel {
    /// The catalog entry
    pub descriptor: ModelDescriptor,
    /// How the user's input mapped onto the canonical name
    pub name_match: NameMatch,
}

/// Descriptor plus the access options for one region
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRegionInfo {
    /// The catalog entry
    pub descriptor: ModelDescriptor,
    /// Access options in the requested region
    pub access: AccessInfo,
}

// ============================================================================
// Catalog
// ============================================================================

/// The model catalog: snapshot holder + resolver + refresh driver
pub struct ModelCatalog {
    config: CatalogConfig,
    cache: CacheManager,
    source: Option<Arc<dyn ModelSource>>,
    snapshot: RwLock<Option<CatalogSnapshot>>,
}

impl ModelCatalog {
    /// Create a catalog that refreshes through `source` and persists
    /// snapshots through `cache`
    #[must_use]
    pub fn new(
        config: CatalogConfig,
        cache: CacheManager,
        source: Option<Arc<dyn ModelSource>>,
    ) -> Self {
        Self {
            config,
            cache,
            source,
            snapshot: RwLock::new(None),
        }
    }

    /// Create a catalog pinned to a fixed snapshot (no fetching, no cache).
    ///
    /// Used for offline operation and tests.
    #[must_use]
    pub fn with_snapshot(snapshot: CatalogSnapshot) -> Self {
        let cache = CacheManager::new(&crate::cache::CacheConfig {
            mode: crate::cache::CacheMode::None,
            max_age_hours: crate::cache::DEFAULT_MAX_AGE_HOURS,
            file_path: None,
        })
        .expect("default max age is positive");
        Self {
            config: CatalogConfig {
                fetch_enabled: false,
                ..CatalogConfig::default()
            },
            cache,
            source: None,
            snapshot: RwLock::new(Some(snapshot)),
        }
    }

    /// Make sure some snapshot is loaded, preferring cache, then remote,
    /// then the bundled tables. Returns where the data came from.
    pub async fn ensure_available(&self) -> SnapshotSource {
        if let Some(source) = self.snapshot.read().as_ref().map(|s| s.metadata.source) {
            return source;
        }
        if let Some(cached) = self.cache.load() {
            tracing::debug!(models = cached.models.len(), "catalog served from cache");
            let source = cached.metadata.source;
            *self.snapshot.write() = Some(cached);
            return source;
        }
        self.refresh().await
    }

    /// Refresh from the remote source, falling back to the bundled tables
    /// when fetching is disabled or fails for every region. A successful
    /// remote fetch is persisted through the cache.
    pub async fn refresh(&self) -> SnapshotSource {
        let outcome = match (&self.source, self.config.fetch_enabled) {
            (Some(source), true) => {
                refresh_from_source(Arc::clone(source), &self.config.regions, &self.config.fetch)
                    .await
            }
            _ => {
                tracing::debug!("catalog fetching disabled, using bundled tables");
                *self.snapshot.write() = Some(bundled_snapshot());
                return SnapshotSource::Bundled;
            }
        };

        match outcome {
            Ok(outcome) => {
                if !outcome.failed_regions.is_empty() {
                    tracing::warn!(
                        failed = outcome.failed_regions.len(),
                        "catalog refresh succeeded partially"
                    );
                }
                if let Err(err) = self.cache.save(&outcome.snapshot) {
                    tracing::warn!(error = %err, "catalog snapshot could not be cached");
                }
                tracing::info!(
                    models = outcome.snapshot.models.len(),
                    regions = outcome.snapshot.metadata.regions_queried.len(),
                    "catalog refreshed from remote"
                );
                *self.snapshot.write() = Some(outcome.snapshot);
                SnapshotSource::Remote
            }
            Err(err) => {
                tracing::warn!(error = %err, "catalog refresh failed, using bundled tables");
                *self.snapshot.write() = Some(bundled_snapshot());
                SnapshotSource::Bundled
            }
        }
    }

    /// Run `f` against the loaded snapshot, initializing to the bundled
    /// tables if nothing is loaded yet
    fn with_loaded<R>(&self, f: impl FnOnce(&CatalogSnapshot) -> R) -> R {
        {
            let guard = self.snapshot.read();
            if let Some(snapshot) = guard.as_ref() {
                return f(snapshot);
            }
        }
        let mut guard = self.snapshot.write();
        let snapshot = guard.get_or_insert_with(|| {
            tracing::debug!("catalog used before load, initializing from bundled tables");
            bundled_snapshot()
        });
        f(snapshot)
    }

    /// Models passing the filter, sorted by canonical name
    #[must_use]
    pub fn list_models(&self, filter: &ModelFilter) -> Vec<ModelDescriptor> {
        self.with_loaded(|snapshot| {
            snapshot
                .models
                .values()
                .filter(|d| filter.matches(d))
                .cloned()
                .collect()
        })
    }

    /// Resolve a user-supplied name to a catalog entry.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] with suggestions when no canonical
    /// name matches; see [`resolve::ResolutionErrorKind`].
    pub fn resolve(&self, input: &str) -> Result<ResolvedModel, ResolutionError> {
        self.with_loaded(|snapshot| {
            let names: Vec<String> = snapshot.models.keys().cloned().collect();
            let name_match = resolve_name(&names, input)?;
            let descriptor = snapshot
                .models
                .get(&name_match.canonical)
                .cloned()
                .ok_or_else(|| ResolutionError {
                    kind: resolve::ResolutionErrorKind::NotFound,
                    input: input.to_string(),
                    suggestions: Vec::new(),
                    similar_models: Vec::new(),
                })?;
            Ok(ResolvedModel {
                descriptor,
                name_match,
            })
        })
    }

    /// Resolve a name and return its access options in `region`
    #[must_use]
    pub fn get_model_info(&self, name: &str, region: &str) -> Option<ModelRegionInfo> {
        let resolved = self.resolve(name).ok()?;
        let access = resolved.descriptor.access_in(region)?.clone();
        Some(ModelRegionInfo {
            descriptor: resolved.descriptor,
            access,
        })
    }

    /// Whether `name` resolves and is reachable in `region`
    #[must_use]
    pub fn is_model_available(&self, name: &str, region: &str) -> bool {
        self.get_model_info(name, region)
            .map(|info| !info.access.available_methods().is_empty())
            .unwrap_or(false)
    }

    /// Provenance of the loaded snapshot, if one is loaded
    #[must_use]
    pub fn metadata(&self) -> Option<SnapshotMetadata> {
        self.snapshot
            .read()
            .as_ref()
            .map(|s| s.metadata.clone())
    }
}
