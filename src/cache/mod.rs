//! Catalog Snapshot Cache
//!
//! Tiered persistence for catalog snapshots with three modes:
//!
//! - `None`: loads are always empty, saves are no-ops
//! - `Memory`: a single process-wide slot, no backing store
//! - `File`: a JSON document with a freshness window
//!
//! A stored envelope is only served while it is younger than
//! `max_age_hours` AND was written by the same *major* package version;
//! minor/patch differences do not invalidate. Anything unreadable —
//! missing file, unparsable JSON, missing top-level keys — is treated as
//! absent, never as an error: the catalog simply refreshes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::types::{CatalogSnapshot, SnapshotSource};
use crate::config::ConfigurationError;

/// Default freshness window in hours
pub const DEFAULT_MAX_AGE_HOURS: f64 = 24.0;

/// Process-wide slot backing `CacheMode::Memory`
static MEMORY_SLOT: Mutex<Option<CacheEnvelope>> = Mutex::new(None);

// ============================================================================
// Configuration
// ============================================================================

/// Cache persistence mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// No caching at all
    None,
    /// Single process-wide in-memory slot
    Memory,
    /// JSON document on disk
    #[default]
    File,
}

/// Cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persistence mode
    pub mode: CacheMode,
    /// Freshness window; entries older than this are treated as absent
    pub max_age_hours: f64,
    /// Cache file location for `File` mode; defaults to the user cache dir
    pub file_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::File,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            file_path: None,
        }
    }
}

/// Default on-disk location: `<user cache dir>/llm-relay/model_catalog.json`
#[must_use]
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("llm-relay")
        .join("model_catalog.json")
}

// ============================================================================
// Envelope
// ============================================================================

/// Persisted form of a snapshot.
///
/// Serializes with the snapshot's `models` and `metadata` at the top level
/// next to `package_version` and `written_at`; a document missing any of
/// those keys is invalid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    /// The cached snapshot (flattened: `models` + `metadata`)
    #[serde(flatten)]
    pub payload: CatalogSnapshot,
    /// Version of the package that wrote the envelope
    pub package_version: String,
    /// Write timestamp
    pub written_at: DateTime<Utc>,
}

/// Top-level keys a cache document must carry to be considered valid
const REQUIRED_KEYS: &[&str] = &["models", "metadata", "package_version", "written_at"];

/// Major component of a semver-ish version string ("1.2.3" → 1)
fn major_version(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}

impl CacheEnvelope {
    fn new(payload: CatalogSnapshot) -> Self {
        Self {
            payload,
            package_version: env!("CARGO_PKG_VERSION").to_string(),
            written_at: Utc::now(),
        }
    }

    /// Whether this envelope is still servable under the given window
    fn is_fresh(&self, max_age_hours: f64, now: DateTime<Utc>) -> bool {
        let age_hours = (now - self.written_at).num_milliseconds() as f64 / 3_600_000.0;
        if age_hours < 0.0 || age_hours > max_age_hours {
            return false;
        }
        let running = major_version(env!("CARGO_PKG_VERSION"));
        let written = major_version(&self.package_version);
        match (running, written) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure writing the cache (loads never fail, they return absent)
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure
    #[error("cache I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope could not be serialized
    #[error("cache serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Cache Manager
// ============================================================================

/// Tiered persistence facade for catalog snapshots
#[derive(Debug)]
pub struct CacheManager {
    mode: CacheMode,
    max_age_hours: f64,
    file_path: PathBuf,
}

impl CacheManager {
    /// Create a cache manager.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidCacheMaxAge`] when
    /// `max_age_hours` is not strictly positive.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigurationError> {
        if config.max_age_hours <= 0.0 {
            return Err(ConfigurationError::InvalidCacheMaxAge {
                hours: config.max_age_hours,
            });
        }
        Ok(Self {
            mode: config.mode,
            max_age_hours: config.max_age_hours,
            file_path: config.file_path.clone().unwrap_or_else(default_cache_path),
        })
    }

    /// The active mode
    #[must_use]
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Load the cached snapshot, if a fresh valid one exists.
    ///
    /// Returns `None` for: no entry, unreadable/unparsable document, missing
    /// top-level keys, an expired entry, or a major-version mismatch. The
    /// returned snapshot's source is rewritten to `Cache`.
    #[must_use]
    pub fn load(&self) -> Option<CatalogSnapshot> {
        let envelope = self.current_envelope()?;
        if !envelope.is_fresh(self.max_age_hours, Utc::now()) {
            tracing::debug!(mode = ?self.mode, "cache entry stale or version-mismatched");
            return None;
        }
        let mut snapshot = envelope.payload;
        snapshot.metadata.source = SnapshotSource::Cache;
        Some(snapshot)
    }

    /// Persist a snapshot, stamping the current time and package version.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] on filesystem or serialization failure in
    /// `File` mode. `None` mode never fails (no-op).
    pub fn save(&self, snapshot: &CatalogSnapshot) -> Result<(), CacheError> {
        let envelope = CacheEnvelope::new(snapshot.clone());
        match self.mode {
            CacheMode::None => Ok(()),
            CacheMode::Memory => {
                *MEMORY_SLOT.lock() = Some(envelope);
                Ok(())
            }
            CacheMode::File => {
                if let Some(parent) = self.file_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let json = serde_json::to_string_pretty(&envelope)?;
                std::fs::write(&self.file_path, json)?;
                tracing::debug!(path = ?self.file_path, "catalog snapshot cached");
                Ok(())
            }
        }
    }

    /// Whether a fresh valid entry currently exists
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self.mode {
            CacheMode::None => false,
            _ => self
                .current_envelope()
                .map(|e| e.is_fresh(self.max_age_hours, Utc::now()))
                .unwrap_or(false),
        }
    }

    /// Drop any cached entry
    pub fn clear(&self) {
        match self.mode {
            CacheMode::None => {}
            CacheMode::Memory => *MEMORY_SLOT.lock() = None,
            CacheMode::File => {
                if let Err(err) = std::fs::remove_file(&self.file_path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = ?self.file_path, error = %err, "cache clear failed");
                    }
                }
            }
        }
    }

    fn current_envelope(&self) -> Option<CacheEnvelope> {
        match self.mode {
            CacheMode::None => None,
            CacheMode::Memory => MEMORY_SLOT.lock().clone(),
            CacheMode::File => read_envelope(&self.file_path),
        }
    }
}

/// Read and validate an envelope document; any defect means absent
fn read_envelope(path: &Path) -> Option<CacheEnvelope> {
    let text = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
    let object = value.as_object()?;
    if REQUIRED_KEYS.iter().any(|key| !object.contains_key(*key)) {
        tracing::debug!(path = ?path, "cache document missing required keys");
        return None;
    }
    serde_json::from_value(value).ok()
}
