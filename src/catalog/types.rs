//! Catalog Data Model
//!
//! Value objects describing models, their per-region access options, and
//! whole catalog snapshots. Descriptors are validated at construction time:
//! an [`AccessInfo`] must offer at least one access method, a
//! [`ModelDescriptor`] must declare modalities and at least one region.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Access Methods
// ============================================================================

/// How a model can be invoked in a region.
///
/// Declaration order is the preference order used when generating
/// candidates: direct first, then regional profile, then global profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    /// On-demand invocation with the model id itself
    Direct,
    /// Inference profile scoped to a region group
    RegionalProfile,
    /// Inference profile spanning all commercial regions
    GlobalProfile,
}

impl AccessMethod {
    /// All methods in preference order
    pub const ALL: [Self; 3] = [Self::Direct, Self::RegionalProfile, Self::GlobalProfile];

    /// Stable lowercase name for logs and statistics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::RegionalProfile => "regional_profile",
            Self::GlobalProfile => "global_profile",
        }
    }
}

impl std::fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Constructor-time invariant violations for catalog value objects
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// An `AccessInfo` declared no usable access method
    #[error("access info for region {region} declares no access method")]
    NoAccessMethods {
        /// The offending region
        region: String,
    },

    /// An access flag was set without a matching id
    #[error("access info for region {region} flags {method} but carries no id")]
    MissingAccessId {
        /// The offending region
        region: String,
        /// The flagged method
        method: AccessMethod,
    },

    /// A descriptor declared no input or output modalities
    #[error("model {model} declares empty {direction} modalities")]
    EmptyModalities {
        /// Canonical model name
        model: String,
        /// "input" or "output"
        direction: &'static str,
    },

    /// A descriptor declared no regions
    #[error("model {model} declares no region access")]
    NoRegions {
        /// Canonical model name
        model: String,
    },

    /// Two descriptors in one snapshot share a model id
    #[error("duplicate model id {model_id} in catalog snapshot")]
    DuplicateModelId {
        /// The duplicated id
        model_id: String,
    },
}

// ============================================================================
// Access Info
// ============================================================================

/// Per-region access options for one model.
///
/// At least one of the three access flags must be true, and every set flag
/// must carry its id. Construct via [`AccessInfo::builder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
    /// Region this info applies to
    pub region: String,
    /// Whether on-demand direct invocation is available
    pub has_direct_access: bool,
    /// Direct model id, when direct access is available
    pub direct_model_id: Option<String>,
    /// Whether a regional inference profile exists
    pub has_regional_profile: bool,
    /// Regional profile id, when one exists
    pub regional_profile_id: Option<String>,
    /// Whether a global inference profile exists
    pub has_global_profile: bool,
    /// Global profile id, when one exists
    pub global_profile_id: Option<String>,
}

impl AccessInfo {
    /// Start building access info for a region
    pub fn builder(region: impl Into<String>) -> AccessInfoBuilder {
        AccessInfoBuilder {
            region: region.into(),
            direct_model_id: None,
            regional_profile_id: None,
            global_profile_id: None,
        }
    }

    /// The id to invoke for a given access method, if that method is offered
    #[must_use]
    pub fn resolved_id_for(&self, method: AccessMethod) -> Option<&str> {
        match method {
            AccessMethod::Direct if self.has_direct_access => self.direct_model_id.as_deref(),
            AccessMethod::RegionalProfile if self.has_regional_profile => {
                self.regional_profile_id.as_deref()
            }
            AccessMethod::GlobalProfile if self.has_global_profile => {
                self.global_profile_id.as_deref()
            }
            _ => None,
        }
    }

    /// Available methods in preference order
    #[must_use]
    pub fn available_methods(&self) -> Vec<AccessMethod> {
        AccessMethod::ALL
            .into_iter()
            .filter(|m| self.resolved_id_for(*m).is_some())
            .collect()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if !self.has_direct_access && !self.has_regional_profile && !self.has_global_profile {
            return Err(ValidationError::NoAccessMethods {
                region: self.region.clone(),
            });
        }
        let pairs = [
            (self.has_direct_access, &self.direct_model_id, AccessMethod::Direct),
            (
                self.has_regional_profile,
                &self.regional_profile_id,
                AccessMethod::RegionalProfile,
            ),
            (
                self.has_global_profile,
                &self.global_profile_id,
                AccessMethod::GlobalProfile,
            ),
        ];
        for (flag, id, method) in pairs {
            if flag && id.as_deref().map_or(true, str::is_empty) {
                return Err(ValidationError::MissingAccessId {
                    region: self.region.clone(),
                    method,
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`AccessInfo`]
#[derive(Clone, Debug)]
pub struct AccessInfoBuilder {
    region: String,
    direct_model_id: Option<String>,
    regional_profile_id: Option<String>,
    global_profile_id: Option<String>,
}

impl AccessInfoBuilder {
    /// Enable direct access with the given model id
    #[must_use]
    pub fn direct(mut self, model_id: impl Into<String>) -> Self {
        self.direct_model_id = Some(model_id.into());
        self
    }

    /// Enable a regional inference profile
    #[must_use]
    pub fn regional_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.regional_profile_id = Some(profile_id.into());
        self
    }

    /// Enable a global inference profile
    #[must_use]
    pub fn global_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.global_profile_id = Some(profile_id.into());
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoAccessMethods`] when no method was enabled.
    pub fn build(self) -> Result<AccessInfo, ValidationError> {
        let info = AccessInfo {
            region: self.region,
            has_direct_access: self.direct_model_id.is_some(),
            direct_model_id: self.direct_model_id,
            has_regional_profile: self.regional_profile_id.is_some(),
            regional_profile_id: self.regional_profile_id,
            has_global_profile: self.global_profile_id.is_some(),
            global_profile_id: self.global_profile_id,
        };
        info.validate()?;
        Ok(info)
    }
}

// ============================================================================
// Model Descriptor
// ============================================================================

/// Content modalities a model consumes or produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Plain text
    Text,
    /// Images
    Image,
    /// Documents (PDF and similar)
    Document,
}

/// Catalog entry for one model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Canonical human-readable name (catalog key)
    pub model_name: String,
    /// Provider name (e.g., "anthropic")
    pub provider: String,
    /// Provider model id, unique across the catalog
    pub model_id: String,
    /// Modalities accepted as input
    pub input_modalities: BTreeSet<Modality>,
    /// Modalities produced as output
    pub output_modalities: BTreeSet<Modality>,
    /// Whether streaming responses are supported
    pub streaming_supported: bool,
    /// Access options keyed by region; never empty
    pub region_access: BTreeMap<String, AccessInfo>,
}

impl ModelDescriptor {
    /// Validate and build a descriptor
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when modalities or region access are
    /// empty, or when any contained [`AccessInfo`] is invalid.
    pub fn new(
        model_name: impl Into<String>,
        provider: impl Into<String>,
        model_id: impl Into<String>,
        input_modalities: BTreeSet<Modality>,
        output_modalities: BTreeSet<Modality>,
        streaming_supported: bool,
        region_access: BTreeMap<String, AccessInfo>,
    ) -> Result<Self, ValidationError> {
        let descriptor = Self {
            model_name: model_name.into(),
            provider: provider.into(),
            model_id: model_id.into(),
            input_modalities,
            output_modalities,
            streaming_supported,
            region_access,
        };
        if descriptor.input_modalities.is_empty() {
            return Err(ValidationError::EmptyModalities {
                model: descriptor.model_name,
                direction: "input",
            });
        }
        if descriptor.output_modalities.is_empty() {
            return Err(ValidationError::EmptyModalities {
                model: descriptor.model_name,
                direction: "output",
            });
        }
        if descriptor.region_access.is_empty() {
            return Err(ValidationError::NoRegions {
                model: descriptor.model_name,
            });
        }
        for info in descriptor.region_access.values() {
            info.validate()?;
        }
        Ok(descriptor)
    }

    /// Access info for a region, if the model is present there
    #[must_use]
    pub fn access_in(&self, region: &str) -> Option<&AccessInfo> {
        self.region_access.get(region)
    }

    /// Whether the model is reachable in the given region at all
    #[must_use]
    pub fn available_in(&self, region: &str) -> bool {
        self.access_in(region)
            .map(|info| !info.available_methods().is_empty())
            .unwrap_or(false)
    }
}

// ============================================================================
// Catalog Snapshot
// ============================================================================

/// Where a snapshot came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotSource {
    /// Fetched from the remote surface
    Remote,
    /// Built-in fallback tables
    Bundled,
    /// Loaded from the on-disk or in-memory cache
    Cache,
}

/// Snapshot provenance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Origin of the snapshot
    pub source: SnapshotSource,
    /// When the snapshot was assembled
    pub retrieved_at: DateTime<Utc>,
    /// Regions that were queried (or covered, for bundled data)
    pub regions_queried: Vec<String>,
    /// Version of the bundled tables, when `source` is `Bundled`
    pub bundled_version: Option<String>,
}

/// A complete catalog: canonical name → descriptor, plus provenance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// Models keyed by canonical name
    pub models: BTreeMap<String, ModelDescriptor>,
    /// Provenance metadata
    pub metadata: SnapshotMetadata,
}

impl CatalogSnapshot {
    /// Verify the cross-model invariant: `model_id` unique across the catalog
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateModelId`] on the first collision.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = BTreeSet::new();
        for descriptor in self.models.values() {
            if !seen.insert(descriptor.model_id.as_str()) {
                return Err(ValidationError::DuplicateModelId {
                    model_id: descriptor.model_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Canonical model names, sorted
    #[must_use]
    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}

// ============================================================================
// Model Filter
// ============================================================================

/// Filter for [`crate::catalog::ModelCatalog::list_models`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelFilter {
    /// Keep only models from this provider
    pub provider: Option<String>,
    /// Keep only models reachable in this region
    pub region: Option<String>,
    /// Keep only models accepting this input modality
    pub input_modality: Option<Modality>,
    /// Keep only models producing this output modality
    pub output_modality: Option<Modality>,
    /// Keep only models that support streaming
    pub streaming_only: bool,
}

impl ModelFilter {
    /// Match-everything filter
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to a provider
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Restrict to a region
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Restrict to an input modality
    #[must_use]
    pub fn with_input_modality(mut self, modality: Modality) -> Self {
        self.input_modality = Some(modality);
        self
    }

    /// Restrict to streaming-capable models
    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.streaming_only = true;
        self
    }

    /// Whether a descriptor passes this filter
    #[must_use]
    pub fn matches(&self, descriptor: &ModelDescriptor) -> bool {
        if let Some(ref provider) = self.provider {
            if !descriptor.provider.eq_ignore_ascii_case(provider) {
                return false;
            }
        }
        if let Some(ref region) = self.region {
            if !descriptor.available_in(region) {
                return false;
            }
        }
        if let Some(modality) = self.input_modality {
            if !descriptor.input_modalities.contains(&modality) {
                return false;
            }
        }
        if let Some(modality) = self.output_modality {
            if !descriptor.output_modalities.contains(&modality) {
                return false;
            }
        }
        if self.streaming_only && !descriptor.streaming_supported {
            return false;
        }
        true
    }
}
