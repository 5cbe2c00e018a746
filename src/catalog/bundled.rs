//! Bundled Catalog Tables
//!
//! A built-in snapshot used when remote fetching is disabled or fails for
//! every region. The tables are intentionally conservative: they list the
//! stable, widely-deployed models rather than tracking every preview id.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use super::types::{
    AccessInfo, CatalogSnapshot, Modality, ModelDescriptor, SnapshotMetadata, SnapshotSource,
    ValidationError,
};

/// Version stamp of the bundled tables
pub const BUNDLED_VERSION: &str = "2025-07-15";

/// Regions covered by the bundled tables
const BUNDLED_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-northeast-1",
    "ap-southeast-2",
];

/// One row of the bundled model table
struct BundledModel {
    name: &'static str,
    provider: &'static str,
    model_id: &'static str,
    image_input: bool,
    streaming: bool,
    /// Regions with on-demand direct access
    direct_regions: &'static [&'static str],
    /// Regions reachable through a regional inference profile
    profile_regions: &'static [&'static str],
    /// Whether a global inference profile exists
    global_profile: bool,
}

const BUNDLED_MODELS: &[BundledModel] = &[
    BundledModel {
        name: "Claude 3.5 Haiku",
        provider: "anthropic",
        model_id: "anthropic.claude-3-5-haiku-20241022-v1:0",
        image_input: false,
        streaming: true,
        direct_regions: &["us-east-1", "us-west-2"],
        profile_regions: &["us-east-1", "us-west-2", "eu-west-1", "eu-central-1"],
        global_profile: false,
    },
    BundledModel {
        name: "Claude 3.5 Sonnet",
        provider: "anthropic",
        model_id: "anthropic.claude-3-5-sonnet-20240620-v1:0",
        image_input: true,
        streaming: true,
        direct_regions: &["us-east-1", "us-west-2", "eu-central-1", "ap-northeast-1"],
        profile_regions: &["us-east-1", "us-west-2"],
        global_profile: false,
    },
    BundledModel {
        name: "Claude 3.5 Sonnet v2",
        provider: "anthropic",
        model_id: "anthropic.claude-3-5-sonnet-20241022-v2:0",
        image_input: true,
        streaming: true,
        direct_regions: &["us-east-1", "us-west-2"],
        profile_regions: &["us-east-1", "us-west-2", "eu-west-1", "ap-southeast-2"],
        global_profile: false,
    },
    BundledModel {
        name: "Claude 3.7 Sonnet",
        provider: "anthropic",
        model_id: "anthropic.claude-3-7-sonnet-20250219-v1:0",
        image_input: true,
        streaming: true,
        direct_regions: &[],
        profile_regions: &["us-east-1", "us-west-2", "eu-west-1", "eu-central-1"],
        global_profile: false,
    },
    BundledModel {
        name: "Claude Sonnet 4",
        provider: "anthropic",
        model_id: "anthropic.claude-sonnet-4-20250514-v1:0",
        image_input: true,
        streaming: true,
        direct_regions: &[],
        profile_regions: &[
            "us-east-1",
            "us-west-2",
            "eu-west-1",
            "eu-central-1",
            "ap-northeast-1",
            "ap-southeast-2",
        ],
        global_profile: true,
    },
    BundledModel {
        name: "Claude Opus 4",
        provider: "anthropic",
        model_id: "anthropic.claude-opus-4-20250514-v1:0",
        image_input: true,
        streaming: true,
        direct_regions: &[],
        profile_regions: &["us-east-1", "us-west-2", "eu-central-1"],
        global_profile: true,
    },
    BundledModel {
        name: "Nova Micro",
        provider: "amazon",
        model_id: "amazon.nova-micro-v1:0",
        image_input: false,
        streaming: true,
        direct_regions: &["us-east-1"],
        profile_regions: &["us-east-1", "us-west-2", "eu-west-1"],
        global_profile: false,
    },
    BundledModel {
        name: "Nova Pro",
        provider: "amazon",
        model_id: "amazon.nova-pro-v1:0",
        image_input: true,
        streaming: true,
        direct_regions: &["us-east-1"],
        profile_regions: &["us-east-1", "us-west-2", "eu-west-1", "ap-northeast-1"],
        global_profile: false,
    },
    BundledModel {
        name: "Llama 3.3 70B Instruct",
        provider: "meta",
        model_id: "meta.llama3-3-70b-instruct-v1:0",
        image_input: false,
        streaming: true,
        direct_regions: &["us-east-1", "us-west-2"],
        profile_regions: &["us-east-1", "us-west-2"],
        global_profile: false,
    },
    BundledModel {
        name: "Mistral Large 2402",
        provider: "mistral",
        model_id: "mistral.mistral-large-2402-v1:0",
        image_input: false,
        streaming: true,
        direct_regions: &["us-east-1", "eu-west-1"],
        profile_regions: &[],
        global_profile: false,
    },
];

/// Profile id prefix for a region's geography ("us-east-1" → "us")
#[must_use]
pub fn profile_prefix(region: &str) -> &'static str {
    if region.starts_with("us-") {
        "us"
    } else if region.starts_with("eu-") {
        "eu"
    } else {
        "apac"
    }
}

fn build_models() -> Result<BTreeMap<String, ModelDescriptor>, ValidationError> {
    let mut models = BTreeMap::new();
    for row in BUNDLED_MODELS {
        let mut region_access = BTreeMap::new();
        let mut regions: BTreeSet<&str> = row.direct_regions.iter().copied().collect();
        regions.extend(row.profile_regions.iter().copied());

        for region in regions {
            let mut builder = AccessInfo::builder(region);
            if row.direct_regions.contains(&region) {
                builder = builder.direct(row.model_id);
            }
            if row.profile_regions.contains(&region) {
                builder =
                    builder.regional_profile(format!("{}.{}", profile_prefix(region), row.model_id));
            }
            if row.global_profile {
                builder = builder.global_profile(format!("global.{}", row.model_id));
            }
            region_access.insert(region.to_string(), builder.build()?);
        }

        let mut input_modalities = BTreeSet::from([Modality::Text]);
        if row.image_input {
            input_modalities.insert(Modality::Image);
        }

        let descriptor = ModelDescriptor::new(
            row.name,
            row.provider,
            row.model_id,
            input_modalities,
            BTreeSet::from([Modality::Text]),
            row.streaming,
            region_access,
        )?;
        models.insert(descriptor.model_name.clone(), descriptor);
    }
    Ok(models)
}

/// Build the bundled fallback snapshot
#[must_use]
pub fn bundled_snapshot() -> CatalogSnapshot {
    let snapshot = CatalogSnapshot {
        models: build_models().expect("bundled catalog tables are valid"),
        metadata: SnapshotMetadata {
            source: SnapshotSource::Bundled,
            retrieved_at: Utc::now(),
            regions_queried: BUNDLED_REGIONS.iter().map(ToString::to_string).collect(),
            bundled_version: Some(BUNDLED_VERSION.to_string()),
        },
    };
    snapshot
        .validate()
        .expect("bundled catalog has unique model ids");
    snapshot
}
