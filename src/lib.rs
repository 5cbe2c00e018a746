//! llm-relay - Multi-Region, Multi-Model LLM Request Management
//!
//! This crate lets a caller issue chat/completion requests against a
//! multi-region, multi-model cloud inference surface. It chooses a model,
//! region, and access path automatically, retries and downgrades requests
//! when a specific combination fails, and runs many independent requests
//! concurrently under bounded resources.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |      Relay       |  <-- Entry point: converse / converse_parallel
//! +--------+---------+
//!          |
//!          v
//! +------------------+      +--------------------+
//! | ParallelExecutor |----->| RetryOrchestrator  |  (one per request)
//! +------------------+      +---------+----------+
//!                                     |
//!                    +----------------+----------------+
//!                    v                v                v
//!          +--------------+  +---------------+  +-----------------+
//!          | ModelCatalog |  | AccessMethod  |  | InferenceBackend|
//!          |  (resolve)   |  |   Tracker     |  |  (invoke)       |
//!          +------+-------+  +---------------+  +-----------------+
//!                 |
//!                 v
//!          +--------------+
//!          | CacheManager |
//!          +--------------+
//! ```
//!
//! # Design Principles
//!
//! 1. **Failover over failure**: a request only fails after every viable
//!    (model, region, access method) candidate has been tried
//! 2. **Learned routing**: the tracker biases candidate order toward
//!    combinations that recently worked
//! 3. **Adaptive requests**: unsupported parameters are stripped and
//!    unsupported content features disabled rather than failing outright
//! 4. **Full visibility**: every outcome carries the complete ordered
//!    attempt history
//!
//! # Quick Start
//!
//! ```ignore
//! use llm_relay::{load_config, Message, Relay, RequestPayload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = load_config()?;
//!     config.apply_env_overrides();
//!     let relay = Relay::new(config)?;
//!     relay.ensure_ready().await;
//!
//!     let response = relay
//!         .converse(RequestPayload::new().with_message(Message::user_text("Hello!")))
//!         .await?;
//!     println!("{}", response.content().unwrap_or(""));
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: inference backend trait, payload types, HTTP gateway client
//! - [`cache`]: tiered snapshot persistence (none / memory / file)
//! - [`catalog`]: model catalog, name resolution, refresh pipeline
//! - [`config`]: typed configuration, TOML loading, validation
//! - [`executor`]: bounded-concurrency parallel execution
//! - [`relay`]: the top-level facade
//! - [`retry`]: failure classification and retry/failover orchestration
//! - [`tracker`]: learned access-method preferences

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod executor;
pub mod relay;
pub mod retry;
pub mod tracker;

// Re-exports for convenience
pub use backend::{
    ContentBlock, ContentFeature, HttpBackend, ImageFormat, InferenceBackend, InvokeSuccess,
    InvokeTarget, Message, MessageRole, ProviderError, ProviderErrorKind, RequestPayload,
    TokenUsage,
};
pub use cache::{CacheConfig, CacheManager, CacheMode};
pub use catalog::refresh::{CatalogFetchError, FetchPolicy, ModelSource, SourceError};
pub use catalog::resolve::{
    normalize_model_name, MatchType, NameMatch, ResolutionError, ResolutionErrorKind,
};
pub use catalog::types::{
    AccessInfo, AccessMethod, CatalogSnapshot, Modality, ModelDescriptor, ModelFilter,
    SnapshotMetadata, SnapshotSource, ValidationError,
};
pub use catalog::{CatalogConfig, ModelCatalog, ModelRegionInfo, ResolvedModel};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigurationError,
    EndpointConfig, RelayConfig,
};
pub use executor::{
    ExecutionContext, ExecutionProgress, ExecutorConfig, ParallelExecutor, RegionAssignment,
};
pub use relay::Relay;
pub use retry::classify::{classify, ErrorClass};
pub use retry::types::{
    AdaptationReport, AttemptRecord, Candidate, ConverseRequest, ConverseResponse,
    RetryExhaustedError,
};
pub use retry::{RetryOrchestrator, RetryPolicy};
pub use tracker::{AccessMethodTracker, AccessPreference, TrackerStatistics};
