//! Relay Facade
//!
//! [`Relay`] wires the catalog, tracker, orchestrator, and executor behind
//! two entry points: [`Relay::converse`] for one logical request and
//! [`Relay::converse_parallel`] for a batch. Construction validates the
//! whole configuration up front; a `Relay` that exists is a `Relay` that
//! can run.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::http::HttpBackend;
use crate::backend::traits::{InferenceBackend, RequestPayload};
use crate::cache::CacheManager;
use crate::catalog::refresh::ModelSource;
use crate::catalog::types::SnapshotSource;
use crate::catalog::ModelCatalog;
use crate::config::{ConfigurationError, RelayConfig};
use crate::executor::{ParallelExecutor, RegionAssignment};
use crate::retry::types::{ConverseRequest, ConverseResponse, RetryExhaustedError};
use crate::retry::RetryOrchestrator;
use crate::tracker::AccessMethodTracker;

/// Multi-region, multi-model request manager
pub struct Relay {
    config: RelayConfig,
    catalog: Arc<ModelCatalog>,
    tracker: AccessMethodTracker,
    backend: Arc<dyn InferenceBackend>,
    executor: ParallelExecutor,
}

impl Relay {
    /// Create a relay over the HTTP gateway backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when any config value is invalid.
    pub fn new(config: RelayConfig) -> Result<Self, ConfigurationError> {
        let backend = Arc::new(HttpBackend::new(config.endpoint.clone()));
        let source: Arc<dyn ModelSource> = Arc::clone(&backend) as Arc<dyn ModelSource>;
        Self::with_backend(config, backend, Some(source))
    }

    /// Create a relay over a caller-supplied backend (dependency injection
    /// point for other providers and for tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when any config value is invalid.
    pub fn with_backend(
        config: RelayConfig,
        backend: Arc<dyn InferenceBackend>,
        source: Option<Arc<dyn ModelSource>>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let cache = CacheManager::new(&config.cache)?;
        let catalog = Arc::new(ModelCatalog::new(config.catalog_config(), cache, source));
        let executor = ParallelExecutor::new(config.executor.clone());
        tracing::info!(
            models = config.models.len(),
            regions = config.regions.len(),
            backend = backend.name(),
            "relay constructed"
        );
        Ok(Self {
            config,
            catalog,
            tracker: AccessMethodTracker::new(),
            backend,
            executor,
        })
    }

    /// The model catalog
    #[must_use]
    pub fn catalog(&self) -> Arc<ModelCatalog> {
        Arc::clone(&self.catalog)
    }

    /// The access-method tracker handle
    #[must_use]
    pub fn tracker(&self) -> AccessMethodTracker {
        self.tracker.clone()
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Load the catalog (cache → remote → bundled); returns where the
    /// snapshot came from
    pub async fn ensure_ready(&self) -> SnapshotSource {
        self.catalog.ensure_available().await
    }

    fn orchestrator(&self) -> RetryOrchestrator {
        RetryOrchestrator::new(
            Arc::clone(&self.catalog),
            self.tracker.clone(),
            Arc::clone(&self.backend),
            self.config.retry.clone(),
        )
    }

    /// Run one logical request using the configured model/region lists.
    ///
    /// # Errors
    ///
    /// Returns [`RetryExhaustedError`] when every candidate fails.
    pub async fn converse(
        &self,
        payload: RequestPayload,
    ) -> Result<ConverseResponse, RetryExhaustedError> {
        let request = ConverseRequest::new(
            self.config.models.clone(),
            self.config.regions.clone(),
            payload,
        );
        self.converse_request(request).await
    }

    /// Run one fully-specified logical request.
    ///
    /// # Errors
    ///
    /// Returns [`RetryExhaustedError`] when every candidate fails.
    pub async fn converse_request(
        &self,
        request: ConverseRequest,
    ) -> Result<ConverseResponse, RetryExhaustedError> {
        self.catalog.ensure_available().await;
        self.orchestrator().execute(request).await
    }

    /// Run a batch of assignments concurrently. The result mapping has
    /// exactly one response per assignment.
    pub async fn converse_parallel(
        &self,
        assignments: Vec<RegionAssignment>,
    ) -> HashMap<String, ConverseResponse> {
        self.catalog.ensure_available().await;
        let orchestrator = Arc::new(self.orchestrator());
        self.executor
            .execute(assignments, move |request| {
                let orchestrator = Arc::clone(&orchestrator);
                async move { orchestrator.execute(request).await }
            })
            .await
    }
}
