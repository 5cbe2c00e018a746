//! HTTP Gateway Backend
//!
//! `InferenceBackend` + `ModelSource` implementation against a
//! region-addressed REST gateway.
//!
//! # Gateway API
//!
//! - `POST {base}/model/{id}/converse` — run a conversation turn
//! - `GET  {base}/foundation-models` — list models available in the region
//!
//! The base URL comes from an [`EndpointConfig`] template with `{region}`
//! substituted per call. All wire-format knowledge stays inside this
//! module: the rest of the crate only sees [`InvokeSuccess`] and
//! [`ProviderError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::catalog::bundled::profile_prefix;
use crate::catalog::refresh::{ModelSource, SourceError};
use crate::catalog::types::{AccessInfo, Modality, ModelDescriptor};
use crate::config::EndpointConfig;

use super::traits::{
    ContentBlock, InferenceBackend, InvokeSuccess, InvokeTarget, MessageRole, ProviderError,
    ProviderErrorKind, RequestPayload, TokenUsage,
};

/// reqwest-based gateway client
#[derive(Clone)]
pub struct HttpBackend {
    endpoint: EndpointConfig,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend from endpoint settings.
    ///
    /// The bearer token is read from the configured environment variable;
    /// a missing token is allowed (some gateways authenticate by network).
    #[must_use]
    pub fn new(endpoint: EndpointConfig) -> Self {
        let api_key = std::env::var(&endpoint.api_key_env).ok().filter(|k| !k.is_empty());
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(endpoint.connect_timeout_ms))
            .timeout(Duration::from_millis(endpoint.request_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            endpoint,
            api_key,
            http_client,
        }
    }

    fn converse_url(&self, region: &str, resolved_id: &str) -> String {
        format!(
            "{}/model/{}/converse",
            self.endpoint.url_for(region),
            resolved_id
        )
    }

    fn listing_url(&self, region: &str) -> String {
        format!("{}/foundation-models", self.endpoint.url_for(region))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    fn name(&self) -> &str {
        "http-gateway"
    }

    async fn invoke(
        &self,
        target: &InvokeTarget,
        payload: &RequestPayload,
    ) -> Result<InvokeSuccess, ProviderError> {
        let url = self.converse_url(&target.region, &target.resolved_id);
        let body = wire_payload(payload);
        let start = Instant::now();

        let response = self
            .authorized(self.http_client.post(&url).json(&body))
            .send()
            .await
            .map_err(connection_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error_from(status, &body));
        }

        let data: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::new(
                ProviderErrorKind::Other,
                format!("unparsable gateway response: {e}"),
            )
        })?;

        Ok(parse_success(&data, start.elapsed()))
    }
}

#[async_trait]
impl ModelSource for HttpBackend {
    fn name(&self) -> &str {
        "http-gateway"
    }

    async fn list_region_models(&self, region: &str) -> Result<Vec<ModelDescriptor>, SourceError> {
        let url = self.listing_url(region);
        let response = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("connection failure: {e}")))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("listing returned {status}: {body}");
            return Err(if status == 429 || status >= 500 {
                SourceError::Transient(message)
            } else {
                SourceError::Fatal(message)
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceError::Fatal(format!("unparsable listing: {e}")))?;

        Ok(parse_listing(region, &data))
    }
}

// ============================================================================
// Wire Mapping
// ============================================================================

/// Serialize a payload into the gateway's converse body
fn wire_payload(payload: &RequestPayload) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = payload
        .messages
        .iter()
        .map(|message| {
            serde_json::json!({
                "role": role_name(message.role),
                "content": message.blocks.iter().map(block_value).collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut body = serde_json::json!({ "messages": messages });
    if let Some(ref system) = payload.system {
        body["system"] = serde_json::json!([{ "text": system }]);
    }

    let mut inference_config = serde_json::Map::new();
    if let Some(max_tokens) = payload.settings.max_tokens {
        inference_config.insert("maxTokens".to_string(), serde_json::json!(max_tokens));
    }
    if let Some(temperature) = payload.settings.temperature {
        inference_config.insert("temperature".to_string(), serde_json::json!(temperature));
    }
    if let Some(top_p) = payload.settings.top_p {
        inference_config.insert("topP".to_string(), serde_json::json!(top_p));
    }
    if !payload.settings.stop_sequences.is_empty() {
        inference_config.insert(
            "stopSequences".to_string(),
            serde_json::json!(payload.settings.stop_sequences),
        );
    }
    if !inference_config.is_empty() {
        body["inferenceConfig"] = serde_json::Value::Object(inference_config);
    }

    if !payload.extended_params.is_empty() {
        body["additionalModelRequestFields"] =
            serde_json::Value::Object(payload.extended_params.clone());
    }

    body
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn block_value(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text(text) => serde_json::json!({ "text": text }),
        ContentBlock::Image { format, data } => serde_json::json!({
            "image": {
                "format": format!("{format:?}").to_lowercase(),
                "source": { "bytes": data },
            }
        }),
        ContentBlock::CachePoint => serde_json::json!({ "cachePoint": { "type": "default" } }),
    }
}

/// Extract the success fields from a converse response
fn parse_success(data: &serde_json::Value, elapsed: Duration) -> InvokeSuccess {
    let content = data
        .pointer("/output/message/content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let stop_reason = data
        .get("stopReason")
        .and_then(|s| s.as_str())
        .map(String::from);

    let usage = data.get("usage").map(|u| TokenUsage {
        input_tokens: u
            .get("inputTokens")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32,
        output_tokens: u
            .get("outputTokens")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32,
    });

    InvokeSuccess {
        content,
        stop_reason,
        usage,
        duration_ms: elapsed.as_millis() as u64,
    }
}

fn connection_error(error: reqwest::Error) -> ProviderError {
    ProviderError::new(
        ProviderErrorKind::Connection,
        format!("connection failure: {error}"),
    )
}

/// Map an HTTP failure onto a structured provider error.
///
/// The body's `message` field (when present) becomes the error text so the
/// classifier sees the provider's own wording.
fn provider_error_from(status: u16, body: &str) -> ProviderError {
    let (code, message) = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => (
            value
                .get("code")
                .or_else(|| value.get("__type"))
                .and_then(|c| c.as_str())
                .map(String::from),
            value
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| body.to_string()),
        ),
        Err(_) => (None, body.to_string()),
    };

    let kind = match status {
        429 => ProviderErrorKind::Throttling,
        500 | 502 | 503 | 504 => ProviderErrorKind::Unavailable,
        401 | 403 => ProviderErrorKind::AccessDenied,
        404 => ProviderErrorKind::NotFound,
        400..=499 => ProviderErrorKind::Validation,
        _ => ProviderErrorKind::Other,
    };

    let mut error = ProviderError::new(kind, message);
    if let Some(code) = code {
        error = error.with_code(code);
    }
    error
}

/// Parse a region listing into descriptors.
///
/// Summaries that fail validation (no modalities, no usable access) are
/// skipped with a warning rather than poisoning the whole region.
fn parse_listing(region: &str, data: &serde_json::Value) -> Vec<ModelDescriptor> {
    let Some(summaries) = data.get("modelSummaries").and_then(|s| s.as_array()) else {
        return Vec::new();
    };

    summaries
        .iter()
        .filter_map(|summary| match parse_summary(region, summary) {
            Some(descriptor) => Some(descriptor),
            None => {
                tracing::warn!(region, summary = %summary, "unusable model summary skipped");
                None
            }
        })
        .collect()
}

fn parse_summary(region: &str, summary: &serde_json::Value) -> Option<ModelDescriptor> {
    let model_id = summary.get("modelId")?.as_str()?;
    let model_name = summary.get("modelName")?.as_str()?;
    let provider = summary
        .get("providerName")
        .and_then(|p| p.as_str())
        .unwrap_or("unknown");

    let inference_types: Vec<&str> = summary
        .get("inferenceTypesSupported")
        .and_then(|t| t.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut builder = AccessInfo::builder(region);
    if inference_types.contains(&"ON_DEMAND") {
        builder = builder.direct(model_id);
    }
    if inference_types.contains(&"INFERENCE_PROFILE") {
        builder = builder.regional_profile(format!("{}.{}", profile_prefix(region), model_id));
    }
    if inference_types.contains(&"GLOBAL_PROFILE") {
        builder = builder.global_profile(format!("global.{model_id}"));
    }
    let access = builder.build().ok()?;

    let streaming = summary
        .get("responseStreamingSupported")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    ModelDescriptor::new(
        model_name,
        provider,
        model_id,
        parse_modalities(summary.get("inputModalities")),
        parse_modalities(summary.get("outputModalities")),
        streaming,
        std::collections::BTreeMap::from([(region.to_string(), access)]),
    )
    .ok()
}

fn parse_modalities(value: Option<&serde_json::Value>) -> std::collections::BTreeSet<Modality> {
    let mut modalities: std::collections::BTreeSet<Modality> = value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| match m.as_str()?.to_ascii_uppercase().as_str() {
                    "TEXT" => Some(Modality::Text),
                    "IMAGE" => Some(Modality::Image),
                    "DOCUMENT" => Some(Modality::Document),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    // A summary with no recognizable modalities is still a text model
    if modalities.is_empty() {
        modalities.insert(Modality::Text);
    }
    modalities
}
