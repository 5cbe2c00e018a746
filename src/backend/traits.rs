//! Inference Backend Traits
//!
//! Trait definitions for the remote inference surface. This abstraction lets
//! the retry orchestrator drive any provider gateway without knowing its wire
//! format: all it needs is to hand over a resolved target plus a payload and
//! to read back either a structured result or a provider error.
//!
//! # Design Philosophy
//!
//! The `InferenceBackend` trait provides a common interface for:
//! - Invoking a model (by direct id or inference-profile id) in a region
//! - Surfacing provider failures with a coarse kind and the raw message text
//!
//! Error *classification* happens elsewhere (`retry::classify`); this module
//! only guarantees that an error carries enough structure to classify.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Request Payload
// ============================================================================

/// Role of a conversation message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Message authored by the caller
    User,
    /// Message authored by the model
    Assistant,
}

/// Image formats accepted in image content blocks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// PNG image
    Png,
    /// JPEG image
    Jpeg,
    /// GIF image
    Gif,
    /// WebP image
    Webp,
}

/// One block of message content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text(String),
    /// Inline image (base64-encoded data)
    Image {
        /// Image encoding
        format: ImageFormat,
        /// Base64-encoded image bytes
        data: String,
    },
    /// Prompt-cache checkpoint marker
    CachePoint,
}

impl ContentBlock {
    /// The content feature this block exercises, if any.
    ///
    /// Plain text is always supported and maps to no feature.
    #[must_use]
    pub fn feature(&self) -> Option<ContentFeature> {
        match self {
            Self::Text(_) => None,
            Self::Image { .. } => Some(ContentFeature::Image),
            Self::CachePoint => Some(ContentFeature::CachePoint),
        }
    }
}

/// Optional request capabilities that a model may or may not support.
///
/// When a provider rejects a request because of one of these, the
/// orchestrator can disable the feature and retry (feature fallback).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFeature {
    /// Image content blocks
    Image,
    /// Prompt-cache checkpoint markers
    CachePoint,
}

impl ContentFeature {
    /// Stable lowercase name used in logs and adaptation metadata
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::CachePoint => "cache_point",
        }
    }
}

/// A conversation message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored this message
    pub role: MessageRole,
    /// Ordered content blocks
    pub blocks: Vec<ContentBlock>,
}

impl Message {
    /// Create a user message with a single text block
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            blocks: vec![ContentBlock::Text(text.into())],
        }
    }

    /// Create an assistant message with a single text block
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            blocks: vec![ContentBlock::Text(text.into())],
        }
    }
}

/// Sampling and length settings forwarded to the provider
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    /// Maximum tokens in the response
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff
    pub top_p: Option<f32>,
    /// Stop sequences
    pub stop_sequences: Vec<String>,
}

/// A fully-built request payload.
///
/// Produced by the caller (the content-builder side of the API); the
/// orchestrator treats it as opaque except for two adaptation hooks:
/// [`RequestPayload::remove_extended_param`] and
/// [`RequestPayload::disable_feature`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Optional system text
    pub system: Option<String>,
    /// Conversation messages, oldest first
    pub messages: Vec<Message>,
    /// Sampling settings
    pub settings: InferenceSettings,
    /// Provider-specific extended request fields, forwarded verbatim
    pub extended_params: serde_json::Map<String, serde_json::Value>,
}

impl RequestPayload {
    /// Create an empty payload
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system text
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Append a message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set an extended request field
    pub fn with_extended_param(
        mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.extended_params.insert(name.into(), value);
        self
    }

    /// Remove a named extended request field.
    ///
    /// Returns the removed value, or `None` if the field wasn't present.
    pub fn remove_extended_param(&mut self, name: &str) -> Option<serde_json::Value> {
        self.extended_params.remove(name)
    }

    /// Disable a content feature by stripping the blocks that exercise it.
    ///
    /// Returns `true` if at least one block was removed. Messages left with
    /// no blocks are dropped entirely.
    pub fn disable_feature(&mut self, feature: ContentFeature) -> bool {
        let mut removed = false;
        for message in &mut self.messages {
            let before = message.blocks.len();
            message.blocks.retain(|b| b.feature() != Some(feature));
            removed |= message.blocks.len() < before;
        }
        self.messages.retain(|m| !m.blocks.is_empty());
        removed
    }

    /// The set of content features this payload currently exercises
    #[must_use]
    pub fn active_features(&self) -> BTreeSet<ContentFeature> {
        self.messages
            .iter()
            .flat_map(|m| m.blocks.iter())
            .filter_map(ContentBlock::feature)
            .collect()
    }
}

// ============================================================================
// Invocation Target & Result
// ============================================================================

/// A resolved invocation target: the concrete id to call in a region.
///
/// The id is either a direct model id or an inference-profile id, already
/// chosen by the orchestrator; the backend does not re-resolve anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvokeTarget {
    /// Direct model id or inference-profile id
    pub resolved_id: String,
    /// Region to route the call through
    pub region: String,
}

/// Token accounting reported by the provider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the input
    pub input_tokens: u32,
    /// Tokens generated in the output
    pub output_tokens: u32,
}

/// A successful invocation result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvokeSuccess {
    /// Generated text content
    pub content: String,
    /// Why generation stopped, if reported
    pub stop_reason: Option<String>,
    /// Token usage, if reported
    pub usage: Option<TokenUsage>,
    /// Wall-clock duration of the remote call in milliseconds
    pub duration_ms: u64,
}

// ============================================================================
// Provider Errors
// ============================================================================

/// Coarse provider error kind.
///
/// Backends map their wire-level failures onto these; the classifier reads
/// the kind plus the raw message text and nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Request was throttled or rate limited
    Throttling,
    /// Service temporarily unavailable
    Unavailable,
    /// Request rejected as invalid
    Validation,
    /// Caller lacks access to the target
    AccessDenied,
    /// Target does not exist
    NotFound,
    /// Transport-level failure (connect, TLS, reset)
    Connection,
    /// Anything else
    Other,
}

/// A structured provider failure
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("provider error ({kind:?}, {}): {message}", .code.as_deref().unwrap_or("no code"))]
pub struct ProviderError {
    /// Coarse error kind
    pub kind: ProviderErrorKind,
    /// Provider-defined error code, if any
    pub code: Option<String>,
    /// Raw provider message text
    pub message: String,
}

impl ProviderError {
    /// Create a provider error with a kind and message
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Attach a provider-defined error code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

/// Inference backend trait.
///
/// Implement this to connect the orchestrator to a provider gateway.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name for logs (e.g., "http-gateway")
    fn name(&self) -> &str;

    /// Invoke the target with the given payload and wait for the result
    async fn invoke(
        &self,
        target: &InvokeTarget,
        payload: &RequestPayload,
    ) -> Result<InvokeSuccess, ProviderError>;
}
