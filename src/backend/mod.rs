//! Inference Backends
//!
//! Trait-based abstraction over the remote inference surface, plus the
//! concrete HTTP gateway client. The orchestrator only ever talks to the
//! [`InferenceBackend`] trait; swapping providers means implementing it.

pub mod http;
pub mod traits;

pub use http::HttpBackend;
pub use traits::{
    ContentBlock, ContentFeature, ImageFormat, InferenceBackend, InvokeSuccess, InvokeTarget,
    Message, MessageRole, ProviderError, ProviderErrorKind, RequestPayload, TokenUsage,
};
