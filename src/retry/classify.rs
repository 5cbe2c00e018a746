//! Provider Error Classification
//!
//! One pure function that buckets a provider failure into exactly one
//! retry class. Classification reads the error's coarse kind plus its raw
//! message text and nothing else.
//!
//! # Known fragility
//!
//! The message heuristics are coupled to vendor wording that carries no
//! stability contract. Every pattern lives in the const tables below so a
//! wording change is a one-line fix, and the two adaptation matchers are
//! disjoint by construction: a text that looks like a parameter rejection
//! is never also treated as a content-feature rejection.

use crate::backend::traits::{ContentFeature, ProviderError, ProviderErrorKind};

// ============================================================================
// Pattern Tables
// ============================================================================

/// Throttling / temporary unavailability — retry the same candidate
const TRANSIENT_PATTERNS: &[&str] = &[
    "throttl",
    "too many requests",
    "rate limit",
    "rate exceeded",
    "service unavailable",
    "serviceunavailable",
    "temporarily unavailable",
    "timed out",
    "timeout",
    "connection reset",
    "internal server error",
    "overloaded",
    "please try again",
];

/// The target must be invoked through an inference profile
const PROFILE_PATTERNS: &[&str] = &[
    "on-demand throughput isn",
    "with an inference profile",
    "inference profile is required",
    "requires an inference profile",
];

/// A named request field is not accepted by this model
const PARAMETER_PATTERNS: &[&str] = &[
    "extraneous key",
    "unknown parameter",
    "unsupported parameter",
    "unexpected field",
    "is not permitted",
];

/// A content modality/feature is not accepted by this model
const CONTENT_PATTERNS: &[&str] = &[
    "does not support image",
    "doesn't support image",
    "image content is not supported",
    "does not support vision",
    "unsupported content block",
    "cache point",
    "cachepoint",
    "cache_point",
    "multimodal input is not supported",
    "media type is not supported",
];

// ============================================================================
// Error Classes
// ============================================================================

/// The single class assigned to a provider failure
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the same candidate after backoff
    Transient,
    /// Re-resolve the candidate to a profile-based access method
    ProfileRequired {
        /// Model id extracted from the error text, when present
        model_id: Option<String>,
    },
    /// Strip the named extended-parameter field and retry once
    ParameterIncompatible {
        /// Field name extracted from the error text, when present
        field: Option<String>,
    },
    /// Disable the named content feature and retry (if fallback is enabled)
    ContentFeatureIncompatible {
        /// Feature extracted from the error text, when recognized
        feature: Option<ContentFeature>,
    },
    /// Abandon the candidate and advance to the next one
    Fatal,
}

// ============================================================================
// Matchers
// ============================================================================

fn contains_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.contains(p))
}

/// Whether `text` (lowercased) reads as a parameter rejection
#[must_use]
pub fn matches_parameter(text: &str) -> bool {
    contains_any(text, PARAMETER_PATTERNS)
}

/// Whether `text` (lowercased) reads as a content-feature rejection.
///
/// Mutually exclusive with [`matches_parameter`] for every possible input:
/// a parameter-shaped text never classifies as a content-feature failure.
#[must_use]
pub fn matches_content_feature(text: &str) -> bool {
    contains_any(text, CONTENT_PATTERNS) && !matches_parameter(text)
}

/// Classify a provider failure into exactly one [`ErrorClass`]
#[must_use]
pub fn classify(error: &ProviderError) -> ErrorClass {
    // The coarse kind is authoritative when it already answers the question
    match error.kind {
        ProviderErrorKind::Throttling
        | ProviderErrorKind::Unavailable
        | ProviderErrorKind::Connection => return ErrorClass::Transient,
        _ => {}
    }

    let lowered = error.message.to_lowercase();

    if contains_any(&lowered, PROFILE_PATTERNS) {
        return ErrorClass::ProfileRequired {
            model_id: extract_profile_model_id(&error.message),
        };
    }
    if matches_parameter(&lowered) {
        return ErrorClass::ParameterIncompatible {
            field: extract_field_name(&error.message),
        };
    }
    if matches_content_feature(&lowered) {
        return ErrorClass::ContentFeatureIncompatible {
            feature: extract_feature(&lowered),
        };
    }

    match error.kind {
        ProviderErrorKind::AccessDenied | ProviderErrorKind::NotFound => ErrorClass::Fatal,
        _ if contains_any(&lowered, TRANSIENT_PATTERNS) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

// ============================================================================
// Field Extraction
// ============================================================================

const TRIM_PUNCTUATION: &[char] = &['.', ',', ';', ':', '\'', '"', '`', ')', '('];

/// Pull the offending model id out of a profile-required message.
///
/// Looks for the token following "model ID" (any case), e.g.
/// "Invocation of model ID acme.foo-v1:0 with on-demand throughput isn't
/// supported" → `acme.foo-v1:0`.
fn extract_profile_model_id(message: &str) -> Option<String> {
    let lowered = message.to_lowercase();
    let marker = "model id ";
    let start = lowered.find(marker)? + marker.len();
    let token = message[start..].split_whitespace().next()?;
    let id = token.trim_matches(TRIM_PUNCTUATION);
    (!id.is_empty()).then(|| id.to_string())
}

/// Pull the rejected field name out of a parameter message.
///
/// Prefers a bracketed name ("extraneous key [top_k] is not permitted"),
/// then the token following "parameter"/"field"/"key".
fn extract_field_name(message: &str) -> Option<String> {
    if let (Some(open), Some(close)) = (message.find('['), message.find(']')) {
        if open < close {
            let inner = message[open + 1..close].trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }

    let lowered = message.to_lowercase();
    for marker in ["parameter ", "field ", "key "] {
        if let Some(pos) = lowered.find(marker) {
            let rest = &message[pos + marker.len()..];
            if let Some(token) = rest.split_whitespace().next() {
                let name = token.trim_matches(TRIM_PUNCTUATION);
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
    }
    None
}

/// Recognize which content feature a rejection refers to
fn extract_feature(lowered: &str) -> Option<ContentFeature> {
    if lowered.contains("cache point") || lowered.contains("cachepoint") || lowered.contains("cache_point")
    {
        Some(ContentFeature::CachePoint)
    } else if lowered.contains("image")
        || lowered.contains("vision")
        || lowered.contains("multimodal")
        || lowered.contains("media type")
    {
        Some(ContentFeature::Image)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(kind: ProviderErrorKind, message: &str) -> ProviderError {
        ProviderError::new(kind, message)
    }

    // ===================
    // Classification
    // ===================

    #[test]
    fn test_kind_shortcuts_to_transient() {
        for kind in [
            ProviderErrorKind::Throttling,
            ProviderErrorKind::Unavailable,
            ProviderErrorKind::Connection,
        ] {
            assert_eq!(classify(&err(kind, "whatever")), ErrorClass::Transient);
        }
    }

    #[test]
    fn test_transient_by_message() {
        let error = err(
            ProviderErrorKind::Other,
            "Too many requests, please try again later",
        );
        assert_eq!(classify(&error), ErrorClass::Transient);
    }

    #[test]
    fn test_profile_required_extracts_model_id() {
        let error = err(
            ProviderErrorKind::Validation,
            "Invocation of model ID acme.foo-v1:0 with on-demand throughput isn't supported. \
             Retry your request with the ID or ARN of an inference profile.",
        );
        assert_eq!(
            classify(&error),
            ErrorClass::ProfileRequired {
                model_id: Some("acme.foo-v1:0".to_string())
            }
        );
    }

    #[test]
    fn test_profile_required_without_id() {
        let error = err(
            ProviderErrorKind::Validation,
            "This model requires an inference profile",
        );
        assert_eq!(
            classify(&error),
            ErrorClass::ProfileRequired { model_id: None }
        );
    }

    #[test]
    fn test_parameter_incompatible_bracketed_field() {
        let error = err(
            ProviderErrorKind::Validation,
            "Malformed input request: extraneous key [top_k] is not permitted",
        );
        assert_eq!(
            classify(&error),
            ErrorClass::ParameterIncompatible {
                field: Some("top_k".to_string())
            }
        );
    }

    #[test]
    fn test_parameter_incompatible_named_field() {
        let error = err(
            ProviderErrorKind::Validation,
            "Unknown parameter 'reasoning_effort' for this model",
        );
        assert_eq!(
            classify(&error),
            ErrorClass::ParameterIncompatible {
                field: Some("reasoning_effort".to_string())
            }
        );
    }

    #[test]
    fn test_content_feature_image() {
        let error = err(
            ProviderErrorKind::Validation,
            "This model does not support image content blocks",
        );
        assert_eq!(
            classify(&error),
            ErrorClass::ContentFeatureIncompatible {
                feature: Some(ContentFeature::Image)
            }
        );
    }

    #[test]
    fn test_content_feature_cache_point() {
        let error = err(
            ProviderErrorKind::Validation,
            "cachePoint blocks are not supported: remove the cache point and retry",
        );
        assert_eq!(
            classify(&error),
            ErrorClass::ContentFeatureIncompatible {
                feature: Some(ContentFeature::CachePoint)
            }
        );
    }

    #[test]
    fn test_fatal_kinds() {
        assert_eq!(
            classify(&err(ProviderErrorKind::AccessDenied, "access denied")),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify(&err(ProviderErrorKind::NotFound, "no such model")),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_generic_validation_is_fatal() {
        let error = err(
            ProviderErrorKind::Validation,
            "Input is malformed in some novel way",
        );
        assert_eq!(classify(&error), ErrorClass::Fatal);
    }

    // ===================
    // Mutual exclusivity
    // ===================

    #[test]
    fn test_parameter_and_content_matchers_are_disjoint() {
        // Every pattern from both tables, in realistic sentences, plus
        // adversarial texts that mention both vocabularies at once.
        let mut corpus: Vec<String> = Vec::new();
        for p in PARAMETER_PATTERNS {
            corpus.push(format!("request failed: {p} [some_field]"));
        }
        for p in CONTENT_PATTERNS {
            corpus.push(format!("request failed: {p}"));
        }
        for p in PARAMETER_PATTERNS {
            for c in CONTENT_PATTERNS {
                corpus.push(format!("{p} and also {c}"));
            }
        }

        for text in &corpus {
            let lowered = text.to_lowercase();
            assert!(
                !(matches_parameter(&lowered) && matches_content_feature(&lowered)),
                "both matchers fired for: {text}"
            );
        }
    }

    #[test]
    fn test_classification_is_single_valued_over_corpus() {
        // classify() returns exactly one class by construction; exercise it
        // over mixed-signal messages to pin the precedence order.
        let mixed = err(
            ProviderErrorKind::Validation,
            "extraneous key [image_config] is not permitted",
        );
        // Parameter wins over any image mention inside the field name
        assert!(matches!(
            classify(&mixed),
            ErrorClass::ParameterIncompatible { .. }
        ));
    }

    // ===================
    // Extraction helpers
    // ===================

    #[test]
    fn test_extract_model_id_trims_punctuation() {
        let id = extract_profile_model_id("Invocation of model ID acme.foo-v1:0. Retry.");
        assert_eq!(id.as_deref(), Some("acme.foo-v1:0"));
    }

    #[test]
    fn test_extract_field_name_fallbacks() {
        assert_eq!(
            extract_field_name("extraneous key [alpha] is not permitted").as_deref(),
            Some("alpha")
        );
        assert_eq!(
            extract_field_name("unsupported parameter beta, remove it").as_deref(),
            Some("beta")
        );
        assert_eq!(extract_field_name("nothing to see here"), None);
    }
}
