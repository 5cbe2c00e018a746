//! Model Name Resolution
//!
//! Resolves a user-supplied model name against the catalog's canonical
//! names. Resolution is attempted in order, first match wins:
//!
//! ```text
//! 1. Exact canonical match
//! 2. Alias table (current aliases, then legacy names, then deprecated)
//! 3. Case/format-normalized match
//! 4. Fuzzy similarity match above a floor
//! ```
//!
//! Failures carry ranked suggestions so callers can surface "did you mean"
//! messages. The normalization rule is deliberately small and idempotent:
//! lowercase, fold `-`/`_`/`.` into spaces, and merge runs of consecutive
//! single-digit tokens (`"3 5"` → `"35"`) so that `"Claude 3.5 Sonnet"`
//! and `"claude-3-5-sonnet"` land on the same key.

use thiserror::Error;

/// Minimum similarity for a fuzzy match to succeed
const FUZZY_FLOOR: f64 = 0.7;

/// Minimum similarity for a name to appear in suggestions
const SUGGESTION_FLOOR: f64 = 0.3;

/// Maximum number of "did you mean" suggestions
const MAX_SUGGESTIONS: usize = 3;

/// Maximum number of similar models attached to a failure
const MAX_SIMILAR: usize = 5;

/// Confidence reported for a normalized (non-exact, non-alias) match
const NORMALIZED_CONFIDENCE: f64 = 0.9;

// ============================================================================
// Alias Tables
// ============================================================================

/// Current short-hand aliases, lowercase key → canonical name.
///
/// These are convenience names users actually type; each must map to a live
/// canonical catalog name.
const ALIASES: &[(&str, &str)] = &[
    ("sonnet", "Claude Sonnet 4"),
    ("opus", "Claude Opus 4"),
    ("haiku", "Claude 3.5 Haiku"),
    ("claude", "Claude Sonnet 4"),
    ("nova", "Nova Pro"),
    ("llama", "Llama 3.3 70B Instruct"),
    ("mistral", "Mistral Large 2402"),
];

/// Legacy names from superseded naming schemes, lowercase key → canonical.
///
/// Resolving through this table succeeds but flags `legacy_name_found` so
/// callers can warn.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("claude-2", "Claude 3.5 Sonnet"),
    ("claude-2.1", "Claude 3.5 Sonnet v2"),
    ("claude-instant", "Claude 3.5 Haiku"),
    ("claude-3-sonnet", "Claude 3.5 Sonnet"),
    ("llama2-70b", "Llama 3.3 70B Instruct"),
];

/// Names that are explicitly deprecated with no live replacement.
///
/// Resolution fails as `Deprecated` instead of silently mapping these to a
/// model with different behavior.
const DEPRECATED_NAMES: &[&str] = &["claude-v1", "claude-instant-v1", "titan-text-lite"];

/// The legacy alias table, exposed for catalog consistency checks
#[must_use]
pub fn legacy_alias_table() -> &'static [(&'static str, &'static str)] {
    LEGACY_ALIASES
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalize a model name for comparison.
///
/// Rules, applied in order:
/// 1. lowercase the string;
/// 2. replace each `-`, `_`, `.` with a single space;
/// 3. split on whitespace, dropping empty tokens;
/// 4. merge every run of consecutive tokens that are each exactly one digit
///    character into one concatenated token (`"3","5"` → `"35"`); tokens of
///    two or more digits never merge with a neighbor;
/// 5. re-join with single spaces.
///
/// The function is idempotent and maps empty/whitespace-only input to `""`.
#[must_use]
pub fn normalize_model_name(input: &str) -> String {
    let folded: String = input
        .to_lowercase()
        .chars()
        .map(|c| if matches!(c, '-' | '_' | '.') { ' ' } else { c })
        .collect();

    let tokens: Vec<&str> = folded.split_whitespace().collect();

    let mut merged: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if is_single_digit(tokens[i]) {
            let mut run = String::from(tokens[i]);
            let mut j = i + 1;
            while j < tokens.len() && is_single_digit(tokens[j]) {
                run.push_str(tokens[j]);
                j += 1;
            }
            merged.push(run);
            i = j;
        } else {
            merged.push(tokens[i].to_string());
            i += 1;
        }
    }

    merged.join(" ")
}

fn is_single_digit(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_digit())
}

// ============================================================================
// Edit Distance
// ============================================================================

/// Levenshtein edit distance, single-row DP for O(min(m,n)) space
fn levenshtein(a: &str, b: &str) -> usize {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let n = b_bytes.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, &a_byte) in a_bytes.iter().enumerate() {
        curr[0] = i + 1;
        for j in 1..=n {
            let cost = usize::from(a_byte != b_bytes[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalized similarity (0.0 = completely different, 1.0 = identical)
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

// ============================================================================
// Resolution Results
// ============================================================================

/// How a name was matched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchType {
    /// Input equals a canonical name byte-for-byte
    Exact,
    /// Input hit the alias (or legacy alias) table
    Alias,
    /// Input matched after normalization
    Normalized,
    /// Input matched by similarity above the floor
    Fuzzy,
}

/// A successful resolution
#[derive(Clone, Debug, PartialEq)]
pub struct NameMatch {
    /// Canonical catalog name
    pub canonical: String,
    /// How the match was made
    pub match_type: MatchType,
    /// Match confidence (1.0 for exact/alias, similarity score for fuzzy)
    pub confidence: f64,
    /// True when the input came from a superseded naming scheme
    pub legacy_name_found: bool,
}

/// Why resolution failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    /// No canonical name matched at any step
    NotFound,
    /// Multiple canonical names tied after normalization
    Ambiguous,
    /// The name is explicitly deprecated with no live mapping
    Deprecated,
    /// Empty or whitespace-only input
    InvalidInput,
}

/// A failed resolution, with ranked suggestions
#[derive(Clone, Debug, Error, PartialEq)]
#[error("could not resolve model name {input:?} ({kind:?}); suggestions: {suggestions:?}")]
pub struct ResolutionError {
    /// Failure category
    pub kind: ResolutionErrorKind,
    /// The offending input
    pub input: String,
    /// Up to three "did you mean" names
    pub suggestions: Vec<String>,
    /// Similarity-ranked canonical names
    pub similar_models: Vec<String>,
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolve `input` against the catalog's canonical names.
///
/// # Errors
///
/// Returns a [`ResolutionError`] describing why no canonical name matched;
/// see [`ResolutionErrorKind`].
pub fn resolve_name(canonical_names: &[String], input: &str) -> Result<NameMatch, ResolutionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ResolutionError {
            kind: ResolutionErrorKind::InvalidInput,
            input: input.to_string(),
            suggestions: Vec::new(),
            similar_models: Vec::new(),
        });
    }

    // 1. Exact canonical match
    if canonical_names.iter().any(|name| name == trimmed) {
        return Ok(NameMatch {
            canonical: trimmed.to_string(),
            match_type: MatchType::Exact,
            confidence: 1.0,
            legacy_name_found: false,
        });
    }

    // 2. Alias table: current aliases, then legacy names, then deprecated
    let lowered = trimmed.to_lowercase();
    for &(alias, canonical) in ALIASES {
        if alias == lowered && canonical_names.iter().any(|n| n == canonical) {
            return Ok(NameMatch {
                canonical: canonical.to_string(),
                match_type: MatchType::Alias,
                confidence: 1.0,
                legacy_name_found: false,
            });
        }
    }
    for &(alias, canonical) in LEGACY_ALIASES {
        if alias == lowered && canonical_names.iter().any(|n| n == canonical) {
            tracing::debug!(input = trimmed, canonical, "legacy model name resolved");
            return Ok(NameMatch {
                canonical: canonical.to_string(),
                match_type: MatchType::Alias,
                confidence: 1.0,
                legacy_name_found: true,
            });
        }
    }
    if DEPRECATED_NAMES.contains(&lowered.as_str()) {
        return Err(failure(ResolutionErrorKind::Deprecated, input, canonical_names));
    }

    // 3. Normalized match
    let normalized_input = normalize_model_name(trimmed);
    let normalized_hits: Vec<&String> = canonical_names
        .iter()
        .filter(|name| normalize_model_name(name) == normalized_input)
        .collect();
    match normalized_hits.as_slice() {
        [single] => {
            return Ok(NameMatch {
                canonical: (*single).clone(),
                match_type: MatchType::Normalized,
                confidence: NORMALIZED_CONFIDENCE,
                legacy_name_found: false,
            });
        }
        [] => {}
        ties => {
            return Err(ResolutionError {
                kind: ResolutionErrorKind::Ambiguous,
                input: input.to_string(),
                suggestions: ties.iter().map(|s| (*s).clone()).collect(),
                similar_models: ties.iter().map(|s| (*s).clone()).collect(),
            });
        }
    }

    // 4. Fuzzy match over normalized forms
    let mut best: Option<(&String, f64)> = None;
    for name in canonical_names {
        let score = similarity(&normalized_input, &normalize_model_name(name));
        let better = match best {
            Some((_, best_score)) => score > best_score,
            None => true,
        };
        if better {
            best = Some((name, score));
        }
    }
    if let Some((name, score)) = best {
        if score >= FUZZY_FLOOR {
            return Ok(NameMatch {
                canonical: name.clone(),
                match_type: MatchType::Fuzzy,
                confidence: score,
                legacy_name_found: false,
            });
        }
    }

    Err(failure(ResolutionErrorKind::NotFound, input, canonical_names))
}

/// Rank canonical names by similarity to `input`, best first
fn ranked_similar(canonical_names: &[String], input: &str) -> Vec<(String, f64)> {
    let normalized_input = normalize_model_name(input);
    let mut scored: Vec<(String, f64)> = canonical_names
        .iter()
        .map(|name| {
            let score = similarity(&normalized_input, &normalize_model_name(name));
            (name.clone(), score)
        })
        .filter(|(_, score)| *score >= SUGGESTION_FLOOR)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

fn failure(
    kind: ResolutionErrorKind,
    input: &str,
    canonical_names: &[String],
) -> ResolutionError {
    let ranked = ranked_similar(canonical_names, input);
    ResolutionError {
        kind,
        input: input.to_string(),
        suggestions: ranked
            .iter()
            .take(MAX_SUGGESTIONS)
            .map(|(name, _)| name.clone())
            .collect(),
        similar_models: ranked
            .into_iter()
            .take(MAX_SIMILAR)
            .map(|(name, _)| name)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<String> {
        [
            "Claude 3.5 Haiku",
            "Claude 3.5 Sonnet",
            "Claude 3.5 Sonnet v2",
            "Claude Sonnet 4",
            "Claude Opus 4",
            "Nova Pro",
            "Llama 3.3 70B Instruct",
            "Mistral Large 2402",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    // ===================
    // Normalization
    // ===================

    #[test]
    fn test_normalize_spec_examples() {
        assert_eq!(normalize_model_name("Claude 3.5 Sonnet"), "claude 35 sonnet");
        assert_eq!(
            normalize_model_name("Claude 4 5 20251001"),
            "claude 45 20251001"
        );
        assert_eq!(normalize_model_name("---"), "");
    }

    #[test]
    fn test_normalize_separator_folding() {
        assert_eq!(normalize_model_name("claude-3-5-sonnet"), "claude 35 sonnet");
        assert_eq!(normalize_model_name("claude_3_5_sonnet"), "claude 35 sonnet");
        assert_eq!(normalize_model_name("Claude.3.5.Sonnet"), "claude 35 sonnet");
    }

    #[test]
    fn test_normalize_multi_digit_tokens_never_merge() {
        // "35" is two digits and must not merge with the neighboring "7"
        assert_eq!(normalize_model_name("model 35 7"), "model 35 7");
        assert_eq!(normalize_model_name("llama 3.3 70b"), "llama 33 70b");
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "Claude 3.5 Sonnet",
            "Claude 4 5 20251001",
            "LLAMA-3.3_70B",
            "  spaced   out  ",
            "---",
            "",
            "a.b-c_d",
            "1 2 3 4 5",
        ];
        for input in inputs {
            let once = normalize_model_name(input);
            assert_eq!(normalize_model_name(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_normalize_case_insensitive() {
        let input = "Claude 3.5 Sonnet";
        assert_eq!(
            normalize_model_name(input),
            normalize_model_name(&input.to_uppercase())
        );
        assert_eq!(
            normalize_model_name(input),
            normalize_model_name(&input.to_lowercase())
        );
    }

    #[test]
    fn test_normalize_empty_inputs() {
        assert_eq!(normalize_model_name(""), "");
        assert_eq!(normalize_model_name("   "), "");
        assert_eq!(normalize_model_name("\t\n"), "");
    }

    #[test]
    fn test_normalize_digit_run_merging() {
        assert_eq!(normalize_model_name("1 2 3 4 5"), "12345");
        assert_eq!(normalize_model_name("v 1 2 final"), "v 12 final");
        // A lone digit stays a lone digit
        assert_eq!(normalize_model_name("claude 4"), "claude 4");
    }

    // ===================
    // Resolution steps
    // ===================

    #[test]
    fn test_resolve_exact() {
        let result = resolve_name(&catalog(), "Claude Sonnet 4").unwrap();
        assert_eq!(result.match_type, MatchType::Exact);
        assert_eq!(result.canonical, "Claude Sonnet 4");
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert!(!result.legacy_name_found);
    }

    #[test]
    fn test_resolve_alias() {
        let result = resolve_name(&catalog(), "sonnet").unwrap();
        assert_eq!(result.match_type, MatchType::Alias);
        assert_eq!(result.canonical, "Claude Sonnet 4");
        assert!(!result.legacy_name_found);
    }

    #[test]
    fn test_resolve_legacy_alias_sets_flag() {
        let result = resolve_name(&catalog(), "claude-2").unwrap();
        assert_eq!(result.match_type, MatchType::Alias);
        assert_eq!(result.canonical, "Claude 3.5 Sonnet");
        assert!(result.legacy_name_found);
    }

    #[test]
    fn test_resolve_deprecated_fails_with_suggestions() {
        let err = resolve_name(&catalog(), "claude-instant-v1").unwrap_err();
        assert_eq!(err.kind, ResolutionErrorKind::Deprecated);
        assert!(!err.suggestions.is_empty());
    }

    #[test]
    fn test_resolve_normalized() {
        let result = resolve_name(&catalog(), "claude-3-5-sonnet").unwrap();
        assert_eq!(result.match_type, MatchType::Normalized);
        assert_eq!(result.canonical, "Claude 3.5 Sonnet");
    }

    #[test]
    fn test_resolve_normalized_ambiguous() {
        let mut names = catalog();
        // Two canonical names that normalize identically
        names.push("claude 35 sonnet".to_string());
        let err = resolve_name(&names, "CLAUDE_3.5_SONNET").unwrap_err();
        assert_eq!(err.kind, ResolutionErrorKind::Ambiguous);
        assert_eq!(err.suggestions.len(), 2);
    }

    #[test]
    fn test_resolve_fuzzy_typo() {
        let result = resolve_name(&catalog(), "claude 3.5 sonet").unwrap();
        assert_eq!(result.match_type, MatchType::Fuzzy);
        assert_eq!(result.canonical, "Claude 3.5 Sonnet");
        assert!(result.confidence >= FUZZY_FLOOR);
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn test_resolve_invalid_input() {
        for input in ["", "   ", "\t"] {
            let err = resolve_name(&catalog(), input).unwrap_err();
            assert_eq!(err.kind, ResolutionErrorKind::InvalidInput, "input: {input:?}");
        }
    }

    #[test]
    fn test_resolve_not_found() {
        let err = resolve_name(&catalog(), "gpt-4o").unwrap_err();
        assert_eq!(err.kind, ResolutionErrorKind::NotFound);
    }

    #[test]
    fn test_not_found_suggestions_are_ranked() {
        let err = resolve_name(&catalog(), "claude xx").unwrap_err();
        // Even on failure the closest real names come back, best first
        assert!(err.suggestions.len() <= 3);
        assert!(err.similar_models.len() <= 5);
        if !err.suggestions.is_empty() {
            assert!(err.suggestions[0].contains("Claude"));
        }
    }

    #[test]
    fn test_resolve_repeated_calls_consistent() {
        let names = catalog();
        for &(alias, _) in legacy_alias_table() {
            let first = resolve_name(&names, alias).unwrap();
            let second = resolve_name(&names, alias).unwrap();
            assert_eq!(first, second);
            assert!(!first.canonical.is_empty());
        }
    }

    // ===================
    // Edit distance
    // ===================

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("abc", "abd"), 1);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_similarity_bounds() {
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
        assert!((similarity("same", "same") - 1.0).abs() < f64::EPSILON);
        assert!(similarity("abcd", "wxyz") < 0.01);
    }
}
