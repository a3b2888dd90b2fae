//! Configuration types.

use std::path::Path;

/// Tunables for the turn pipeline.
///
/// Flow-specific knobs (`skipCompletedStates`, `minExtractionConfidence`)
/// live in the flow configuration instead.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of content items returned per turn.
    pub content_limit: usize,
    /// How many recent conversation turns are sent to the classifier.
    pub context_turns: usize,
    /// Max tokens for the classification call.
    pub classifier_max_tokens: u32,
    /// Sampling temperature for the classification call.
    pub classifier_temperature: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_limit: 3,
            context_turns: 6,
            classifier_max_tokens: 1024,
            classifier_temperature: 0.1,
        }
    }
}

impl EngineConfig {
    /// Build from `LEAD_QUALIFIER_*` environment variables.
    ///
    /// Unset or unparseable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            content_limit: env_or("LEAD_QUALIFIER_CONTENT_LIMIT", defaults.content_limit),
            context_turns: env_or("LEAD_QUALIFIER_CONTEXT_TURNS", defaults.context_turns),
            classifier_max_tokens: env_or(
                "LEAD_QUALIFIER_CLASSIFIER_MAX_TOKENS",
                defaults.classifier_max_tokens,
            ),
            classifier_temperature: env_or(
                "LEAD_QUALIFIER_CLASSIFIER_TEMPERATURE",
                defaults.classifier_temperature,
            ),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment value");
            default
        }),
        Err(_) => default,
    }
}

/// Whether a config file should be parsed as YAML (by extension).
pub(crate) fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
