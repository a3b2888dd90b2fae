//! Content catalog model.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flow::Flow;
use crate::rules::RuleGroup;

/// Match score required when an item does not declare one.
pub const DEFAULT_MIN_MATCH_SCORE: f64 = 0.5;

/// What kind of supporting content an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Advice,
    ActionStep,
}

/// Applicability gate for a content item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicableWhen {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<Vec<Flow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_groups: Option<Vec<RuleGroup>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_match_score: Option<f64>,
}

impl ApplicableWhen {
    pub fn min_match_score(&self) -> f64 {
        self.min_match_score.unwrap_or(DEFAULT_MIN_MATCH_SCORE)
    }
}

/// An advice item or action step shown alongside a conversation state.
///
/// `payload` is display data the matcher never looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub kind: ContentKind,
    pub title: String,
    /// Lower numbers rank first among equal scores.
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicable_when: Option<ApplicableWhen>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ContentItem {
    pub fn new(id: &str, kind: ContentKind, title: &str, priority: i32) -> Self {
        Self {
            id: id.to_string(),
            kind,
            title: title.to_string(),
            priority,
            applicable_when: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_applicable_when(mut self, applicable_when: ApplicableWhen) -> Self {
        self.applicable_when = Some(applicable_when);
        self
    }
}

/// Load a content catalog (a list of items) from YAML or JSON.
///
/// Files ending in `.yaml` or `.yml` are read as YAML, everything else as JSON.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<ContentItem>, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;

    if crate::config::is_yaml_path(path) {
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: display,
            message: e.to_string(),
        })
    } else {
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: display,
            message: e.to_string(),
        })
    }
}
