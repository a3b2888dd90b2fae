//! Conversation flow model: states, transitions, objection counters.
//!
//! A [`StateMachineConfig`] is authored offline, loaded once per flow and
//! never mutated. The per-session [`StateMachineContext`] is the only thing
//! that changes between turns.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::ObjectionType;
use crate::error::ConfigError;
use crate::rules::UserProfile;

/// Confidence an extraction needs before it is merged into the profile.
pub const DEFAULT_MIN_EXTRACTION_CONFIDENCE: f64 = 0.6;

/// Profile key consulted by `intent_set` transitions.
pub const INTENT_FIELD: &str = "intent";

/// Conversation purpose. Gates states and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Buy,
    Sell,
    Browse,
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Browse => "browse",
        };
        write!(f, "{s}")
    }
}

/// State type. Only the terminal markers carry meaning for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StateType {
    DataCollection,
    LeadCapture,
    Completion,
    /// Any other authored type (e.g. `objection_handling`), kept verbatim.
    Custom(String),
}

impl StateType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LeadCapture | Self::Completion)
    }
}

impl From<String> for StateType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "data_collection" => Self::DataCollection,
            "lead_capture" => Self::LeadCapture,
            "completion" => Self::Completion,
            _ => Self::Custom(s),
        }
    }
}

impl From<StateType> for String {
    fn from(t: StateType) -> Self {
        t.to_string()
    }
}

impl std::fmt::Display for StateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataCollection => write!(f, "data_collection"),
            Self::LeadCapture => write!(f, "lead_capture"),
            Self::Completion => write!(f, "completion"),
            Self::Custom(s) => write!(f, "{s}"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A field a state tries to collect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub mapping_key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_hint: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

impl FieldSpec {
    pub fn required(mapping_key: &str, label: &str) -> Self {
        Self {
            mapping_key: mapping_key.to_string(),
            label: label.to_string(),
            extraction_hint: None,
            required: true,
        }
    }

    pub fn optional(mapping_key: &str, label: &str) -> Self {
        Self {
            required: false,
            ..Self::required(mapping_key, label)
        }
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.extraction_hint = Some(hint.to_string());
        self
    }
}

/// When a transition may fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionCondition {
    /// Every listed key is present. An empty list means the state's required
    /// `collects` keys.
    DataCollected {
        #[serde(default)]
        fields: Vec<String>,
    },
    /// At least one listed key is present. An empty list means any of the
    /// state's `collects` keys.
    AnyDataCollected {
        #[serde(default)]
        fields: Vec<String>,
    },
    /// The profile's `intent` value is one of these.
    IntentSet { intents: Vec<String> },
    Always,
    /// The state has been attempted at least this many times.
    MaxAttemptsReached {
        #[serde(rename = "maxAttempts")]
        max_attempts: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub condition: TransitionCondition,
    pub target_state_id: String,
    #[serde(default)]
    pub priority: i32,
}

/// Scripted reply to a user's objection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectionCounter {
    pub objection_type: ObjectionType,
    pub response: String,
    /// Used instead of `response` when the objection recurs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_response: Option<String>,
}

/// One node of the conversation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub id: String,
    pub order: i32,
    #[serde(rename = "type")]
    pub state_type: StateType,
    /// What the state is trying to learn, in plain words (for the classifier).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub prompt_variants: Vec<String>,
    #[serde(default)]
    pub collects: Vec<FieldSpec>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub objection_counters: Vec<ObjectionCounter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if_data_exists: Option<bool>,
}

impl ConversationState {
    pub fn new(id: &str, order: i32, state_type: StateType, prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            order,
            state_type,
            goal: None,
            prompt: prompt.to_string(),
            prompt_variants: Vec::new(),
            collects: Vec::new(),
            transitions: Vec::new(),
            objection_counters: Vec::new(),
            skip_if_data_exists: None,
        }
    }

    pub fn with_collects(mut self, collects: Vec<FieldSpec>) -> Self {
        self.collects = collects;
        self
    }

    pub fn with_transition(
        mut self,
        condition: TransitionCondition,
        target_state_id: &str,
        priority: i32,
    ) -> Self {
        self.transitions.push(Transition {
            condition,
            target_state_id: target_state_id.to_string(),
            priority,
        });
        self
    }

    pub fn with_prompt_variants(mut self, variants: &[&str]) -> Self {
        self.prompt_variants = variants.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_objection_counter(mut self, counter: ObjectionCounter) -> Self {
        self.objection_counters.push(counter);
        self
    }

    /// Mapping keys of the required fields this state collects.
    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.collects
            .iter()
            .filter(|f| f.required)
            .map(|f| f.mapping_key.as_str())
    }

    /// Whether every required field of this state is in the profile.
    pub fn required_collected(&self, profile: &UserProfile) -> bool {
        self.required_keys().all(|key| profile.contains_key(key))
    }
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_EXTRACTION_CONFIDENCE
}

/// The static graph for one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineConfig {
    pub flow: Flow,
    pub initial_state_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_capture_state_id: Option<String>,
    pub states: Vec<ConversationState>,
    #[serde(default)]
    pub global_objection_counters: Vec<ObjectionCounter>,
    /// Jump over states whose required data is already known.
    #[serde(default = "default_true")]
    pub skip_completed_states: bool,
    #[serde(default = "default_min_confidence")]
    pub min_extraction_confidence: f64,
}

impl StateMachineConfig {
    pub fn new(flow: Flow, initial_state_id: &str, states: Vec<ConversationState>) -> Self {
        Self {
            flow,
            initial_state_id: initial_state_id.to_string(),
            lead_capture_state_id: None,
            states,
            global_objection_counters: Vec::new(),
            skip_completed_states: true,
            min_extraction_confidence: DEFAULT_MIN_EXTRACTION_CONFIDENCE,
        }
    }

    /// Look up a state by id.
    pub fn state(&self, id: &str) -> Option<&ConversationState> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Every collectable field across the flow, first occurrence wins, in
    /// state order.
    pub fn field_catalog(&self) -> Vec<&FieldSpec> {
        let mut states: Vec<&ConversationState> = self.states.iter().collect();
        states.sort_by_key(|s| s.order);

        let mut seen = std::collections::HashSet::new();
        states
            .into_iter()
            .flat_map(|s| s.collects.iter())
            .filter(|f| seen.insert(f.mapping_key.as_str()))
            .collect()
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load a flow from disk. `.yaml`/`.yml` files are YAML, anything else JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let parsed = if crate::config::is_yaml_path(path) {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        parsed.map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: display,
                message,
            },
            other => other,
        })
    }
}

/// Mutable per-session state threaded through every turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineContext {
    pub current_state_id: String,
    #[serde(default)]
    pub user_input: UserProfile,
    #[serde(default)]
    pub state_attempts: HashMap<String, u32>,
    /// How many times each objection type has come up this session.
    #[serde(default)]
    pub objection_attempts: HashMap<ObjectionType, u32>,
}

impl StateMachineContext {
    /// Fresh context positioned at the flow's initial state.
    pub fn new(config: &StateMachineConfig) -> Self {
        Self {
            current_state_id: config.initial_state_id.clone(),
            ..Default::default()
        }
    }

    pub fn attempts(&self, state_id: &str) -> u32 {
        self.state_attempts.get(state_id).copied().unwrap_or(0)
    }
}

/// Outcome of applying one turn's extractions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancementResult {
    pub previous_state_id: String,
    pub new_state_id: String,
    /// The updated context. The caller persists this.
    pub context: StateMachineContext,
    /// Keys merged into the profile this turn.
    pub fields_collected: Vec<String>,
    /// States jumped over because their data was already known.
    pub skipped_states: Vec<String>,
    pub is_complete: bool,
    pub progress: u8,
}
