//! Classification vocabulary and result types.

use serde::{Deserialize, Serialize};

/// Default intent confidence when the model omits one.
pub const DEFAULT_INTENT_CONFIDENCE: f64 = 0.5;

/// Default per-extraction confidence when the model omits one.
pub const DEFAULT_EXTRACTION_CONFIDENCE: f64 = 0.7;

/// What the user was doing with their latest message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryIntent {
    DirectAnswer,
    MultiAnswer,
    ClarificationQuestion,
    Objection,
    Chitchat,
    OffTopic,
    ChangePreviousAnswer,
    EscalationRequest,
    AttemptedAnswerButUnclear,
}

impl PrimaryIntent {
    pub const ALL: [PrimaryIntent; 9] = [
        Self::DirectAnswer,
        Self::MultiAnswer,
        Self::ClarificationQuestion,
        Self::Objection,
        Self::Chitchat,
        Self::OffTopic,
        Self::ChangePreviousAnswer,
        Self::EscalationRequest,
        Self::AttemptedAnswerButUnclear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectAnswer => "direct_answer",
            Self::MultiAnswer => "multi_answer",
            Self::ClarificationQuestion => "clarification_question",
            Self::Objection => "objection",
            Self::Chitchat => "chitchat",
            Self::OffTopic => "off_topic",
            Self::ChangePreviousAnswer => "change_previous_answer",
            Self::EscalationRequest => "escalation_request",
            Self::AttemptedAnswerButUnclear => "attempted_answer_but_unclear",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == s)
    }
}

impl std::fmt::Display for PrimaryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of reluctance the user expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectionType {
    PrivacyRefusal,
    TrustIssue,
    TimeConstraint,
    PriceSensitivity,
    NotReady,
}

impl ObjectionType {
    pub const ALL: [ObjectionType; 5] = [
        Self::PrivacyRefusal,
        Self::TrustIssue,
        Self::TimeConstraint,
        Self::PriceSensitivity,
        Self::NotReady,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrivacyRefusal => "privacy_refusal",
            Self::TrustIssue => "trust_issue",
            Self::TimeConstraint => "time_constraint",
            Self::PriceSensitivity => "price_sensitivity",
            Self::NotReady => "not_ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_str() == s)
    }
}

impl std::fmt::Display for ObjectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tone the model suggests for the next reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Empathetic,
    Firm,
    Playful,
    Educational,
}

impl Tone {
    pub const ALL: [Tone; 4] = [Self::Empathetic, Self::Firm, Self::Playful, Self::Educational];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empathetic => "empathetic",
            Self::Firm => "firm",
            Self::Playful => "playful",
            Self::Educational => "educational",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentClassification {
    pub primary: PrimaryIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objection: Option<ObjectionType>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_tone: Option<Tone>,
}

/// One extracted field value. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionItem {
    pub mapping_key: String,
    pub value: String,
    pub confidence: f64,
}

impl ExtractionItem {
    pub fn new(mapping_key: &str, value: &str, confidence: f64) -> Self {
        Self {
            mapping_key: mapping_key.to_string(),
            value: value.to_string(),
            confidence,
        }
    }
}

/// The user explicitly changed an earlier answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub mapping_key: String,
    pub new_value: String,
}

/// Everything one classification call produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub intent: IntentClassification,
    pub extracted: Vec<ExtractionItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<Correction>,
}

impl ClassificationResult {
    /// Result used whenever the model output can't be used: treat the turn
    /// as a clarification with nothing extracted.
    pub fn fallback() -> Self {
        Self {
            intent: IntentClassification {
                primary: PrimaryIntent::ClarificationQuestion,
                objection: None,
                confidence: DEFAULT_INTENT_CONFIDENCE,
                suggested_tone: None,
            },
            extracted: Vec::new(),
            correction: None,
        }
    }
}
