//! Rule tree data model.
//!
//! Rule trees are authored offline (YAML or JSON) and never mutated at
//! runtime. A node is either a leaf [`ConditionRule`] or a nested
//! [`RuleGroup`]; the two are told apart by the presence of a `logic` key.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Collected user data, keyed by mapping key.
///
/// Ordered so that prompts and serialized snapshots are deterministic.
pub type UserProfile = BTreeMap<String, String>;

/// Weight applied to a rule that does not declare one.
pub const DEFAULT_RULE_WEIGHT: f64 = 5.0;

/// Deepest group nesting accepted when loading a rule tree.
pub const MAX_RULE_DEPTH: usize = 16;

/// Comparison applied by a [`ConditionRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Includes,
    GreaterThan,
    LessThan,
    Between,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Includes => "includes",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Between => "between",
        };
        write!(f, "{s}")
    }
}

/// Right-hand side of a condition: a single string or a list of strings.
///
/// Authored numbers and booleans are kept in their string form so that
/// `budget: 400000` and `budget: "400000"` mean the same thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum RuleValue {
    One(String),
    Many(Vec<String>),
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl TryFrom<Value> for RuleValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| format!("unsupported list element in rule value: {item}"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(RuleValue::Many),
            other => scalar_to_string(&other)
                .map(RuleValue::One)
                .ok_or_else(|| format!("unsupported rule value: {other}")),
        }
    }
}

impl From<RuleValue> for Value {
    fn from(value: RuleValue) -> Self {
        match value {
            RuleValue::One(s) => Value::String(s),
            RuleValue::Many(items) => Value::Array(items.into_iter().map(Value::String).collect()),
        }
    }
}

impl From<&str> for RuleValue {
    fn from(s: &str) -> Self {
        Self::One(s.to_string())
    }
}

impl From<Vec<&str>> for RuleValue {
    fn from(items: Vec<&str>) -> Self {
        Self::Many(items.into_iter().map(String::from).collect())
    }
}

/// A single leaf comparison against one profile field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub field: String,
    pub operator: Operator,
    pub value: RuleValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl ConditionRule {
    pub fn new(field: &str, operator: Operator, value: impl Into<RuleValue>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.into(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Declared weight, or [`DEFAULT_RULE_WEIGHT`].
    pub fn weight(&self) -> f64 {
        self.weight.unwrap_or(DEFAULT_RULE_WEIGHT)
    }
}

/// How the children of a [`RuleGroup`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

/// A node in a rule tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleNode {
    Group(RuleGroup),
    Condition(ConditionRule),
}

impl From<ConditionRule> for RuleNode {
    fn from(rule: ConditionRule) -> Self {
        Self::Condition(rule)
    }
}

impl From<RuleGroup> for RuleNode {
    fn from(group: RuleGroup) -> Self {
        Self::Group(group)
    }
}

/// Boolean combination of rule nodes.
///
/// Groups own their children, so a tree can never reference itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleGroup {
    pub logic: Logic,
    pub rules: Vec<RuleNode>,
}

impl RuleGroup {
    pub fn all(rules: Vec<RuleNode>) -> Self {
        Self {
            logic: Logic::And,
            rules,
        }
    }

    pub fn any(rules: Vec<RuleNode>) -> Self {
        Self {
            logic: Logic::Or,
            rules,
        }
    }

    /// Iterate over every leaf condition, ignoring nesting.
    pub fn leaves(&self) -> Vec<&ConditionRule> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }
}

fn collect_leaves<'a>(group: &'a RuleGroup, out: &mut Vec<&'a ConditionRule>) {
    for node in &group.rules {
        match node {
            RuleNode::Condition(rule) => out.push(rule),
            RuleNode::Group(inner) => collect_leaves(inner, out),
        }
    }
}

fn group_from_value(value: Value, depth: usize) -> Result<RuleGroup, String> {
    if depth > MAX_RULE_DEPTH {
        return Err(format!("rule groups nested deeper than {MAX_RULE_DEPTH}"));
    }
    let Value::Object(mut obj) = value else {
        return Err("rule group must be an object".into());
    };
    let logic_value = obj
        .remove("logic")
        .ok_or_else(|| "rule group is missing `logic`".to_string())?;
    let logic: Logic = serde_json::from_value(logic_value).map_err(|e| e.to_string())?;
    let rules = match obj.remove("rules") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| node_from_value(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => return Err(format!("`rules` must be a list, got {other}")),
    };
    Ok(RuleGroup { logic, rules })
}

fn node_from_value(value: Value, depth: usize) -> Result<RuleNode, String> {
    let is_group = value.as_object().is_some_and(|obj| obj.contains_key("logic"));
    if is_group {
        group_from_value(value, depth).map(RuleNode::Group)
    } else {
        serde_json::from_value::<ConditionRule>(value)
            .map(RuleNode::Condition)
            .map_err(|e| format!("invalid condition rule: {e}"))
    }
}

impl<'de> Deserialize<'de> for RuleGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        group_from_value(value, 0).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for RuleNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        node_from_value(value, 0).map_err(serde::de::Error::custom)
    }
}
