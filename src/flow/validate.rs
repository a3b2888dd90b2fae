//! Advisory lint for flow configs.
//!
//! The engine tolerates every problem reported here (unknown targets are
//! no-ops, the cascade is bounded), so nothing calls this on the hot path.
//! It exists to catch authoring mistakes before a flow goes live.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::model::{ObjectionCounter, StateMachineConfig};

/// One problem found in a flow config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigIssue {
    DuplicateStateId { state_id: String },
    UnknownInitialState { state_id: String },
    UnknownLeadCaptureState { state_id: String },
    UnknownTransitionTarget { from: String, target: String },
    DuplicateOrder { order: i32, state_ids: Vec<String> },
    DuplicateObjectionCounter { scope: String, objection: String },
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateStateId { state_id } => write!(f, "state id '{state_id}' is declared more than once"),
            Self::UnknownInitialState { state_id } => write!(f, "initial state '{state_id}' does not exist"),
            Self::UnknownLeadCaptureState { state_id } => {
                write!(f, "lead capture state '{state_id}' does not exist")
            }
            Self::UnknownTransitionTarget { from, target } => {
                write!(f, "state '{from}' transitions to unknown state '{target}'")
            }
            Self::DuplicateOrder { order, state_ids } => {
                write!(f, "order {order} is shared by {}", state_ids.join(", "))
            }
            Self::DuplicateObjectionCounter { scope, objection } => {
                write!(f, "{scope} has more than one counter for '{objection}'")
            }
        }
    }
}

fn duplicate_counters(scope: &str, counters: &[ObjectionCounter], issues: &mut Vec<ConfigIssue>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for counter in counters {
        if !seen.insert(counter.objection_type) && reported.insert(counter.objection_type) {
            issues.push(ConfigIssue::DuplicateObjectionCounter {
                scope: scope.to_string(),
                objection: counter.objection_type.to_string(),
            });
        }
    }
}

/// Check a flow config for authoring mistakes. An empty result means clean.
pub fn validate(config: &StateMachineConfig) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    let mut ids = HashSet::new();
    let mut reported_ids = HashSet::new();
    for state in &config.states {
        if !ids.insert(state.id.as_str()) && reported_ids.insert(state.id.as_str()) {
            issues.push(ConfigIssue::DuplicateStateId {
                state_id: state.id.clone(),
            });
        }
    }

    if !ids.contains(config.initial_state_id.as_str()) {
        issues.push(ConfigIssue::UnknownInitialState {
            state_id: config.initial_state_id.clone(),
        });
    }
    if let Some(ref lead) = config.lead_capture_state_id
        && !ids.contains(lead.as_str())
    {
        issues.push(ConfigIssue::UnknownLeadCaptureState {
            state_id: lead.clone(),
        });
    }

    for state in &config.states {
        for transition in &state.transitions {
            if !ids.contains(transition.target_state_id.as_str()) {
                issues.push(ConfigIssue::UnknownTransitionTarget {
                    from: state.id.clone(),
                    target: transition.target_state_id.clone(),
                });
            }
        }
    }

    let mut by_order: HashMap<i32, Vec<String>> = HashMap::new();
    for state in &config.states {
        by_order.entry(state.order).or_default().push(state.id.clone());
    }
    let mut shared: Vec<(i32, Vec<String>)> = by_order
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .collect();
    shared.sort_by_key(|(order, _)| *order);
    for (order, state_ids) in shared {
        issues.push(ConfigIssue::DuplicateOrder { order, state_ids });
    }

    for state in &config.states {
        duplicate_counters(&format!("state '{}'", state.id), &state.objection_counters, &mut issues);
    }
    duplicate_counters("global counters", &config.global_objection_counters, &mut issues);

    issues
}
