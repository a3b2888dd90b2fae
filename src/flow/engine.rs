//! State machine engine.
//!
//! Pure functions over an immutable [`StateMachineConfig`]. Nothing here
//! performs I/O or mutates its inputs; a turn's outcome is returned as a new
//! [`StateMachineContext`] inside an [`AdvancementResult`].

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::model::{
    AdvancementResult, ConversationState, INTENT_FIELD, StateMachineConfig, StateMachineContext,
    StateType, Transition, TransitionCondition,
};
use crate::classify::{ExtractionItem, ObjectionType};
use crate::rules::UserProfile;

fn condition_satisfied(
    state: &ConversationState,
    condition: &TransitionCondition,
    context: &StateMachineContext,
) -> bool {
    let profile = &context.user_input;
    match condition {
        TransitionCondition::DataCollected { fields } if fields.is_empty() => {
            state.required_collected(profile)
        }
        TransitionCondition::DataCollected { fields } => {
            fields.iter().all(|key| profile.contains_key(key))
        }
        TransitionCondition::AnyDataCollected { fields } if fields.is_empty() => state
            .collects
            .iter()
            .any(|f| profile.contains_key(&f.mapping_key)),
        TransitionCondition::AnyDataCollected { fields } => {
            fields.iter().any(|key| profile.contains_key(key))
        }
        TransitionCondition::IntentSet { intents } => profile
            .get(INTENT_FIELD)
            .is_some_and(|intent| intents.iter().any(|i| i == intent)),
        TransitionCondition::Always => true,
        TransitionCondition::MaxAttemptsReached { max_attempts } => {
            context.attempts(&state.id) >= *max_attempts
        }
    }
}

/// Pick the target of the first satisfied transition, by ascending priority.
///
/// Transitions with equal priority are tried in declaration order. `None`
/// means the caller should fall back to [`next_state_by_order`] or stay put.
pub fn evaluate_transitions<'a>(
    state: &'a ConversationState,
    context: &StateMachineContext,
) -> Option<&'a str> {
    let mut ordered: Vec<&Transition> = state.transitions.iter().collect();
    ordered.sort_by_key(|t| t.priority);

    ordered
        .into_iter()
        .find(|t| condition_satisfied(state, &t.condition, context))
        .map(|t| t.target_state_id.as_str())
}

/// The state immediately after `current_id` by `order`, if any.
pub fn next_state_by_order<'a>(
    config: &'a StateMachineConfig,
    current_id: &str,
) -> Option<&'a ConversationState> {
    let mut ordered: Vec<&ConversationState> = config.states.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let position = ordered.iter().position(|s| s.id == current_id)?;
    ordered.get(position + 1).copied()
}

/// Whether a state can be jumped over because its data is already known.
fn is_skippable(config: &StateMachineConfig, state: &ConversationState, profile: &UserProfile) -> bool {
    config.skip_completed_states
        && state.skip_if_data_exists != Some(false)
        && !state.collects.is_empty()
        && state.required_collected(profile)
}

/// Where the cascade goes from `state`, if anywhere.
///
/// States that declare no transitions advance by order once their required
/// fields are in. Terminal states never advance on their own.
fn next_target(
    config: &StateMachineConfig,
    state: &ConversationState,
    context: &StateMachineContext,
) -> Option<String> {
    if let Some(target) = evaluate_transitions(state, context) {
        return Some(target.to_string());
    }
    if state.transitions.is_empty()
        && !state.state_type.is_terminal()
        && state.required_collected(&context.user_input)
    {
        return next_state_by_order(config, &state.id).map(|s| s.id.clone());
    }
    None
}

/// Whether `state_id` ends the qualification flow.
pub fn is_complete(config: &StateMachineConfig, state_id: &str) -> bool {
    if config.lead_capture_state_id.as_deref() == Some(state_id) {
        return true;
    }
    config
        .state(state_id)
        .is_some_and(|s| s.state_type.is_terminal())
}

/// Apply one turn's extractions and advance through the graph.
///
/// 1. Count the turn as an attempt on the current state, if the flow has it.
/// 2. Merge extractions at or above the flow's confidence threshold.
/// 3. Cascade through transitions, jumping over states whose required data
///    is already present, for at most `states.len()` steps.
///
/// The input context is left untouched.
pub fn process_extraction(
    config: &StateMachineConfig,
    context: &StateMachineContext,
    extractions: &[ExtractionItem],
) -> AdvancementResult {
    let previous_state_id = context.current_state_id.clone();
    let mut next = context.clone();
    if config.state(&previous_state_id).is_some() {
        *next
            .state_attempts
            .entry(previous_state_id.clone())
            .or_insert(0) += 1;
    }

    let mut fields_collected: Vec<String> = Vec::new();
    for item in extractions {
        if item.confidence < config.min_extraction_confidence {
            debug!(
                key = %item.mapping_key,
                confidence = item.confidence,
                "Extraction below confidence threshold, not merged"
            );
            continue;
        }
        next.user_input
            .insert(item.mapping_key.clone(), item.value.clone());
        if !fields_collected.contains(&item.mapping_key) {
            fields_collected.push(item.mapping_key.clone());
        }
    }

    let bound = config.states.len();
    let mut current = previous_state_id.clone();
    let mut skipped_states: Vec<String> = Vec::new();
    let mut steps = 0;

    loop {
        if steps >= bound {
            warn!(
                state = %current,
                bound,
                "Transition cascade hit its step limit, flow graph likely has a cycle"
            );
            break;
        }
        steps += 1;

        let Some(state) = config.state(&current) else {
            debug!(state = %current, "Current state not in flow config, staying put");
            break;
        };
        let Some(target) = next_target(config, state, &next) else {
            break;
        };
        if target == current {
            break;
        }
        let Some(target_state) = config.state(&target) else {
            warn!(from = %current, to = %target, "Transition targets unknown state, ignoring");
            break;
        };

        if is_skippable(config, target_state, &next.user_input) {
            debug!(from = %current, skipped = %target, "Skipping state with data already collected");
            skipped_states.push(target.clone());
            current = target;
            continue;
        }

        debug!(from = %current, to = %target, "Transition fired");
        current = target;
        break;
    }

    // The state we land on is prompted, so it isn't "skipped".
    if skipped_states.last() == Some(&current) {
        skipped_states.pop();
    }

    if current != previous_state_id {
        next.state_attempts.insert(current.clone(), 0);
        info!(
            from = %previous_state_id,
            to = %current,
            skipped = skipped_states.len(),
            "Conversation advanced"
        );
    }
    next.current_state_id = current.clone();

    let progress = calculate_progress(config, &next.user_input);
    AdvancementResult {
        previous_state_id,
        is_complete: is_complete(config, &current),
        new_state_id: current,
        context: next,
        fields_collected,
        skipped_states,
        progress,
    }
}

/// Percentage of required data-collection fields present in `profile`.
///
/// A flow with no required fields is 100% complete.
pub fn calculate_progress(config: &StateMachineConfig, profile: &UserProfile) -> u8 {
    let required: BTreeSet<&str> = config
        .states
        .iter()
        .filter(|s| s.state_type == StateType::DataCollection)
        .flat_map(|s| s.required_keys())
        .collect();

    if required.is_empty() {
        return 100;
    }

    let present = required.iter().filter(|key| profile.contains_key(**key)).count();
    let percent = (present as f64 / required.len() as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Scripted reply for an objection.
///
/// The current state's counters win over the flow's global ones. When the
/// objection recurs (`attempt_count > 1`) a state-level counter answers with
/// its escalation response if it has one. `None` means the caller should use
/// a generic reply.
pub fn get_objection_counter<'a>(
    config: &'a StateMachineConfig,
    state_id: &str,
    objection: ObjectionType,
    attempt_count: u32,
) -> Option<&'a str> {
    let state_counter = config.state(state_id).and_then(|s| {
        s.objection_counters
            .iter()
            .find(|c| c.objection_type == objection)
    });

    if let Some(counter) = state_counter {
        if attempt_count > 1
            && let Some(escalation) = counter.escalation_response.as_deref()
        {
            return Some(escalation);
        }
        return Some(counter.response.as_str());
    }

    config
        .global_objection_counters
        .iter()
        .find(|c| c.objection_type == objection)
        .map(|c| c.response.as_str())
}

/// Prompt to show for a state after `attempt_count` previous tries.
///
/// The first ask uses the base prompt; re-asks cycle through the variants.
/// Blank or missing variants fall back to the base prompt.
pub fn get_prompt_variant(state: &ConversationState, attempt_count: u32) -> &str {
    if attempt_count == 0 || state.prompt_variants.is_empty() {
        return &state.prompt;
    }
    let index = (attempt_count as usize - 1) % state.prompt_variants.len();
    let variant = &state.prompt_variants[index];
    if variant.trim().is_empty() {
        &state.prompt
    } else {
        variant
    }
}
