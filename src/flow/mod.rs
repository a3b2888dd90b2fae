//! Conversation state machine.
//!
//! The config graph is static; each turn feeds extractions through
//! [`process_extraction`], which merges them into the profile and advances
//! the context through as many states as the data allows.

pub mod engine;
pub mod model;
pub mod validate;

pub use engine::{
    calculate_progress, evaluate_transitions, get_objection_counter, get_prompt_variant,
    is_complete, next_state_by_order, process_extraction,
};
pub use model::{
    AdvancementResult, ConversationState, DEFAULT_MIN_EXTRACTION_CONFIDENCE, FieldSpec, Flow,
    INTENT_FIELD, ObjectionCounter, StateMachineConfig, StateMachineContext, StateType, Transition,
    TransitionCondition,
};
pub use validate::{ConfigIssue, validate};
