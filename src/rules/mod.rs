//! Rule evaluator: boolean condition trees over a flat user profile.
//!
//! Used to gate content items and to compute a weighted match score that
//! acts as a secondary admission threshold.

pub mod evaluator;
pub mod model;

pub use evaluator::{evaluate, evaluate_condition, score};
pub use model::{
    ConditionRule, DEFAULT_RULE_WEIGHT, Logic, MAX_RULE_DEPTH, Operator, RuleGroup, RuleNode,
    RuleValue, UserProfile,
};
