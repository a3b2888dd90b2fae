//! Rule evaluation against a user profile.
//!
//! Everything here is a pure function over borrowed, immutable inputs. A
//! missing profile key or an unparseable number makes a rule false; nothing
//! in this module can fail.

use tracing::trace;

use super::model::{ConditionRule, Logic, Operator, RuleGroup, RuleNode, RuleValue, UserProfile};

/// Parse a numeric operand. Non-numeric text and NaN yield `None`.
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// Evaluate a single condition.
pub fn evaluate_condition(rule: &ConditionRule, profile: &UserProfile) -> bool {
    let Some(actual) = profile.get(&rule.field) else {
        trace!(field = %rule.field, "Profile field missing, rule is false");
        return false;
    };

    match (rule.operator, &rule.value) {
        (Operator::Equals, RuleValue::One(expected)) => actual == expected,
        (Operator::NotEquals, RuleValue::One(expected)) => actual != expected,
        (Operator::Equals | Operator::NotEquals, RuleValue::Many(_)) => false,
        (Operator::Includes, RuleValue::Many(options)) => options.iter().any(|o| o == actual),
        (Operator::Includes, RuleValue::One(expected)) => actual == expected,
        (Operator::GreaterThan | Operator::LessThan, RuleValue::One(threshold)) => {
            match (parse_number(actual), parse_number(threshold)) {
                (Some(a), Some(t)) if rule.operator == Operator::GreaterThan => a > t,
                (Some(a), Some(t)) => a < t,
                _ => {
                    trace!(
                        field = %rule.field,
                        actual = %actual,
                        threshold = %threshold,
                        "Non-numeric comparison, rule is false"
                    );
                    false
                }
            }
        }
        (Operator::GreaterThan | Operator::LessThan, RuleValue::Many(_)) => false,
        (Operator::Between, RuleValue::Many(bounds)) if bounds.len() == 2 => {
            match (
                parse_number(actual),
                parse_number(&bounds[0]),
                parse_number(&bounds[1]),
            ) {
                (Some(a), Some(min), Some(max)) => min <= a && a <= max,
                _ => {
                    trace!(field = %rule.field, actual = %actual, "Non-numeric between, rule is false");
                    false
                }
            }
        }
        (Operator::Between, _) => {
            trace!(field = %rule.field, "Malformed between bounds, rule is false");
            false
        }
    }
}

fn evaluate_node(node: &RuleNode, profile: &UserProfile) -> bool {
    match node {
        RuleNode::Condition(rule) => evaluate_condition(rule, profile),
        RuleNode::Group(group) => evaluate(group, profile),
    }
}

/// Evaluate a rule group recursively.
///
/// An empty `AND` group is true (vacuous truth) and an empty `OR` group is
/// false. Both are relied upon by authored flows.
pub fn evaluate(group: &RuleGroup, profile: &UserProfile) -> bool {
    match group.logic {
        Logic::And => group.rules.iter().all(|node| evaluate_node(node, profile)),
        Logic::Or => group.rules.iter().any(|node| evaluate_node(node, profile)),
    }
}

/// Weighted fraction of matched leaf rules across all groups.
///
/// Nesting is ignored for weighting: every leaf contributes its own weight
/// whether or not its enclosing group passed. Returns 0.0 when there is no
/// weight at all (including an empty `groups` slice).
pub fn score(groups: &[RuleGroup], profile: &UserProfile) -> f64 {
    let mut total = 0.0;
    let mut matched = 0.0;
    for rule in groups.iter().flat_map(RuleGroup::leaves) {
        let weight = rule.weight();
        total += weight;
        if evaluate_condition(rule, profile) {
            matched += weight;
        }
    }

    if total <= 0.0 {
        return 0.0;
    }
    (matched / total).clamp(0.0, 1.0)
}
