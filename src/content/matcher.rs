//! Ranks a content catalog against a profile and flow.

use serde::Serialize;
use tracing::debug;

use super::model::ContentItem;
use crate::flow::Flow;
use crate::rules::{self, UserProfile};

/// A catalog item admitted by [`match_content`], with its match score.
#[derive(Debug, Clone, Serialize)]
pub struct ContentMatch<'a> {
    pub item: &'a ContentItem,
    pub score: f64,
}

/// Score an item, or `None` if it is not applicable.
///
/// Items without `applicableWhen`, or without rule groups, are universally
/// applicable with a score of 1.0.
fn admit(item: &ContentItem, profile: &UserProfile, flow: Flow) -> Option<f64> {
    let Some(when) = item.applicable_when.as_ref() else {
        return Some(1.0);
    };

    if let Some(flows) = &when.flow
        && !flows.contains(&flow)
    {
        return None;
    }

    let groups = match when.rule_groups.as_deref() {
        None | Some([]) => return Some(1.0),
        Some(groups) => groups,
    };

    if !groups.iter().all(|group| rules::evaluate(group, profile)) {
        return None;
    }

    let score = rules::score(groups, profile);
    if score < when.min_match_score() {
        debug!(
            id = %item.id,
            score,
            min = when.min_match_score(),
            "Content item below minimum match score"
        );
        return None;
    }
    Some(score)
}

/// Select up to `limit` applicable items, best first.
///
/// Ordered by score descending, then by ascending declared priority. The sort
/// is stable, so full ties keep catalog order.
pub fn match_content<'a>(
    catalog: &'a [ContentItem],
    profile: &UserProfile,
    flow: Flow,
    limit: usize,
) -> Vec<ContentMatch<'a>> {
    let mut matches: Vec<ContentMatch<'a>> = catalog
        .iter()
        .filter_map(|item| admit(item, profile, flow).map(|score| ContentMatch { item, score }))
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.item.priority.cmp(&b.item.priority))
    });
    matches.truncate(limit);

    debug!(
        flow = %flow,
        catalog = catalog.len(),
        matched = matches.len(),
        "Content matched"
    );
    matches
}
