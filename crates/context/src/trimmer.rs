//! Constraint trimmer for the rules layer.
//!
//! Constraints render in a fixed order:
//!
//! 1. origin: every `user` item before every `kg` item
//! 2. `priority` descending
//! 3. `updatedAt` descending
//! 4. `id` ascending
//!
//! Under budget pressure, degradable items are dropped from the end of that
//! order. Non-degradable items always stay, even if the layer stays over
//! budget.

use std::cmp::Ordering;

use ctxloom_core::{ConstraintItem, ConstraintSource, ConstraintTrimLog, estimate_tokens};

/// Header line of the rendered constraint block.
pub const RULES_CONSTRAINT_HEADER: &str = "[创作约束 - 不可违反]";

/// Result of fitting the rules layer into its allocation.
#[derive(Debug, Clone)]
pub struct TrimOutcome {
    pub content: String,
    pub token_count: usize,
    pub kept: Vec<ConstraintItem>,
    pub logs: Vec<ConstraintTrimLog>,
}

fn origin_rank(source: ConstraintSource) -> u8 {
    match source {
        ConstraintSource::User => 0,
        ConstraintSource::Kg => 1,
    }
}

/// Total order used for rendering and trimming.
pub fn compare_constraints(left: &ConstraintItem, right: &ConstraintItem) -> Ordering {
    origin_rank(left.source)
        .cmp(&origin_rank(right.source))
        .then_with(|| right.priority.cmp(&left.priority))
        .then_with(|| right.updated_at.cmp(&left.updated_at))
        .then_with(|| left.id.cmp(&right.id))
}

/// Trim ids and text, drop blank items, and sort.
pub fn normalize_constraints(constraints: Vec<ConstraintItem>) -> Vec<ConstraintItem> {
    let mut items: Vec<ConstraintItem> = constraints
        .into_iter()
        .map(|mut item| {
            item.id = item.id.trim().to_string();
            item.text = item.text.trim().to_string();
            item
        })
        .filter(|item| !item.id.is_empty() && !item.text.is_empty())
        .collect();
    items.sort_by(compare_constraints);
    items
}

/// Render the constraint block. Empty when there are no constraints.
pub fn render_constraint_block(constraints: &[ConstraintItem]) -> String {
    if constraints.is_empty() {
        return String::new();
    }

    let mut block = String::from(RULES_CONSTRAINT_HEADER);
    for (index, item) in constraints.iter().enumerate() {
        block.push('\n');
        block.push_str(&format!(
            "{}. {}  # source={}, priority={}",
            index + 1,
            item.text,
            item.source,
            item.priority
        ));
    }
    block
}

/// Base rules text, a blank line, then the constraint block.
pub fn compose_rules(base_content: &str, constraints: &[ConstraintItem]) -> String {
    let block = render_constraint_block(constraints);
    [base_content.trim(), block.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Drop degradable constraints from the end of the order until the rules
/// layer fits `max_tokens` or nothing droppable is left.
///
/// `constraints` must already be normalized.
pub fn trim_to_budget(
    base_content: &str,
    constraints: &[ConstraintItem],
    max_tokens: usize,
) -> TrimOutcome {
    let mut kept = constraints.to_vec();
    let mut logs = Vec::new();
    let mut content = compose_rules(base_content, &kept);
    let mut token_count = estimate_tokens(&content);

    while token_count > max_tokens {
        let Some(index) = kept.iter().rposition(|item| item.degradable) else {
            break;
        };

        let dropped = kept.remove(index);
        let before = token_count;
        content = compose_rules(base_content, &kept);
        token_count = estimate_tokens(&content);

        logs.push(ConstraintTrimLog {
            constraint_id: dropped.id,
            reason: dropped.source.into(),
            token_freed: before.saturating_sub(token_count),
        });
    }

    TrimOutcome {
        content,
        token_count,
        kept,
        logs,
    }
}
