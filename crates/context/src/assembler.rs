//! Budget enforcement and prompt rendering over the four fetched layers.
//!
//! Two passes, in order:
//!
//! 1. **Rules allocation**: when the rules layer exceeds its allocation,
//!    `CONTEXT_RULES_OVERBUDGET` is raised and degradable constraints are
//!    dropped (see [`crate::trimmer`]).
//! 2. **Total budget**: when the four layers together exceed
//!    `totalBudgetTokens`, `retrieved`, then `settings`, then `immediate`
//!    are cut down, never below their `minimumTokens`. Rules are never cut.

use ctxloom_core::{
    BudgetProfile, ConstraintTrimLog, LayerDetail, LayerId, LayerMap, estimate_tokens,
    truncate_to_tokens,
};

use crate::degrade::{FetchedLayer, unique_non_empty};
use crate::prefix::StablePrefix;
use crate::trimmer::trim_to_budget;

/// Warning raised when the rules layer exceeded its allocation.
pub const RULES_OVERBUDGET_WARNING: &str = "CONTEXT_RULES_OVERBUDGET";

/// Layers cut to fit the total budget, in cut order.
pub const TRUNCATION_ORDER: [LayerId; 3] = [LayerId::Retrieved, LayerId::Settings, LayerId::Immediate];

/// Layers after budget enforcement.
#[derive(Debug, Clone, Default)]
pub struct BudgetedLayers {
    pub layers: LayerMap<LayerDetail>,
    /// Budget-level warnings (not tied to one fetch).
    pub warnings: Vec<String>,
    pub trim_logs: Vec<ConstraintTrimLog>,
    /// Rules and settings content that reached the prompt.
    pub stable_prefix: StablePrefix,
}

impl BudgetedLayers {
    /// Sum of the four layer token counts.
    pub fn token_count(&self) -> usize {
        total_tokens(&self.layers)
    }

    /// Layer warnings in assembly order, then budget warnings, deduplicated.
    pub fn all_warnings(&self) -> Vec<String> {
        let layer_warnings = self
            .layers
            .iter()
            .flat_map(|(_, detail)| detail.warnings.iter().map(String::as_str));
        unique_non_empty(layer_warnings.chain(self.warnings.iter().map(String::as_str)))
    }
}

fn total_tokens(layers: &LayerMap<LayerDetail>) -> usize {
    layers.iter().map(|(_, d)| d.token_count).sum()
}

/// Apply the rules allocation and the total budget.
pub fn apply_budget(fetched: LayerMap<FetchedLayer>, profile: &BudgetProfile) -> BudgetedLayers {
    let mut warnings = Vec::new();
    let mut trim_logs = Vec::new();

    let rules_cap = profile.allocation(LayerId::Rules);
    let LayerMap {
        rules,
        settings,
        retrieved,
        immediate,
    } = fetched;

    let mut rules_detail = rules.detail;
    let mut kept_constraints = rules.constraints;
    if rules_detail.token_count > rules_cap {
        warnings.push(RULES_OVERBUDGET_WARNING.to_string());

        if !kept_constraints.is_empty() {
            let outcome = trim_to_budget(&rules.base_content, &kept_constraints, rules_cap);
            if !outcome.logs.is_empty() {
                rules_detail.content = outcome.content;
                rules_detail.token_count = outcome.token_count;
                rules_detail.truncated = true;
                trim_logs = outcome.logs;
                kept_constraints = outcome.kept;
            }
        }
    }

    let mut layers = LayerMap {
        rules: rules_detail,
        settings: settings.detail,
        retrieved: retrieved.detail,
        immediate: immediate.detail,
    };

    let mut overflow = total_tokens(&layers).saturating_sub(profile.total_budget_tokens);
    for layer in TRUNCATION_ORDER {
        if overflow == 0 {
            break;
        }

        let minimum = profile.layers.get(layer).minimum_tokens;
        let detail = layers.get_mut(layer);
        let removable = detail.token_count.saturating_sub(minimum);
        if removable == 0 {
            continue;
        }

        let target = detail.token_count - removable.min(overflow);
        let cut = truncate_to_tokens(&detail.content, target).to_string();
        let cut_tokens = estimate_tokens(&cut);
        let reduced = detail.token_count.saturating_sub(cut_tokens);
        if reduced > 0 {
            detail.content = cut;
            detail.token_count = cut_tokens;
            detail.truncated = true;
            overflow = overflow.saturating_sub(reduced);
        }
    }

    let settings_chunks = if layers.settings.content == settings.base_content {
        settings.chunk_contents
    } else {
        vec![layers.settings.content.clone()]
    };
    let stable_prefix = StablePrefix {
        rules_chunks: rules.chunk_contents,
        constraints: kept_constraints,
        settings_chunks,
    };

    BudgetedLayers {
        layers,
        warnings,
        trim_logs,
        stable_prefix,
    }
}

/// `## <Title>` sections in assembly order, `(none)` for empty layers.
pub fn render_prompt(layers: &LayerMap<LayerDetail>) -> String {
    layers
        .iter()
        .map(|(layer, detail)| {
            let body = if detail.content.is_empty() {
                "(none)"
            } else {
                detail.content.as_str()
            };
            format!("## {}\n{}", layer.title(), body)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
