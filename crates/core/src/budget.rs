//! Token budget profile shared by all layers.

use serde::{Deserialize, Serialize};

use crate::error::ContextError;
use crate::layer::{LayerId, LayerMap};

pub const DEFAULT_TOKENIZER_ID: &str = "cn-byte-estimator";
pub const DEFAULT_TOKENIZER_VERSION: &str = "1.0.0";
pub const DEFAULT_TOTAL_BUDGET_TOKENS: usize = 6000;

const RATIO_SUM_TOLERANCE: f64 = 1e-9;

/// Share of the total budget reserved for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerBudget {
    pub ratio: f64,
    pub minimum_tokens: usize,
}

impl LayerBudget {
    pub const fn new(ratio: f64, minimum_tokens: usize) -> Self {
        Self {
            ratio,
            minimum_tokens,
        }
    }
}

/// Versioned budget profile. Replaced wholesale on update, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetProfile {
    pub version: u64,
    pub tokenizer_id: String,
    pub tokenizer_version: String,
    pub total_budget_tokens: usize,
    pub layers: LayerMap<LayerBudget>,
}

impl BudgetProfile {
    /// Token allocation of a layer: `max(minimum, floor(ratio * total))`.
    pub fn allocation(&self, layer: LayerId) -> usize {
        let budget = self.layers.get(layer);
        let share = (self.total_budget_tokens as f64 * budget.ratio).floor();
        let share = if share.is_finite() && share > 0.0 {
            share as usize
        } else {
            0
        };
        budget.minimum_tokens.max(share)
    }

    /// Check ratios and minimums. Version and tokenizer are checked by the
    /// owner of the stored profile.
    pub fn check_shape(&self) -> Result<(), ContextError> {
        let mut sum = 0.0;
        for (layer, budget) in self.layers.iter() {
            if !budget.ratio.is_finite() || budget.ratio < 0.0 {
                return Err(ContextError::InvalidBudgetRatio(format!(
                    "{layer} ratio must be a finite non-negative number"
                )));
            }
            sum += budget.ratio;
        }
        if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
            return Err(ContextError::InvalidBudgetRatio(format!(
                "layer ratios must sum to 1, got {sum}"
            )));
        }
        if self.total_budget_tokens == 0 {
            return Err(ContextError::InvalidBudgetMinimum(
                "totalBudgetTokens must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Default per-layer split: rules 15%, settings 10%, retrieved 25%,
    /// immediate 50%.
    pub fn default_layers() -> LayerMap<LayerBudget> {
        LayerMap {
            rules: LayerBudget::new(0.15, 500),
            settings: LayerBudget::new(0.10, 200),
            retrieved: LayerBudget::new(0.25, 0),
            immediate: LayerBudget::new(0.50, 2000),
        }
    }
}

impl Default for BudgetProfile {
    fn default() -> Self {
        Self {
            version: 1,
            tokenizer_id: DEFAULT_TOKENIZER_ID.into(),
            tokenizer_version: DEFAULT_TOKENIZER_VERSION.into(),
            total_budget_tokens: DEFAULT_TOTAL_BUDGET_TOKENS,
            layers: Self::default_layers(),
        }
    }
}
