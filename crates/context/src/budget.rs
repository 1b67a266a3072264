//! Budget manager: versioned profile with optimistic-concurrency updates.

use std::sync::RwLock;

use ctxloom_core::{BudgetProfile, ContextError};
use tracing::{info, warn};

/// Owns the active [`BudgetProfile`].
#[derive(Debug)]
pub struct BudgetManager {
    profile: RwLock<BudgetProfile>,
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self::new(BudgetProfile::default())
    }
}

impl BudgetManager {
    pub fn new(profile: BudgetProfile) -> Self {
        Self {
            profile: RwLock::new(profile),
        }
    }

    /// Snapshot of the current profile.
    pub fn current(&self) -> BudgetProfile {
        self.profile
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the profile when `submitted.version` matches the stored one.
    ///
    /// Checks, in order: version, tokenizer, ratios, total. On success the
    /// stored profile becomes `submitted` with `version + 1`. Any failure
    /// leaves it untouched.
    pub fn update(&self, submitted: BudgetProfile) -> Result<BudgetProfile, ContextError> {
        let mut stored = self.profile.write().unwrap_or_else(|e| e.into_inner());

        if submitted.version != stored.version {
            warn!(
                submitted = submitted.version,
                current = stored.version,
                "Budget profile update rejected: version conflict"
            );
            return Err(ContextError::BudgetConflict {
                submitted: submitted.version,
                current: stored.version,
            });
        }

        if submitted.tokenizer_id != stored.tokenizer_id
            || submitted.tokenizer_version != stored.tokenizer_version
        {
            warn!("Budget profile update rejected: tokenizer mismatch");
            return Err(ContextError::TokenizerMismatch);
        }

        submitted.check_shape()?;

        let next = BudgetProfile {
            version: stored.version + 1,
            ..submitted
        };
        *stored = next.clone();
        info!(version = next.version, "Budget profile updated");
        Ok(next)
    }
}
