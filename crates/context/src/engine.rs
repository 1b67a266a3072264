//! The context engine: one instance per process, shared by reference.
//!
//! Pipeline for `assemble` and `inspect`:
//!
//! 1. Input size check (before a slot is taken)
//! 2. Backpressure slot, held until the call returns
//! 3. `inspect` only: access policy
//! 4. Four concurrent fetches, each degraded on failure
//! 5. Scope guard and layer contract check
//! 6. Rules trimming and total-budget enforcement
//! 7. `assemble` only: prompt rendering and stable prefix tracking

use std::sync::Arc;

use chrono::Utc;
use ctxloom_config::AppConfig;
use ctxloom_core::{
    AssembleRequest, AssembleResult, BudgetProfile, ConstraintTrimLog, ContextError,
    InspectMeta, InspectRequest, InspectResult, InspectTotals, LayerFetcher, LayerId, LayerMap,
    LayerSummary, Result,
};
use ctxloom_security::{
    AuditEvent, AuditLogger, InputFingerprint, InspectCheckResult, InspectPolicy,
};
use tracing::{debug, info, warn};

use crate::assembler::{BudgetedLayers, apply_budget, render_prompt};
use crate::backpressure::{InFlightSlots, SlotGuard};
use crate::budget::BudgetManager;
use crate::capacity::CapacityLimits;
use crate::defaults::default_fetcher;
use crate::degrade::{fetch_with_degrade, validate_contract};
use crate::prefix::{ModelIdentity, StablePrefixCache, StablePrefixKey, stable_prefix_hash};
use crate::scope::find_breach;

/// Callback invoked for every dropped constraint.
pub type TrimObserver = Arc<dyn Fn(&ConstraintTrimLog) + Send + Sync>;

const ENGINE_ACTOR: &str = "context-engine";

/// Layered prompt assembly engine.
pub struct ContextEngine {
    fetchers: LayerMap<Arc<dyn LayerFetcher>>,
    budget: BudgetManager,
    prefix_cache: StablePrefixCache,
    slots: InFlightSlots,
    limits: CapacityLimits,
    inspect_policy: InspectPolicy,
    audit: Arc<AuditLogger>,
    trim_observer: Option<TrimObserver>,
}

impl std::fmt::Debug for ContextEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEngine")
            .field("limits", &self.limits)
            .field("budget", &self.budget)
            .field("prefix_cache", &self.prefix_cache)
            .field("inspect_policy", &self.inspect_policy)
            .finish()
    }
}

impl Default for ContextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextEngine {
    /// Engine with default limits, budget, and fetchers.
    pub fn new() -> Self {
        Self::from_config(&AppConfig::default())
    }

    /// Engine configured from `config`, with default fetchers.
    pub fn from_config(config: &AppConfig) -> Self {
        let limits = CapacityLimits::from(&config.limits);
        Self {
            fetchers: LayerMap::from_fn(default_fetcher),
            budget: BudgetManager::new(config.budget.to_profile()),
            prefix_cache: StablePrefixCache::new(config.limits.stable_prefix_cache_capacity),
            slots: InFlightSlots::new(limits.max_concurrent_by_document),
            limits,
            inspect_policy: InspectPolicy::from_config(&config.inspect),
            audit: Arc::new(AuditLogger::tracing()),
            trim_observer: None,
        }
    }

    /// Replace the fetcher of one layer.
    pub fn with_fetcher(mut self, layer: LayerId, fetcher: Arc<dyn LayerFetcher>) -> Self {
        *self.fetchers.get_mut(layer) = fetcher;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_trim_observer(
        mut self,
        observer: impl Fn(&ConstraintTrimLog) + Send + Sync + 'static,
    ) -> Self {
        self.trim_observer = Some(Arc::new(observer));
        self
    }

    pub fn limits(&self) -> CapacityLimits {
        self.limits
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// In-flight requests for a document.
    pub fn in_flight(&self, project_id: &str, document_id: &str) -> usize {
        self.slots.in_flight(project_id, document_id)
    }

    // ── Operations ────────────────────────────────────────────────────────

    /// Assemble the four layers into one bounded prompt.
    pub async fn assemble(&self, request: &AssembleRequest) -> Result<AssembleResult> {
        let _slot = self.admit(request)?;
        let (budgeted, profile) = self.snapshot(request).await?;

        let warnings = budgeted.all_warnings();
        let token_count = budgeted.token_count();
        let layers = budgeted.layers;
        let prompt = render_prompt(&layers);

        let identity = ModelIdentity::resolve(request, &profile.tokenizer_version);
        let stable_prefix_hash = stable_prefix_hash(&budgeted.stable_prefix, &identity);
        let stable_prefix_unchanged = self
            .prefix_cache
            .observe(StablePrefixKey::new(request, identity), &stable_prefix_hash);

        info!(
            project_id = %request.project_id,
            document_id = %request.document_id,
            skill_id = %request.skill_id,
            token_count,
            warnings = warnings.len(),
            stable_prefix_unchanged,
            "Context assembled"
        );

        Ok(AssembleResult {
            prompt,
            token_count,
            stable_prefix_hash,
            stable_prefix_unchanged,
            warnings,
            assembly_order: LayerId::ALL,
            layers: layers.map(|_, detail| LayerSummary::from(&detail)),
        })
    }

    /// Full per-layer content for authorized debug callers.
    pub async fn inspect(&self, request: &InspectRequest) -> Result<InspectResult> {
        let base = &request.request;
        let _slot = self.admit(base)?;

        if let InspectCheckResult::Denied { reason } = self
            .inspect_policy
            .check(request.debug_mode, &request.caller_role)
        {
            let fingerprint = InputFingerprint::of(base.input_text());
            warn!(
                project_id = %base.project_id,
                document_id = %base.document_id,
                reason = %reason,
                "Context inspect forbidden"
            );
            let actor = if request.requested_by.trim().is_empty() {
                "unknown"
            } else {
                request.requested_by.as_str()
            };
            self.audit.log(
                AuditEvent::ContextInspectForbidden {
                    project_id: base.project_id.clone(),
                    document_id: base.document_id.clone(),
                    requested_by: request.requested_by.clone(),
                    caller_role: request.caller_role.clone(),
                    debug_mode: request.debug_mode,
                    input_token_count: fingerprint.token_count,
                    input_hash: fingerprint.hash,
                },
                actor,
                &target(base),
                Some(reason),
            );
            return Err(ContextError::InspectForbidden);
        }

        let (budgeted, _) = self.snapshot(base).await?;
        let totals = InspectTotals {
            token_count: budgeted.token_count(),
            warnings_count: budgeted.all_warnings().len(),
        };

        debug!(
            project_id = %base.project_id,
            document_id = %base.document_id,
            requested_by = %request.requested_by,
            token_count = totals.token_count,
            "Context inspected"
        );

        Ok(InspectResult {
            layers_detail: budgeted.layers,
            totals,
            inspect_meta: InspectMeta {
                debug_mode: request.debug_mode,
                requested_by: request.requested_by.clone(),
                requested_at: request
                    .requested_at
                    .unwrap_or_else(|| Utc::now().timestamp_millis()),
            },
        })
    }

    /// Current budget profile.
    pub fn budget_profile(&self) -> BudgetProfile {
        self.budget.current()
    }

    /// Version-checked full replacement of the budget profile.
    pub fn update_budget_profile(&self, profile: BudgetProfile) -> Result<BudgetProfile> {
        self.budget.update(profile)
    }

    // ── Pipeline ──────────────────────────────────────────────────────────

    /// Input size check, then a backpressure slot.
    fn admit(&self, request: &AssembleRequest) -> Result<SlotGuard<'_>> {
        if let Err(e) = self.limits.check_input(request) {
            if let ContextError::InputTooLarge {
                input_tokens,
                max_input_tokens,
            } = e
            {
                warn!(
                    project_id = %request.project_id,
                    document_id = %request.document_id,
                    input_tokens,
                    max_input_tokens,
                    "Context input too large"
                );
                self.audit.log(
                    AuditEvent::ContextInputTooLarge {
                        project_id: request.project_id.clone(),
                        document_id: request.document_id.clone(),
                        input_tokens,
                        max_input_tokens,
                    },
                    ENGINE_ACTOR,
                    &target(request),
                    None,
                );
            }
            return Err(e);
        }

        match self
            .slots
            .try_acquire(&request.project_id, &request.document_id)
        {
            Ok(slot) => Ok(slot),
            Err(e) => {
                if let ContextError::Backpressure { in_flight, limit } = e {
                    warn!(
                        project_id = %request.project_id,
                        document_id = %request.document_id,
                        in_flight,
                        limit,
                        "Context request rejected by backpressure"
                    );
                    self.audit.log(
                        AuditEvent::ContextBackpressure {
                            project_id: request.project_id.clone(),
                            document_id: request.document_id.clone(),
                            in_flight,
                            limit,
                        },
                        ENGINE_ACTOR,
                        &target(request),
                        None,
                    );
                }
                Err(e)
            }
        }
    }

    /// Fetch, guard, and budget the four layers.
    async fn snapshot(&self, request: &AssembleRequest) -> Result<(BudgetedLayers, BudgetProfile)> {
        let profile = self.budget.current();

        let (rules, settings, retrieved, immediate) = tokio::join!(
            self.fetch(LayerId::Rules, request),
            self.fetch(LayerId::Settings, request),
            self.fetch(LayerId::Retrieved, request),
            self.fetch(LayerId::Immediate, request),
        );
        let fetched = LayerMap {
            rules,
            settings,
            retrieved,
            immediate,
        };

        if let Some(breach) = find_breach(&request.project_id, &fetched) {
            warn!(
                project_id = %request.project_id,
                document_id = %request.document_id,
                layer = %breach.layer,
                foreign_project_id = %breach.foreign_project_id,
                "Context scope violation"
            );
            self.audit.log(
                AuditEvent::ContextScopeViolation {
                    project_id: request.project_id.clone(),
                    document_id: request.document_id.clone(),
                    layer: breach.layer,
                    foreign_project_id: breach.foreign_project_id,
                },
                ENGINE_ACTOR,
                &target(request),
                None,
            );
            return Err(ContextError::ScopeViolation { layer: breach.layer });
        }

        for (layer, layer_fetch) in fetched.iter() {
            validate_contract(layer, &layer_fetch.detail)?;
        }

        let budgeted = apply_budget(fetched, &profile);
        for log in &budgeted.trim_logs {
            debug!(
                constraint_id = %log.constraint_id,
                reason = ?log.reason,
                token_freed = log.token_freed,
                "Constraint trimmed"
            );
            if let Some(observer) = &self.trim_observer {
                observer(log);
            }
        }

        Ok((budgeted, profile))
    }

    async fn fetch(&self, layer: LayerId, request: &AssembleRequest) -> crate::degrade::FetchedLayer {
        fetch_with_degrade(layer, self.fetchers.get(layer).as_ref(), request, &self.limits).await
    }
}

fn target(request: &AssembleRequest) -> String {
    format!("{}/{}", request.project_id, request.document_id)
}
