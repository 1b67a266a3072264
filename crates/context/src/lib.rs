//! Layered prompt assembly: the ctxloom context engine.
//!
//! Every request goes through the same pipeline:
//!
//! 1. **Guard** the request (input size, per-document backpressure)
//! 2. **Fetch** the four layers concurrently, degrading failed sources
//! 3. **Check** that no layer leaked content from another project
//! 4. **Budget**: trim rules constraints, then cut layers to the total
//! 5. **Render** the prompt and hash its stable prefix
//!
//! [`ContextEngine`] runs the pipeline; [`ContextRpc`] wraps it in the
//! `{ ok, data | error }` envelope used by the request boundary.

pub mod assembler;
pub mod backpressure;
pub mod budget;
pub mod canonical;
pub mod capacity;
pub mod defaults;
pub mod degrade;
pub mod engine;
pub mod prefix;
pub mod rpc;
pub mod scope;
pub mod trimmer;

pub use assembler::{BudgetedLayers, RULES_OVERBUDGET_WARNING, apply_budget, render_prompt};
pub use backpressure::{InFlightSlots, SlotGuard};
pub use budget::BudgetManager;
pub use canonical::{canonical_json, canonicalize, canonicalize_layer};
pub use capacity::{CapacityLimits, RETRIEVED_CHUNK_LIMIT_WARNING};
pub use engine::{ContextEngine, TrimObserver};
pub use prefix::{ModelIdentity, StablePrefix, StablePrefixCache, StablePrefixKey, stable_prefix_hash};
pub use rpc::{
    ASSEMBLE_CHANNEL, BUDGET_GET_CHANNEL, BUDGET_UPDATE_CHANNEL, ContextRpc, INSPECT_CHANNEL,
    RpcError, RpcResponse, validate_request,
};
pub use trimmer::{RULES_CONSTRAINT_HEADER, TrimOutcome, compose_rules, trim_to_budget};
