//! # ctxloom Core
//!
//! Domain types, traits, and error definitions for layered prompt assembly.
//! This crate carries no runtime or logging dependencies. It defines the
//! data model that the engine, the audit layer, and the front end share.
//!
//! ## Layers
//!
//! A prompt is built from four independently fetched layers, always in the
//! same order: `rules`, `settings`, `retrieved`, `immediate`. Each layer is
//! supplied by a [`LayerFetcher`], so tests and hosts can plug in their own
//! sources without touching the engine.

pub mod budget;
pub mod constraint;
pub mod error;
pub mod fetcher;
pub mod layer;
pub mod request;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use budget::{BudgetProfile, LayerBudget};
pub use constraint::{ConstraintItem, ConstraintSource, ConstraintTrimLog, TrimReason};
pub use error::{ContextError, FetchError, Result};
pub use fetcher::{FnFetcher, LayerFetcher, StaticFetcher};
pub use layer::{LayerChunk, LayerDetail, LayerFetchResult, LayerId, LayerMap, LayerSummary};
pub use request::{
    AssembleRequest, AssembleResult, InspectMeta, InspectRequest, InspectResult, InspectTotals,
};
pub use token::{estimate_tokens, truncate_to_tokens};
