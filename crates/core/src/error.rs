//! Error types for context assembly.
//!
//! Uses `thiserror` for ergonomic error definitions. Every
//! [`ContextError`] maps to a stable wire code through
//! [`ContextError::code`]. Messages never embed request or layer content.

use thiserror::Error;

use crate::layer::LayerId;

/// The top-level error type for engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    // --- Validation ---
    #[error("{0}")]
    InvalidArgument(String),

    // --- Capacity ---
    #[error(
        "Input is too large ({input_tokens} tokens, limit {max_input_tokens}); \
         reduce the input, split it into smaller requests, or shrink the selection"
    )]
    InputTooLarge {
        input_tokens: usize,
        max_input_tokens: usize,
    },

    #[error("Too many in-flight context requests for this document ({in_flight}/{limit}), retry later")]
    Backpressure { in_flight: usize, limit: usize },

    // --- Isolation ---
    #[error("Layer {layer} returned content that belongs to another project")]
    ScopeViolation { layer: LayerId },

    // --- Authorization ---
    #[error("Context inspect requires debug mode and an authorized caller role")]
    InspectForbidden,

    // --- Versioning ---
    #[error("Budget profile version conflict: submitted {submitted}, current {current}")]
    BudgetConflict { submitted: u64, current: u64 },

    #[error("Tokenizer metadata does not match the context tokenizer")]
    TokenizerMismatch,

    #[error("Invalid budget ratio: {0}")]
    InvalidBudgetRatio(String),

    #[error("Invalid budget minimum: {0}")]
    InvalidBudgetMinimum(String),

    // --- Internal ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContextError {
    /// Stable error code exposed at the request boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::InputTooLarge { .. } => "CONTEXT_INPUT_TOO_LARGE",
            Self::Backpressure { .. } => "CONTEXT_BACKPRESSURE",
            Self::ScopeViolation { .. } => "CONTEXT_SCOPE_VIOLATION",
            Self::InspectForbidden => "CONTEXT_INSPECT_FORBIDDEN",
            Self::BudgetConflict { .. } => "CONTEXT_BUDGET_CONFLICT",
            Self::TokenizerMismatch => "CONTEXT_TOKENIZER_MISMATCH",
            Self::InvalidBudgetRatio(_) => "CONTEXT_BUDGET_INVALID_RATIO",
            Self::InvalidBudgetMinimum(_) => "CONTEXT_BUDGET_INVALID_MINIMUM",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

/// Result type alias using [`ContextError`].
pub type Result<T> = std::result::Result<T, ContextError>;

/// Failure reported by a layer fetcher.
///
/// Never crosses the engine boundary: the degradation step folds it into an
/// empty layer plus a warning code.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source timed out: {0}")]
    Timeout(String),

    #[error("Malformed source payload: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}
