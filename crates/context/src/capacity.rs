//! Capacity guard: input size and retrieved chunk limits.

use ctxloom_config::LimitsConfig;
use ctxloom_core::{AssembleRequest, ContextError, LayerFetchResult, estimate_tokens};

/// Warning added when the retrieved layer had more chunks than allowed.
pub const RETRIEVED_CHUNK_LIMIT_WARNING: &str = "CONTEXT_RETRIEVED_CHUNK_LIMIT";

/// Published capacity constants, overridable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityLimits {
    pub max_input_tokens: usize,
    pub max_retrieved_chunks: usize,
    pub max_concurrent_by_document: usize,
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for CapacityLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_input_tokens: config.max_input_tokens,
            max_retrieved_chunks: config.max_retrieved_chunks,
            max_concurrent_by_document: config.max_concurrent_by_document,
        }
    }
}

impl CapacityLimits {
    /// Estimate the caller's input and reject it when over the limit.
    /// Returns the estimated token count.
    pub fn check_input(&self, request: &AssembleRequest) -> Result<usize, ContextError> {
        let input_tokens = estimate_tokens(request.input_text());
        if input_tokens > self.max_input_tokens {
            return Err(ContextError::InputTooLarge {
                input_tokens,
                max_input_tokens: self.max_input_tokens,
            });
        }
        Ok(input_tokens)
    }

    /// Keep the first `max_retrieved_chunks` chunks in fetcher order.
    /// Returns true when chunks were dropped.
    pub fn limit_retrieved(&self, result: &mut LayerFetchResult) -> bool {
        if result.chunks.len() <= self.max_retrieved_chunks {
            return false;
        }
        result.chunks.truncate(self.max_retrieved_chunks);
        result.truncated = true;
        if !result
            .warnings
            .iter()
            .any(|w| w == RETRIEVED_CHUNK_LIMIT_WARNING)
        {
            result.warnings.push(RETRIEVED_CHUNK_LIMIT_WARNING.into());
        }
        true
    }
}
