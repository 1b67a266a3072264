//! Deterministic fetchers used for layers without a configured source.

use async_trait::async_trait;
use ctxloom_core::{
    AssembleRequest, FetchError, LayerChunk, LayerFetchResult, LayerFetcher, LayerId,
};
use std::sync::Arc;

/// Rules placeholder naming the requesting skill.
pub struct SkillRulesFetcher;

#[async_trait]
impl LayerFetcher for SkillRulesFetcher {
    fn name(&self) -> &str {
        "default-rules"
    }

    async fn fetch(&self, request: &AssembleRequest) -> Result<LayerFetchResult, FetchError> {
        Ok(LayerFetchResult::from_chunks(vec![LayerChunk::new(
            "kg:entities",
            format!("Skill {} must follow project rules.", request.skill_id),
        )]))
    }
}

/// Always returns no chunks.
pub struct EmptyFetcher;

#[async_trait]
impl LayerFetcher for EmptyFetcher {
    fn name(&self) -> &str {
        "empty"
    }

    async fn fetch(&self, _request: &AssembleRequest) -> Result<LayerFetchResult, FetchError> {
        Ok(LayerFetchResult::empty())
    }
}

/// Editor window: the caller's extra input, or the cursor position.
pub struct CursorWindowFetcher;

#[async_trait]
impl LayerFetcher for CursorWindowFetcher {
    fn name(&self) -> &str {
        "default-immediate"
    }

    async fn fetch(&self, request: &AssembleRequest) -> Result<LayerFetchResult, FetchError> {
        let content = match &request.additional_input {
            Some(input) => input.trim().to_string(),
            None => format!("cursor={}", request.cursor_position),
        };
        Ok(LayerFetchResult::from_chunks(vec![LayerChunk::new(
            "editor:cursor-window",
            content,
        )]))
    }
}

/// Default fetcher for a layer.
pub fn default_fetcher(layer: LayerId) -> Arc<dyn LayerFetcher> {
    match layer {
        LayerId::Rules => Arc::new(SkillRulesFetcher),
        LayerId::Settings | LayerId::Retrieved => Arc::new(EmptyFetcher),
        LayerId::Immediate => Arc::new(CursorWindowFetcher),
    }
}
