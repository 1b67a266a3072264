//! Layer fetcher trait: the pluggable source of one prompt layer.
//!
//! The engine depends only on this trait. Implementations: knowledge-graph
//! rules, settings/memory, retrieval, editor context, plus the in-crate
//! [`StaticFetcher`] and [`FnFetcher`] adapters used by tests and fixtures.

use std::future::Future;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::layer::LayerFetchResult;
use crate::request::AssembleRequest;

/// Supplies raw content chunks for one layer.
#[async_trait]
pub trait LayerFetcher: Send + Sync {
    /// Fetcher name for logs (e.g., "kg", "rag", "editor").
    fn name(&self) -> &str;

    /// Fetch the layer content for a request.
    async fn fetch(&self, request: &AssembleRequest) -> Result<LayerFetchResult, FetchError>;
}

/// Returns the same result for every request.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    result: LayerFetchResult,
}

impl StaticFetcher {
    pub fn new(result: LayerFetchResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl LayerFetcher for StaticFetcher {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, _request: &AssembleRequest) -> Result<LayerFetchResult, FetchError> {
        Ok(self.result.clone())
    }
}

/// Adapts an async closure into a [`LayerFetcher`].
pub struct FnFetcher<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnFetcher<F>
where
    F: Fn(AssembleRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<LayerFetchResult, FetchError>> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> LayerFetcher for FnFetcher<F>
where
    F: Fn(AssembleRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<LayerFetchResult, FetchError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &AssembleRequest) -> Result<LayerFetchResult, FetchError> {
        (self.f)(request.clone()).await
    }
}
