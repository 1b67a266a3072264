//! Static layer fixtures for the `assemble` / `inspect` commands.
//!
//! A fixture file supplies the raw fetch result of any layer and can mark
//! layers as unavailable; layers it leaves out keep their default fetcher.
//!
//! ```json
//! {
//!   "rules":     { "chunks": [{ "source": "kg:rules", "content": "..." }] },
//!   "retrieved": { "chunks": [{ "source": "rag:chunk-1", "content": "...", "projectId": "p" }] },
//!   "unavailable": ["settings"]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use ctxloom_context::ContextEngine;
use ctxloom_core::{AssembleRequest, FetchError, FnFetcher, LayerFetchResult, LayerId, StaticFetcher};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerFixture {
    #[serde(default)]
    pub rules: Option<LayerFetchResult>,
    #[serde(default)]
    pub settings: Option<LayerFetchResult>,
    #[serde(default)]
    pub retrieved: Option<LayerFetchResult>,
    #[serde(default)]
    pub immediate: Option<LayerFetchResult>,
    /// Layers whose fetch fails.
    #[serde(default)]
    pub unavailable: Vec<LayerId>,
}

impl LayerFixture {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read layers file {}: {e}", path.display()))?;
        let fixture = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse layers file {}: {e}", path.display()))?;
        Ok(fixture)
    }

    /// Install the fixture's fetchers on `engine`.
    pub fn install(self, mut engine: ContextEngine) -> ContextEngine {
        let Self {
            rules,
            settings,
            retrieved,
            immediate,
            unavailable,
        } = self;

        let supplied = [
            (LayerId::Rules, rules),
            (LayerId::Settings, settings),
            (LayerId::Retrieved, retrieved),
            (LayerId::Immediate, immediate),
        ];
        for (layer, result) in supplied {
            if let Some(result) = result {
                engine = engine.with_fetcher(layer, Arc::new(StaticFetcher::new(result)));
            }
        }

        for layer in unavailable {
            let fetcher = FnFetcher::new("fixture", move |_req: AssembleRequest| async move {
                Err::<LayerFetchResult, _>(FetchError::Unavailable(format!(
                    "{layer} marked unavailable"
                )))
            });
            engine = engine.with_fetcher(layer, Arc::new(fetcher));
        }

        engine
    }
}
