//! Scope guard: cross-project content must never reach a prompt.

use ctxloom_core::{LayerId, LayerMap};

use crate::degrade::FetchedLayer;

/// First chunk found whose `projectId` differs from the request's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeBreach {
    pub layer: LayerId,
    pub foreign_project_id: String,
}

/// Scan layers in assembly order for a foreign `projectId`.
pub fn find_breach(project_id: &str, layers: &LayerMap<FetchedLayer>) -> Option<ScopeBreach> {
    layers.iter().find_map(|(layer, fetched)| {
        fetched
            .chunk_projects
            .iter()
            .find(|owner| owner.as_str() != project_id)
            .map(|owner| ScopeBreach {
                layer,
                foreign_project_id: owner.clone(),
            })
    })
}
