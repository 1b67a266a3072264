//! Degradation wrapper: one fetch per layer, failures folded into an
//! empty layer plus a warning instead of an error.

use ctxloom_core::{
    AssembleRequest, ConstraintItem, ContextError, LayerDetail, LayerFetchResult, LayerFetcher,
    LayerId, estimate_tokens,
};
use tracing::{debug, warn};

use crate::capacity::CapacityLimits;
use crate::trimmer::{compose_rules, normalize_constraints};

/// A layer after fetch and merge, before budget enforcement.
#[derive(Debug, Clone, Default)]
pub struct FetchedLayer {
    pub detail: LayerDetail,
    /// Merged chunk text without the constraint block (rules layer).
    pub base_content: String,
    /// Trimmed, non-empty chunk contents in fetch order.
    pub chunk_contents: Vec<String>,
    /// Normalized constraints in render order (rules layer).
    pub constraints: Vec<ConstraintItem>,
    /// `projectId` values embedded in the returned chunks.
    pub chunk_projects: Vec<String>,
}

/// Call the fetcher and normalize its output, or degrade on failure.
pub async fn fetch_with_degrade(
    layer: LayerId,
    fetcher: &dyn LayerFetcher,
    request: &AssembleRequest,
    limits: &CapacityLimits,
) -> FetchedLayer {
    match fetcher.fetch(request).await {
        Ok(mut result) => {
            // scope is checked on every returned chunk, including ones over the limit
            let chunk_projects = embedded_projects(&result);
            if layer == LayerId::Retrieved && limits.limit_retrieved(&mut result) {
                debug!(
                    layer = %layer,
                    max_chunks = limits.max_retrieved_chunks,
                    "Retrieved chunks truncated"
                );
            }
            FetchedLayer {
                chunk_projects,
                ..normalize(layer, result)
            }
        }
        Err(e) => {
            warn!(
                layer = %layer,
                fetcher = fetcher.name(),
                warning = layer.unavailable_warning(),
                error = %e,
                "Layer fetch failed, degrading to empty layer"
            );
            degraded(layer)
        }
    }
}

/// Merge chunks into one layer.
pub fn normalize(layer: LayerId, result: LayerFetchResult) -> FetchedLayer {
    let source = unique_non_empty(result.chunks.iter().map(|c| c.source.as_str()));
    let chunk_contents: Vec<String> = result
        .chunks
        .iter()
        .map(|c| c.content.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    let base_content = chunk_contents.join("\n\n");
    let chunk_projects = embedded_projects(&result);

    let (content, constraints) = if layer == LayerId::Rules {
        let constraints = normalize_constraints(
            result
                .chunks
                .into_iter()
                .flat_map(|c| c.constraints)
                .collect(),
        );
        (compose_rules(&base_content, &constraints), constraints)
    } else {
        (base_content.clone(), Vec::new())
    };

    FetchedLayer {
        detail: LayerDetail {
            token_count: estimate_tokens(&content),
            content,
            source,
            truncated: result.truncated,
            warnings: unique_non_empty(result.warnings.iter().map(String::as_str)),
        },
        base_content,
        chunk_contents,
        constraints,
        chunk_projects,
    }
}

/// `projectId` values carried by the chunks.
fn embedded_projects(result: &LayerFetchResult) -> Vec<String> {
    result
        .chunks
        .iter()
        .filter_map(|c| c.project_id.clone())
        .collect()
}

/// Empty layer carrying the layer's `*_UNAVAILABLE` warning.
pub fn degraded(layer: LayerId) -> FetchedLayer {
    FetchedLayer {
        detail: LayerDetail {
            warnings: vec![layer.unavailable_warning().to_string()],
            ..LayerDetail::default()
        },
        ..FetchedLayer::default()
    }
}

/// Trimmed, non-empty, deduplicated values in first-seen order.
pub fn unique_non_empty<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}

/// Contract check on a merged layer: sources present and unique, token
/// count consistent with content.
pub fn validate_contract(layer: LayerId, detail: &LayerDetail) -> Result<(), ContextError> {
    if detail.source.iter().any(|s| s.trim().is_empty()) {
        return Err(ContextError::Internal(format!(
            "layer {layer} has a blank source"
        )));
    }
    if unique_non_empty(detail.source.iter().map(String::as_str)).len() != detail.source.len() {
        return Err(ContextError::Internal(format!(
            "layer {layer} has duplicate sources"
        )));
    }
    if detail.token_count != estimate_tokens(&detail.content) {
        return Err(ContextError::Internal(format!(
            "layer {layer} token count does not match its content"
        )));
    }
    Ok(())
}
