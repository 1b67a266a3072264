//! Layer identifiers and the per-layer data contract.
//!
//! Fetchers return [`LayerFetchResult`]s made of [`LayerChunk`]s; the engine
//! normalizes them into one [`LayerDetail`] per layer. [`LayerMap`] holds one
//! value per layer, so every result carries all four layers by construction.

use serde::{Deserialize, Serialize};

use crate::constraint::ConstraintItem;

/// One of the four prompt layers.
///
/// The derived ordering is the fixed assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerId {
    Rules,
    Settings,
    Retrieved,
    Immediate,
}

impl LayerId {
    /// Fixed assembly order.
    pub const ALL: [LayerId; 4] = [
        LayerId::Rules,
        LayerId::Settings,
        LayerId::Retrieved,
        LayerId::Immediate,
    ];

    /// Wire name of the layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Settings => "settings",
            Self::Retrieved => "retrieved",
            Self::Immediate => "immediate",
        }
    }

    /// Section title used in the rendered prompt.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Rules => "Rules",
            Self::Settings => "Settings",
            Self::Retrieved => "Retrieved",
            Self::Immediate => "Immediate",
        }
    }

    /// Warning code attached when this layer's fetcher fails.
    pub fn unavailable_warning(&self) -> &'static str {
        match self {
            Self::Rules => "KG_UNAVAILABLE",
            Self::Settings => "SETTINGS_UNAVAILABLE",
            Self::Retrieved => "RAG_UNAVAILABLE",
            Self::Immediate => "IMMEDIATE_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one value per layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerMap<T> {
    pub rules: T,
    pub settings: T,
    pub retrieved: T,
    pub immediate: T,
}

impl<T> LayerMap<T> {
    /// Build a map by calling `f` once per layer, in assembly order.
    pub fn from_fn(mut f: impl FnMut(LayerId) -> T) -> Self {
        Self {
            rules: f(LayerId::Rules),
            settings: f(LayerId::Settings),
            retrieved: f(LayerId::Retrieved),
            immediate: f(LayerId::Immediate),
        }
    }

    pub fn get(&self, layer: LayerId) -> &T {
        match layer {
            LayerId::Rules => &self.rules,
            LayerId::Settings => &self.settings,
            LayerId::Retrieved => &self.retrieved,
            LayerId::Immediate => &self.immediate,
        }
    }

    pub fn get_mut(&mut self, layer: LayerId) -> &mut T {
        match layer {
            LayerId::Rules => &mut self.rules,
            LayerId::Settings => &mut self.settings,
            LayerId::Retrieved => &mut self.retrieved,
            LayerId::Immediate => &mut self.immediate,
        }
    }

    /// Iterate `(layer, value)` pairs in assembly order.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &T)> {
        LayerId::ALL.into_iter().map(move |layer| (layer, self.get(layer)))
    }

    /// Transform every value, keeping the layer association.
    pub fn map<U>(self, mut f: impl FnMut(LayerId, T) -> U) -> LayerMap<U> {
        LayerMap {
            rules: f(LayerId::Rules, self.rules),
            settings: f(LayerId::Settings, self.settings),
            retrieved: f(LayerId::Retrieved, self.retrieved),
            immediate: f(LayerId::Immediate, self.immediate),
        }
    }
}

/// A unit of content returned by a fetcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerChunk {
    /// Human-readable origin label (`kg:entities`, `rag:retrieve`, ...).
    pub source: String,
    /// Text content of the chunk.
    pub content: String,
    /// Structured constraints (rules layer only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintItem>,
    /// Owning project, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl LayerChunk {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            constraints: Vec::new(),
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<ConstraintItem>) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Raw output of a fetcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerFetchResult {
    pub chunks: Vec<LayerChunk>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl LayerFetchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: Vec<LayerChunk>) -> Self {
        Self {
            chunks,
            truncated: false,
            warnings: Vec::new(),
        }
    }
}

/// Normalized, merged result for one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDetail {
    pub content: String,
    /// Deduplicated, non-blank source labels in first-seen order.
    pub source: Vec<String>,
    pub token_count: usize,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// [`LayerDetail`] without content, returned by `assemble`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub source: Vec<String>,
    pub token_count: usize,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<&LayerDetail> for LayerSummary {
    fn from(detail: &LayerDetail) -> Self {
        Self {
            source: detail.source.clone(),
            token_count: detail.token_count,
            truncated: detail.truncated,
            warnings: detail.warnings.clone(),
        }
    }
}
