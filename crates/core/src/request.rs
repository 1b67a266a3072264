//! Request and response shapes of the assemble / inspect operations.

use serde::{Deserialize, Serialize};

use crate::layer::{LayerDetail, LayerId, LayerMap, LayerSummary};

/// Input of `assemble` and the base of `inspect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleRequest {
    pub project_id: String,
    pub document_id: String,
    pub cursor_position: f64,
    pub skill_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_version: Option<String>,
}

impl AssembleRequest {
    pub fn new(
        project_id: impl Into<String>,
        document_id: impl Into<String>,
        skill_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            document_id: document_id.into(),
            cursor_position: 0.0,
            skill_id: skill_id.into(),
            additional_input: None,
            provider: None,
            model: None,
            tokenizer_version: None,
        }
    }

    pub fn with_cursor(mut self, cursor_position: f64) -> Self {
        self.cursor_position = cursor_position;
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.additional_input = Some(input.into());
        self
    }

    pub fn with_model(
        mut self,
        provider: impl Into<String>,
        model: impl Into<String>,
        tokenizer_version: impl Into<String>,
    ) -> Self {
        self.provider = Some(provider.into());
        self.model = Some(model.into());
        self.tokenizer_version = Some(tokenizer_version.into());
        self
    }

    /// The caller's extra input, or an empty string.
    pub fn input_text(&self) -> &str {
        self.additional_input.as_deref().unwrap_or("")
    }
}

/// Input of `inspect`: an assemble request plus caller metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectRequest {
    #[serde(flatten)]
    pub request: AssembleRequest,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub requested_by: String,
    #[serde(default)]
    pub caller_role: String,
    /// Epoch milliseconds; the engine stamps "now" when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<i64>,
}

impl InspectRequest {
    pub fn new(
        request: AssembleRequest,
        requested_by: impl Into<String>,
        caller_role: impl Into<String>,
    ) -> Self {
        Self {
            request,
            debug_mode: true,
            requested_by: requested_by.into(),
            caller_role: caller_role.into(),
            requested_at: None,
        }
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }
}

/// Output of `assemble`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleResult {
    pub prompt: String,
    pub token_count: usize,
    pub stable_prefix_hash: String,
    pub stable_prefix_unchanged: bool,
    pub warnings: Vec<String>,
    pub assembly_order: [LayerId; 4],
    pub layers: LayerMap<LayerSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectTotals {
    pub token_count: usize,
    pub warnings_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectMeta {
    pub debug_mode: bool,
    pub requested_by: String,
    pub requested_at: i64,
}

/// Output of `inspect`: full per-layer content, no merged prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    pub layers_detail: LayerMap<LayerDetail>,
    pub totals: InspectTotals,
    pub inspect_meta: InspectMeta,
}
