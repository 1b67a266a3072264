//! Request boundary: JSON handlers for the context channels.
//!
//! Every handler returns an envelope:
//!
//! ```json
//! { "ok": true,  "data": { ... } }
//! { "ok": false, "error": { "code": "...", "message": "..." } }
//! ```
//!
//! Payloads are validated here; the engine assumes well-formed requests.

use std::sync::Arc;

use ctxloom_core::{
    AssembleRequest, AssembleResult, BudgetProfile, ContextError, InspectRequest, InspectResult,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::engine::ContextEngine;

pub const ASSEMBLE_CHANNEL: &str = "context:prompt:assemble";
pub const INSPECT_CHANNEL: &str = "context:prompt:inspect";
pub const BUDGET_GET_CHANNEL: &str = "context:budget:get";
pub const BUDGET_UPDATE_CHANNEL: &str = "context:budget:update";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl<T> RpcResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(RpcError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Error code, when this is a failure.
    pub fn code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

impl<T: Serialize> RpcResponse<T> {
    fn into_value(self) -> Value {
        serde_json::to_value(&self).unwrap_or_else(|e| {
            serde_json::json!({
                "ok": false,
                "error": { "code": "INTERNAL", "message": e.to_string() }
            })
        })
    }
}

/// Handlers for the four context channels.
#[derive(Debug, Clone)]
pub struct ContextRpc {
    engine: Arc<ContextEngine>,
}

impl ContextRpc {
    pub fn new(engine: Arc<ContextEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ContextEngine {
        &self.engine
    }

    /// Route a payload by channel name.
    pub async fn dispatch(&self, channel: &str, payload: Value) -> Value {
        match channel {
            ASSEMBLE_CHANNEL => self.assemble(payload).await.into_value(),
            INSPECT_CHANNEL => self.inspect(payload).await.into_value(),
            BUDGET_GET_CHANNEL => self.budget_get().into_value(),
            BUDGET_UPDATE_CHANNEL => self.budget_update(payload).into_value(),
            other => RpcResponse::<()>::failure(
                "INVALID_ARGUMENT",
                format!("Unknown channel: {other}"),
            )
            .into_value(),
        }
    }

    pub async fn assemble(&self, payload: Value) -> RpcResponse<AssembleResult> {
        let request = match parse::<AssembleRequest>(payload) {
            Ok(request) => request,
            Err(e) => return RpcResponse::failure(e.code(), e.to_string()),
        };
        if let Err(e) = validate_request(&request) {
            return RpcResponse::failure(e.code(), e.to_string());
        }

        match self.engine.assemble(&request).await {
            Ok(result) => RpcResponse::success(result),
            Err(e) => failure(e, "context_assemble_failed", "Failed to assemble context"),
        }
    }

    pub async fn inspect(&self, payload: Value) -> RpcResponse<InspectResult> {
        let request = match parse::<InspectRequest>(payload) {
            Ok(request) => request,
            Err(e) => return RpcResponse::failure(e.code(), e.to_string()),
        };
        if let Err(e) = validate_request(&request.request) {
            return RpcResponse::failure(e.code(), e.to_string());
        }

        match self.engine.inspect(&request).await {
            Ok(result) => RpcResponse::success(result),
            Err(e) => failure(e, "context_inspect_failed", "Failed to inspect context"),
        }
    }

    pub fn budget_get(&self) -> RpcResponse<BudgetProfile> {
        RpcResponse::success(self.engine.budget_profile())
    }

    pub fn budget_update(&self, payload: Value) -> RpcResponse<BudgetProfile> {
        let profile: BudgetProfile = match parse(payload) {
            Ok(profile) => profile,
            Err(e) => return RpcResponse::failure(e.code(), e.to_string()),
        };

        match self.engine.update_budget_profile(profile) {
            Ok(updated) => RpcResponse::success(updated),
            Err(e) => failure(e, "context_budget_update_failed", "Failed to update budget"),
        }
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, ContextError> {
    // serde messages can quote payload values, so they stay out of the response
    serde_json::from_value(payload)
        .map_err(|_| ContextError::InvalidArgument("Invalid request payload".into()))
}

/// Required identifiers present, cursor finite.
pub fn validate_request(request: &AssembleRequest) -> Result<(), ContextError> {
    let required = [
        ("projectId", &request.project_id),
        ("documentId", &request.document_id),
        ("skillId", &request.skill_id),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ContextError::InvalidArgument(format!("{name} is required")));
        }
    }
    if !request.cursor_position.is_finite() {
        return Err(ContextError::InvalidArgument(
            "cursorPosition must be a valid number".into(),
        ));
    }
    Ok(())
}

fn failure<T>(err: ContextError, event: &str, generic_message: &str) -> RpcResponse<T> {
    match err {
        ContextError::Internal(message) => {
            error!(event, code = "INTERNAL", message = %message, "Context request failed");
            RpcResponse::failure("INTERNAL", generic_message)
        }
        other => RpcResponse::failure(other.code(), other.to_string()),
    }
}
