//! Audit logging: structured security event logging.
//!
//! Records rejected context requests. Events carry identifiers, counts, and
//! hashes only; request text and layer content never reach an entry.

use chrono::{DateTime, Utc};
use ctxloom_core::LayerId;
use serde::{Deserialize, Serialize};

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub actor: String,
    pub target: String,
    pub details: Option<String>,
}

/// Types of auditable security events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A layer returned a chunk owned by another project
    ContextScopeViolation {
        project_id: String,
        document_id: String,
        layer: LayerId,
        foreign_project_id: String,
    },
    /// Inspect was refused by the access policy
    ContextInspectForbidden {
        project_id: String,
        document_id: String,
        requested_by: String,
        caller_role: String,
        debug_mode: bool,
        input_token_count: usize,
        input_hash: String,
    },
    /// A document already had the maximum number of in-flight requests
    ContextBackpressure {
        project_id: String,
        document_id: String,
        in_flight: usize,
        limit: usize,
    },
    /// The caller's input exceeded the token limit
    ContextInputTooLarge {
        project_id: String,
        document_id: String,
        input_tokens: usize,
        max_input_tokens: usize,
    },
}

impl AuditEvent {
    /// Event name as written to logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContextScopeViolation { .. } => "context_scope_violation",
            Self::ContextInspectForbidden { .. } => "context_inspect_forbidden",
            Self::ContextBackpressure { .. } => "context_backpressure",
            Self::ContextInputTooLarge { .. } => "context_input_too_large",
        }
    }
}

/// Trait for audit log sinks (where events are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Audit logger that keeps entries in memory and forwards them to sinks.
pub struct AuditLogger {
    entries: std::sync::Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(Vec::new()),
            sinks: Vec::new(),
        }
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: std::sync::Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// Audit logger forwarding to [`TracingSink`].
    pub fn tracing() -> Self {
        Self::with_sinks(vec![Box::new(TracingSink)])
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        actor: &str,
        target: &str,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            target: target.into(),
            details,
        };

        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Get entries whose event has the given name.
    pub fn entries_named(&self, name: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.event.name() == name)
            .cloned()
            .collect()
    }

    /// Clear all stored entries.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        let fields = serde_json::to_string(&entry.event).unwrap_or_default();
        tracing::info!(
            target: "audit",
            event = entry.event.name(),
            actor = %entry.actor,
            resource = %entry.target,
            fields = %fields,
            details = ?entry.details,
            "AUDIT"
        );
    }
}
