//! Security module for ctxloom: inspect access policy, input fingerprints,
//! and audit logging.
//!
//! Provides:
//! - **Inspect policy**: who may read full layer content
//! - **Fingerprints**: one-way hashes standing in for raw input in logs
//! - **Audit logging**: Structured security event logging

pub mod audit;
pub mod fingerprint;
pub mod policy;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditSink, TracingSink};
pub use fingerprint::{InputFingerprint, sha256_hex};
pub use policy::{InspectCheckResult, InspectPolicy};
