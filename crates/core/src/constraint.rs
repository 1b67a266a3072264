//! Writing constraints carried by the rules layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a constraint came from. User constraints always outrank
/// knowledge-graph constraints, whatever their priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintSource {
    User,
    Kg,
}

impl ConstraintSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Kg => "kg",
        }
    }
}

impl std::fmt::Display for ConstraintSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rule or preference injected into the rules layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintItem {
    pub id: String,
    pub text: String,
    pub source: ConstraintSource,
    pub priority: i64,
    pub updated_at: DateTime<Utc>,
    /// Whether the item may be dropped under budget pressure. Required:
    /// there is no safe implicit default.
    pub degradable: bool,
}

/// Why a constraint was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrimReason {
    KgLowPriority,
    UserDegradable,
}

impl From<ConstraintSource> for TrimReason {
    fn from(source: ConstraintSource) -> Self {
        match source {
            ConstraintSource::User => Self::UserDegradable,
            ConstraintSource::Kg => Self::KgLowPriority,
        }
    }
}

/// Record of one constraint dropped by the trimmer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintTrimLog {
    pub constraint_id: String,
    pub reason: TrimReason,
    pub token_freed: usize,
}
