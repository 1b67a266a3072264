//! Inspect access policy: who may read full layer content.
//!
//! Inspect is allowed only with debug mode on AND a caller role from the
//! configured list. Roles compare trimmed and lower-cased; there is no
//! wildcard.

use ctxloom_config::InspectConfig;

/// Result of checking an inspect caller.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectCheckResult {
    /// Caller may inspect
    Allowed,
    /// Caller is denied
    Denied { reason: String },
}

impl InspectCheckResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Role-based inspect policy.
#[derive(Debug, Clone)]
pub struct InspectPolicy {
    allowed_roles: Vec<String>,
}

impl Default for InspectPolicy {
    fn default() -> Self {
        Self::from_config(&InspectConfig::default())
    }
}

impl InspectPolicy {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_roles = roles
            .into_iter()
            .map(|r| normalize_role(r.as_ref()))
            .filter(|r| !r.is_empty())
            .collect();
        Self { allowed_roles }
    }

    pub fn from_config(config: &InspectConfig) -> Self {
        Self::new(&config.allowed_roles)
    }

    /// Check a caller against the policy.
    pub fn check(&self, debug_mode: bool, caller_role: &str) -> InspectCheckResult {
        if !debug_mode {
            return InspectCheckResult::Denied {
                reason: "Debug mode is off".into(),
            };
        }

        let role = normalize_role(caller_role);
        if role.is_empty() {
            return InspectCheckResult::Denied {
                reason: "No caller role supplied".into(),
            };
        }

        if self.allowed_roles.iter().any(|r| *r == role) {
            InspectCheckResult::Allowed
        } else {
            InspectCheckResult::Denied {
                reason: format!(
                    "Role '{role}' not permitted ({} roles configured)",
                    self.allowed_roles.len()
                ),
            }
        }
    }
}

fn normalize_role(role: &str) -> String {
    role.trim().to_lowercase()
}
