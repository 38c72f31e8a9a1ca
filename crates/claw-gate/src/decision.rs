// decision.rs — Decision types and stable rule ids.

use claw_policy::OnViolation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable rule ids, used by operators and tests. Path rules live on
/// `claw_path::PathViolation::rule_id`.
pub mod rules {
    pub const PROV_REF_UNRESOLVED: &str = "prov.ref_unresolved";
    pub const PROV_HIGH_RISK_AFTER_UNTRUSTED: &str = "prov.high_risk_after_untrusted";
    pub const PROV_HIGH_RISK_STALE_SOURCE: &str = "prov.high_risk_stale_source";
    pub const PROV_HIGH_RISK_NON_USER_SOURCE: &str = "prov.high_risk_non_user_source";
    pub const SECRETS_DETECTED: &str = "secrets.detected";
    pub const NETWORK_NOT_ALLOWLISTED: &str = "network.not_allowlisted";
    pub const EXEC_SHELL_WRAPPED: &str = "exec.shell_wrapped";
    pub const COMMAND_DESTRUCTIVE_NO_TARGET: &str = "command.destructive.no_target";
    pub const TOOL_PARAMS_UNRECOGNIZED: &str = "tool.params_unrecognized";
}

/// What the evaluator wants done with a proposed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    Confirm,
}

/// A policy evaluation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub reason: Option<String>,
    pub rule_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl Evaluation {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: None,
            rule_id: None,
            metadata: Value::Null,
        }
    }

    pub fn deny(rule_id: &str, reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            rule_id: Some(rule_id.to_string()),
            metadata: Value::Null,
        }
    }

    /// A violation whose severity the policy chooses (`onViolation`).
    pub fn violation(on_violation: OnViolation, rule_id: &str, reason: impl Into<String>) -> Self {
        let decision = match on_violation {
            OnViolation::Deny => Decision::Deny,
            OnViolation::Confirm => Decision::Confirm,
        };
        Self {
            decision,
            reason: Some(reason.into()),
            rule_id: Some(rule_id.to_string()),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// The contract handed back to the agent harness: a final yes/no after
/// any `confirm` has been resolved through the approval channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightOutcome {
    pub allowed: bool,
    pub reason: Option<String>,
    pub rule_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl PreflightOutcome {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            rule_id: None,
            metadata: Value::Null,
        }
    }

    pub fn denied(rule_id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            rule_id,
            metadata: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_serialises_snake_case() {
        assert_eq!(serde_json::to_string(&Decision::Allow).unwrap(), "\"allow\"");
        assert_eq!(
            serde_json::to_string(&Decision::Confirm).unwrap(),
            "\"confirm\""
        );
    }

    #[test]
    fn violation_maps_on_violation_to_decision() {
        let deny = Evaluation::violation(OnViolation::Deny, rules::PROV_REF_UNRESOLVED, "x");
        assert_eq!(deny.decision, Decision::Deny);

        let confirm = Evaluation::violation(OnViolation::Confirm, rules::PROV_REF_UNRESOLVED, "x");
        assert_eq!(confirm.decision, Decision::Confirm);
        assert_eq!(confirm.rule_id.as_deref(), Some("prov.ref_unresolved"));
    }
}
