// engine.rs — The guard engine handle.
//
// One GuardEngine owns a policy snapshot and every evaluator built from
// it. There is no module-level state: tests construct a fresh engine
// instead of resetting globals.
//
// The orchestrated check order for a proposed tool call:
//   1. provenance pre-flight (turn, taint, ref origins)
//   2. $ref resolution of the parameters
//   3. secret scan over the resolved parameters
//   4. exec analysis, or path firewall for file tools, or the network
//      allowlist for channel-bearing tools
// The first non-allow wins. A panic in any sub-check is caught and
// converted to a denial — never an allow.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Mutex;

use claw_approve::{ApprovalBridge, ApprovalReply, ApprovalRequest};
use claw_audit::{DecisionLog, DecisionRecord};
use claw_path::PathFirewall;
use claw_policy::Policy;
use claw_provenance::{ProvenanceError, ProvenanceRegistry};
use claw_secrets::SecretScanner;
use serde_json::{json, Value};

use crate::decision::{rules, Decision, Evaluation, PreflightOutcome};
use crate::exec;
use crate::network;
use crate::preflight::provenance_preflight;
use crate::shapes;

/// The per-process policy engine handle.
pub struct GuardEngine {
    policy: Policy,
    registry: ProvenanceRegistry,
    firewall: PathFirewall,
    scanner: SecretScanner,
    bridge: Option<ApprovalBridge>,
    decision_log: Option<Mutex<DecisionLog>>,
    /// Session id → rule ids the operator answered `allow-always` for.
    always_allowed: Mutex<HashMap<String, HashSet<String>>>,
    base: PathBuf,
}

impl GuardEngine {
    /// Build an engine anchored at the current working directory.
    pub fn new(policy: Policy) -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::with_base(policy, base)
    }

    /// Build an engine with an explicit base for relative paths.
    pub fn with_base(policy: Policy, base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let firewall = PathFirewall::new(
            &policy.allowed_roots,
            &policy.restricted_paths.system_critical,
            &policy.user_space.deny_on_any_access,
            &base,
        );
        let scanner = SecretScanner::new(&policy.secrets);
        let registry = ProvenanceRegistry::new(policy.provenance.clone());
        Self {
            policy,
            registry,
            firewall,
            scanner,
            bridge: None,
            decision_log: None,
            always_allowed: Mutex::new(HashMap::new()),
            base,
        }
    }

    /// Attach the human-in-the-loop approval channel.
    pub fn with_approval_bridge(mut self, bridge: ApprovalBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Attach a decision trail. Appends are best-effort and never change
    /// a decision.
    pub fn with_decision_log(mut self, log: DecisionLog) -> Self {
        self.decision_log = Some(Mutex::new(log));
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The provenance registry, for harness-side registrations such as
    /// file-content reads.
    pub fn registry(&self) -> &ProvenanceRegistry {
        &self.registry
    }

    // ── Turn boundary contract ───────────────────────────────────

    /// Start a fresh turn for a user prompt. Returns the prompt node id.
    pub fn begin_user_turn(&self, session_id: &str, text: &str) -> String {
        self.registry.begin_user_turn(session_id, text)
    }

    // ── Pre-flight contract ──────────────────────────────────────

    /// Evaluate a proposed tool call to a tri-state decision.
    ///
    /// Does not consult the approval channel; most callers want
    /// [`GuardEngine::preflight`].
    pub fn evaluate(
        &self,
        session_id: &str,
        tool_name: &str,
        params: &Value,
        tool_call_id: Option<&str>,
    ) -> Evaluation {
        if !self.policy.enabled {
            return Evaluation::allow();
        }

        let checked = catch_unwind(AssertUnwindSafe(|| {
            self.evaluate_inner(session_id, tool_name, params, tool_call_id)
        }));
        match checked {
            Ok(evaluation) => evaluation,
            Err(_) => {
                tracing::error!(session_id, tool_name, "policy evaluation panicked");
                Evaluation {
                    decision: Decision::Deny,
                    reason: Some("policy check failed (fail-closed)".to_string()),
                    rule_id: None,
                    metadata: Value::Null,
                }
            }
        }
    }

    /// Evaluate a proposed tool call to a final yes/no, resolving any
    /// `confirm` through the approval channel and appending to the
    /// decision trail.
    pub fn preflight(
        &self,
        session_id: &str,
        tool_name: &str,
        params: &Value,
        tool_call_id: Option<&str>,
    ) -> PreflightOutcome {
        let evaluation = self.evaluate(session_id, tool_name, params, tool_call_id);
        let outcome = match evaluation.decision {
            Decision::Allow => PreflightOutcome::allowed(),
            Decision::Deny => {
                tracing::info!(
                    session_id,
                    tool_name,
                    rule_id = evaluation.rule_id.as_deref().unwrap_or(""),
                    "tool call denied"
                );
                PreflightOutcome {
                    allowed: false,
                    reason: evaluation.reason,
                    rule_id: evaluation.rule_id,
                    metadata: evaluation.metadata,
                }
            }
            Decision::Confirm => self.resolve_confirm(session_id, tool_name, evaluation),
        };

        self.audit(session_id, tool_name, &outcome);
        outcome
    }

    // ── Post-tool contract ───────────────────────────────────────

    /// Record a completed tool observation. Returns the observation node
    /// id, which callers may attach to the tool output as a provenance
    /// handle.
    pub fn record(
        &self,
        session_id: &str,
        tool_name: &str,
        result: &Value,
        tool_call_id: Option<&str>,
        ok: bool,
    ) -> String {
        self.registry.auto_begin_turn(session_id);
        self.registry.mark_observation(session_id, tool_name);
        if let Some(call_id) = tool_call_id {
            self.registry.commit_pending_writes(session_id, call_id, ok);
        }
        self.registry
            .register_observation(session_id, tool_name, tool_call_id, result)
    }

    /// Resolve every `$ref` in `params` for execution.
    pub fn resolve_params(
        &self,
        session_id: &str,
        params: &Value,
    ) -> Result<Value, ProvenanceError> {
        self.registry.resolve_refs(session_id, params)
    }

    // ── Orchestration ────────────────────────────────────────────

    fn evaluate_inner(
        &self,
        session_id: &str,
        tool_name: &str,
        params: &Value,
        tool_call_id: Option<&str>,
    ) -> Evaluation {
        let evaluation = provenance_preflight(
            &self.registry,
            session_id,
            tool_name,
            params,
            tool_call_id,
            &self.base,
        );
        if !evaluation.is_allow() {
            return evaluation;
        }

        let resolved = match self.registry.resolve_refs(session_id, params) {
            Ok(resolved) => resolved,
            Err(err) => {
                return Evaluation::violation(
                    self.policy.provenance.on_violation,
                    rules::PROV_REF_UNRESOLVED,
                    err.to_string(),
                );
            }
        };

        if let Some(findings) = self.scanner.scan(tool_name, &resolved) {
            return Evaluation::deny(
                rules::SECRETS_DETECTED,
                format!(
                    "secret-like value in '{}' ({} field(s) flagged)",
                    findings.first_field, findings.count
                ),
            )
            .with_metadata(json!({
                "field": findings.first_field,
                "count": findings.count,
            }));
        }

        if tool_name == "exec" {
            return self.check_exec(&resolved);
        }
        if self.is_file_tool(tool_name) {
            return self.check_file_tool(tool_name, &resolved);
        }
        if let Some(violation) = network::check_channel(&self.policy.network, &resolved) {
            return Evaluation::deny(
                rules::NETWORK_NOT_ALLOWLISTED,
                match &violation.target {
                    Some(target) => format!(
                        "target '{target}' is not allowlisted on channel '{}'",
                        violation.channel
                    ),
                    None => format!("channel '{}' is not allowlisted", violation.channel),
                },
            );
        }

        Evaluation::allow()
    }

    fn check_exec(&self, resolved: &Value) -> Evaluation {
        let argv = exec::extract_argv(resolved);

        if exec::is_shell_wrapped(&argv) {
            return Evaluation::deny(
                rules::EXEC_SHELL_WRAPPED,
                "shell-wrapped command payloads are not inspectable",
            );
        }

        for candidate in exec::path_candidates(&argv) {
            if let Err(violation) = self.firewall.check(candidate) {
                return Evaluation::deny(violation.rule_id(), violation.to_string());
            }
        }

        if let Some(verb) = exec::destructive_without_target(&argv) {
            return Evaluation::deny(
                rules::COMMAND_DESTRUCTIVE_NO_TARGET,
                format!("destructive command '{verb}' names no explicit target"),
            );
        }

        Evaluation::allow()
    }

    fn check_file_tool(&self, tool_name: &str, resolved: &Value) -> Evaluation {
        let paths = shapes::referenced_paths(resolved);
        if paths.is_empty() {
            return Evaluation::deny(
                rules::TOOL_PARAMS_UNRECOGNIZED,
                format!("no recognised path parameter for file tool '{tool_name}'"),
            );
        }
        for path in &paths {
            if let Err(violation) = self.firewall.check(path) {
                return Evaluation::deny(violation.rule_id(), violation.to_string());
            }
        }
        Evaluation::allow()
    }

    fn is_file_tool(&self, tool_name: &str) -> bool {
        let prov = &self.policy.provenance;
        prov.file_write_tools.iter().any(|t| t == tool_name)
            || prov.file_read_tools.iter().any(|t| t == tool_name)
    }

    // ── Approval path ────────────────────────────────────────────

    fn resolve_confirm(
        &self,
        session_id: &str,
        tool_name: &str,
        evaluation: Evaluation,
    ) -> PreflightOutcome {
        let rule_id = evaluation.rule_id.clone();
        let reason = evaluation
            .reason
            .clone()
            .unwrap_or_else(|| "approval required".to_string());

        if let Some(rule) = &rule_id {
            if self.is_always_allowed(session_id, rule) {
                return PreflightOutcome::allowed();
            }
        }

        let Some(bridge) = &self.bridge else {
            return PreflightOutcome::denied(rule_id, format!("{reason} (no approval channel)"));
        };

        let request = ApprovalRequest::new(rule_id.clone().unwrap_or_default(), reason.clone())
            .with_tool(tool_name)
            .with_metadata(evaluation.metadata);
        match bridge.request(&request) {
            Some(ApprovalReply::AllowOnce) => PreflightOutcome::allowed(),
            Some(ApprovalReply::AllowAlways) => {
                if let Some(rule) = &rule_id {
                    self.remember_always_allowed(session_id, rule);
                }
                PreflightOutcome::allowed()
            }
            Some(ApprovalReply::Deny) | None => {
                PreflightOutcome::denied(rule_id, format!("{reason} (approval denied)"))
            }
        }
    }

    fn is_always_allowed(&self, session_id: &str, rule_id: &str) -> bool {
        let guard = match self.always_allowed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .get(session_id)
            .map(|rules| rules.contains(rule_id))
            .unwrap_or(false)
    }

    fn remember_always_allowed(&self, session_id: &str, rule_id: &str) {
        let mut guard = match self.always_allowed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .entry(session_id.to_string())
            .or_default()
            .insert(rule_id.to_string());
    }

    // ── Decision trail ───────────────────────────────────────────

    fn audit(&self, session_id: &str, tool_name: &str, outcome: &PreflightOutcome) {
        let Some(log) = &self.decision_log else {
            return;
        };
        let decision = if outcome.allowed { "allow" } else { "deny" };
        let mut record = DecisionRecord::new(session_id, tool_name, decision);
        if let Some(rule_id) = &outcome.rule_id {
            record = record.with_rule(rule_id.clone());
        }
        if let Some(reason) = &outcome.reason {
            record = record.with_reason(reason.clone());
        }

        let mut guard = match log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = guard.append(&mut record) {
            tracing::warn!(%err, "failed to append decision record");
        }
    }
}
