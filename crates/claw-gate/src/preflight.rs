// preflight.rs — Provenance pre-flight for a proposed tool call.
//
// Decides from session history alone: which turn we are in, whether the
// turn is tainted, and where the data referenced by the parameters came
// from. Parameter *content* checks (secrets, paths, exec analysis) come
// later in the orchestrator; this stage is pure with respect to the
// registry except for inserting the pending write of a file-write tool.

use std::path::Path;

use claw_provenance::{collect_refs, DataKind, ProvenanceRegistry, RefStatus};
use serde_json::{json, Value};

use crate::decision::{rules, Evaluation};
use crate::shapes::declared_write_paths;

pub(crate) fn provenance_preflight(
    registry: &ProvenanceRegistry,
    session_id: &str,
    tool_name: &str,
    params: &Value,
    tool_call_id: Option<&str>,
    base: &Path,
) -> Evaluation {
    let config = registry.config().clone();
    if !config.enabled {
        return Evaluation::allow();
    }

    registry.auto_begin_turn(session_id);
    let current_turn = registry.turn(session_id);

    // A file-write tool declares its targets up front; they are committed
    // to the write ledger only when the call later reports success.
    if config.file_write_tools.iter().any(|t| t == tool_name) {
        let paths: Vec<String> = declared_write_paths(params)
            .iter()
            .map(|raw| claw_path::resolve(raw, base))
            .collect();
        if !paths.is_empty() {
            let call_id = tool_call_id
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            registry.insert_pending_write(session_id, &call_id, paths);
        }
    }

    // Classify every referenced id.
    let mut missing = Vec::new();
    let mut stale = Vec::new();
    let mut non_user = Vec::new();
    for id in collect_refs(params) {
        match registry.ref_status(session_id, &id) {
            RefStatus::Missing => missing.push(id),
            RefStatus::Found { kind, turn } => {
                if config.current_turn_only && turn != current_turn {
                    stale.push(id.clone());
                }
                if config.forbid_non_user_data && kind != DataKind::UserPrompt {
                    non_user.push(id);
                }
            }
        }
    }

    if !missing.is_empty() {
        return Evaluation::violation(
            config.on_violation,
            rules::PROV_REF_UNRESOLVED,
            format!("unresolved data reference '{}'", missing[0]),
        )
        .with_metadata(json!({ "missing": missing }));
    }

    let high_risk =
        tool_name == "exec" || config.high_risk_tools.iter().any(|t| t == tool_name);
    if high_risk {
        if config.require_clean_for_high_risk && registry.is_tainted(session_id) {
            return Evaluation::violation(
                config.on_violation,
                rules::PROV_HIGH_RISK_AFTER_UNTRUSTED,
                format!("'{tool_name}' blocked: untrusted data entered this turn"),
            );
        }
        if let Some(id) = stale.first() {
            return Evaluation::violation(
                config.on_violation,
                rules::PROV_HIGH_RISK_STALE_SOURCE,
                format!("'{tool_name}' references '{id}' from an earlier turn"),
            )
            .with_metadata(json!({ "stale": stale }));
        }
        if let Some(id) = non_user.first() {
            return Evaluation::violation(
                config.on_violation,
                rules::PROV_HIGH_RISK_NON_USER_SOURCE,
                format!("'{tool_name}' references '{id}', which did not come from the user"),
            )
            .with_metadata(json!({ "non_user": non_user }));
        }
    }

    Evaluation::allow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use claw_policy::ProvenancePolicy;
    use serde_json::json;

    fn registry(config: ProvenancePolicy) -> ProvenanceRegistry {
        ProvenanceRegistry::new(config)
    }

    fn preflight(reg: &ProvenanceRegistry, tool: &str, params: &Value) -> Evaluation {
        provenance_preflight(reg, "s1", tool, params, Some("call-1"), Path::new("/"))
    }

    #[test]
    fn clean_exec_is_allowed() {
        let reg = registry(ProvenancePolicy::default());
        reg.begin_user_turn("s1", "hi");
        let ev = preflight(&reg, "exec", &json!({"command": "echo hi"}));
        assert!(ev.is_allow());
    }

    #[test]
    fn disabled_provenance_short_circuits() {
        let reg = registry(ProvenancePolicy {
            enabled: false,
            ..ProvenancePolicy::default()
        });
        let ev = preflight(&reg, "exec", &json!({"command": {"$ref": "obs:t9:none"}}));
        assert!(ev.is_allow());
    }

    #[test]
    fn missing_ref_fires_before_high_risk_rules() {
        let reg = registry(ProvenancePolicy::default());
        reg.begin_user_turn("s1", "hi");
        reg.mark_observation("s1", "read");

        let ev = preflight(&reg, "exec", &json!({"command": {"$ref": "obs:t999:missing"}}));
        assert_eq!(ev.decision, Decision::Deny);
        assert_eq!(ev.rule_id.as_deref(), Some(rules::PROV_REF_UNRESOLVED));
    }

    #[test]
    fn tainted_turn_blocks_high_risk() {
        let reg = registry(ProvenancePolicy::default());
        reg.begin_user_turn("s1", "hi");
        reg.mark_observation("s1", "read");

        let ev = preflight(&reg, "exec", &json!({"command": "echo x"}));
        assert_eq!(ev.decision, Decision::Deny);
        assert_eq!(
            ev.rule_id.as_deref(),
            Some(rules::PROV_HIGH_RISK_AFTER_UNTRUSTED)
        );
    }

    #[test]
    fn tainted_turn_does_not_block_low_risk() {
        let reg = registry(ProvenancePolicy::default());
        reg.begin_user_turn("s1", "hi");
        reg.mark_observation("s1", "read");

        let ev = preflight(&reg, "read", &json!({"path": "/work/a.txt"}));
        assert!(ev.is_allow());
    }

    #[test]
    fn stale_ref_blocks_high_risk_across_turns() {
        let config = ProvenancePolicy {
            require_clean_for_high_risk: false,
            ..ProvenancePolicy::default()
        };
        let reg = registry(config);
        reg.begin_user_turn("s1", "t1");
        let obs = reg.register_observation("s1", "read", Some("c0"), &json!("X"));

        reg.begin_user_turn("s1", "t2");
        let ev = preflight(&reg, "exec", &json!({"command": {"$ref": obs}}));
        assert_eq!(ev.decision, Decision::Deny);
        assert_eq!(
            ev.rule_id.as_deref(),
            Some(rules::PROV_HIGH_RISK_STALE_SOURCE)
        );
    }

    #[test]
    fn non_user_ref_blocks_high_risk_within_turn() {
        let config = ProvenancePolicy {
            require_clean_for_high_risk: false,
            ..ProvenancePolicy::default()
        };
        let reg = registry(config);
        reg.begin_user_turn("s1", "t1");
        let obs = reg.register_observation("s1", "read", Some("c0"), &json!("X"));

        let ev = preflight(&reg, "exec", &json!({"command": {"$ref": obs}}));
        assert_eq!(ev.decision, Decision::Deny);
        assert_eq!(
            ev.rule_id.as_deref(),
            Some(rules::PROV_HIGH_RISK_NON_USER_SOURCE)
        );
    }

    #[test]
    fn user_prompt_ref_is_fine_for_high_risk() {
        let reg = registry(ProvenancePolicy::default());
        let prompt = reg.begin_user_turn("s1", "run this");

        let ev = preflight(&reg, "exec", &json!({"command": {"$ref": prompt}}));
        assert!(ev.is_allow());
    }

    #[test]
    fn confirm_mode_turns_violations_into_confirm() {
        let config = ProvenancePolicy {
            on_violation: claw_policy::OnViolation::Confirm,
            ..ProvenancePolicy::default()
        };
        let reg = registry(config);
        reg.begin_user_turn("s1", "hi");
        reg.mark_observation("s1", "read");

        let ev = preflight(&reg, "exec", &json!({"command": "echo x"}));
        assert_eq!(ev.decision, Decision::Confirm);
    }

    #[test]
    fn write_tool_records_a_pending_write() {
        let reg = registry(ProvenancePolicy::default());
        reg.begin_user_turn("s1", "hi");

        let ev = preflight(&reg, "write", &json!({"path": "/work/out.txt", "content": "x"}));
        assert!(ev.is_allow());

        // Completing the call commits the write; a same-turn read of the
        // file then does not taint.
        reg.commit_pending_writes("s1", "call-1", true);
        reg.register_file_content("s1", "/work/out.txt", &json!("x"));
        assert!(!reg.is_tainted("s1"));
    }

    #[test]
    fn preflight_does_not_advance_an_active_turn() {
        let reg = registry(ProvenancePolicy::default());
        reg.begin_user_turn("s1", "hi");
        preflight(&reg, "exec", &json!({"command": "echo hi"}));
        assert_eq!(reg.turn("s1"), 1);
    }
}
