// network.rs — Outbound channel allowlist.
//
// Applies to tool calls that name a `channel`. An empty allowlist
// disables the check; once any channel is configured, a named channel
// must have an entry and the target (when present) must match one of the
// entry's glob patterns.

use claw_policy::NetworkPolicy;
use glob::Pattern;
use serde_json::Value;

/// Keys the target of an outbound message may live under.
const TARGET_KEYS: &[&str] = &["to", "target", "recipient"];

/// A failed allowlist check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkViolation {
    pub channel: String,
    pub target: Option<String>,
}

/// Check an outbound call against the allowlist.
///
/// Returns `None` when the call is in-policy or out of the check's scope
/// (no allowlist configured, or no `channel` parameter).
pub fn check_channel(policy: &NetworkPolicy, params: &Value) -> Option<NetworkViolation> {
    if policy.allowlist.is_empty() {
        return None;
    }
    let channel = params.get("channel").and_then(Value::as_str)?;

    let target = params
        .as_object()
        .and_then(|map| TARGET_KEYS.iter().find_map(|key| map.get(*key)))
        .and_then(Value::as_str);

    let Some(patterns) = policy.allowlist.get(channel) else {
        return Some(NetworkViolation {
            channel: channel.to_string(),
            target: target.map(str::to_string),
        });
    };

    match target {
        // A channel entry with no target to test: the entry itself is the
        // grant.
        None => None,
        Some(target) => {
            let allowed = patterns.iter().any(|pattern| {
                // Invalid patterns never match (fail-closed).
                Pattern::new(pattern)
                    .map(|p| p.matches(target))
                    .unwrap_or(false)
            });
            if allowed {
                None
            } else {
                Some(NetworkViolation {
                    channel: channel.to_string(),
                    target: Some(target.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_policy::NetworkPolicy;
    use serde_json::json;

    fn policy(entries: &[(&str, &[&str])]) -> NetworkPolicy {
        NetworkPolicy {
            allowlist: entries
                .iter()
                .map(|(channel, patterns)| {
                    (
                        channel.to_string(),
                        patterns.iter().map(|p| p.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn empty_allowlist_disables_the_check() {
        let policy = NetworkPolicy::default();
        let params = json!({"channel": "slack", "to": "#anywhere"});
        assert!(check_channel(&policy, &params).is_none());
    }

    #[test]
    fn matching_target_is_allowed() {
        let policy = policy(&[("slack", &["#eng-*"])]);
        let params = json!({"channel": "slack", "to": "#eng-build"});
        assert!(check_channel(&policy, &params).is_none());
    }

    #[test]
    fn non_matching_target_is_a_violation() {
        let policy = policy(&[("slack", &["#eng-*"])]);
        let params = json!({"channel": "slack", "to": "#exec-board"});
        let violation = check_channel(&policy, &params).unwrap();
        assert_eq!(violation.channel, "slack");
        assert_eq!(violation.target.as_deref(), Some("#exec-board"));
    }

    #[test]
    fn unlisted_channel_is_a_violation() {
        let policy = policy(&[("slack", &["#eng-*"])]);
        let params = json!({"channel": "email", "to": "a@b.example"});
        assert!(check_channel(&policy, &params).is_some());
    }

    #[test]
    fn call_without_channel_is_out_of_scope() {
        let policy = policy(&[("slack", &["#eng-*"])]);
        assert!(check_channel(&policy, &json!({"to": "#eng-build"})).is_none());
    }

    #[test]
    fn invalid_pattern_never_matches() {
        let policy = policy(&[("slack", &["[broken"])]);
        let params = json!({"channel": "slack", "to": "#eng-build"});
        assert!(check_channel(&policy, &params).is_some());
    }

    #[test]
    fn alternate_target_keys_are_consulted() {
        let policy = policy(&[("email", &["*@corp.example"])]);
        assert!(check_channel(
            &policy,
            &json!({"channel": "email", "recipient": "dev@corp.example"})
        )
        .is_none());
        assert!(check_channel(
            &policy,
            &json!({"channel": "email", "recipient": "x@evil.example"})
        )
        .is_some());
    }
}
