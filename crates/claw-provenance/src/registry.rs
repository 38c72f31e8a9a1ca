// registry.rs — The per-process provenance registry.
//
// One registry instance owns every session. Sessions are created lazily
// on first reference. Within a session the agent harness serialises
// calls, so the only synchronisation here is the map-level mutex.
//
// Turn inference: `begin_user_turn` is the authoritative entry point.
// `auto_begin_turn` is a safety net for callers that have not wired
// explicit prompt notifications — it fires on the first event of a
// session and after the configured idle gap, and is logged because a
// wall-clock heuristic is a hazard, not a feature.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use claw_policy::ProvenancePolicy;
use serde_json::Value;

use crate::error::ProvenanceError;
use crate::node::{file_content_id, observation_id, user_prompt_id, DataKind, DataNode};
use crate::refs::resolve_with;
use crate::session::{PendingWrite, Session};

/// What the registry knows about a referenced id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefStatus {
    /// Not registered in this session.
    Missing,
    /// Registered; the caller decides what the kind and turn imply.
    Found { kind: DataKind, turn: u64 },
}

/// Handle owning all per-session provenance state.
#[derive(Debug)]
pub struct ProvenanceRegistry {
    config: ProvenancePolicy,
    sessions: Mutex<HashMap<String, Session>>,
}

impl ProvenanceRegistry {
    pub fn new(config: ProvenancePolicy) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ProvenancePolicy {
        &self.config
    }

    /// Start a fresh turn for a user prompt. Returns the prompt node id.
    pub fn begin_user_turn(&self, session_id: &str, text: &str) -> String {
        let now = Utc::now();
        self.with_session(session_id, |session| {
            session.begin_turn(now);
            register_prompt(session, text)
        })
    }

    /// Infer a turn boundary when none was announced.
    ///
    /// Fires when the session has no turn yet or the idle window elapsed;
    /// always refreshes `last_event_at`.
    pub fn auto_begin_turn(&self, session_id: &str) {
        let idle_ms = self.config.turn_idle_ms;
        let now = Utc::now();
        self.with_session(session_id, |session| {
            if session.turn == 0 || session.idle_elapsed(now, idle_ms) {
                tracing::warn!(
                    session_id,
                    turn = session.turn + 1,
                    "inferring turn boundary without an explicit user prompt"
                );
                session.begin_turn(now);
                register_prompt(session, "");
            }
            session.last_event_at = now;
        });
    }

    /// Register a user prompt node for the current turn without advancing
    /// the turn. Most callers want [`ProvenanceRegistry::begin_user_turn`].
    pub fn register_user_prompt(&self, session_id: &str, text: &str) -> String {
        self.with_session(session_id, |session| register_prompt(session, text))
    }

    /// Register a tool observation, idempotently per `tool_call_id`.
    ///
    /// Re-registering an id the session has already seen returns the
    /// existing node id without creating a second node.
    pub fn register_observation(
        &self,
        session_id: &str,
        tool: &str,
        tool_call_id: Option<&str>,
        result: &Value,
    ) -> String {
        let max_bytes = self.config.max_stored_value_bytes;
        let now = Utc::now();
        self.with_session(session_id, |session| {
            if let Some(call_id) = tool_call_id {
                if let Some(existing) = session.obs_by_call.get(call_id) {
                    return existing.clone();
                }
            }

            let discriminator = match tool_call_id {
                Some(call_id) => call_id.to_string(),
                None => now.timestamp_millis().to_string(),
            };
            let id = observation_id(session.turn, tool, &discriminator);
            let node = DataNode::new(
                id.clone(),
                DataKind::ToolObservation,
                session.turn,
                result.clone(),
                max_bytes,
            )
            .with_tool(tool);
            session.data.insert(id.clone(), node);
            if let Some(call_id) = tool_call_id {
                session.obs_by_call.insert(call_id.to_string(), id.clone());
            }
            id
        })
    }

    /// Register file content read into the session context.
    ///
    /// Under `current_turn_only`, content from a file this session did not
    /// write in the current turn taints the turn: its freshness cannot be
    /// vouched for.
    pub fn register_file_content(&self, session_id: &str, path: &str, content: &Value) -> String {
        let max_bytes = self.config.max_stored_value_bytes;
        let current_turn_only = self.config.current_turn_only;
        self.with_session(session_id, |session| {
            let resource = format!("file:{path}");
            if current_turn_only
                && session.resource_last_write_turn.get(&resource) != Some(&session.turn)
            {
                session.tainted = true;
            }

            let id = file_content_id(session.turn, path);
            let node = DataNode::new(
                id.clone(),
                DataKind::FileContent,
                session.turn,
                content.clone(),
                max_bytes,
            )
            .with_resource(resource);
            session.data.insert(id.clone(), node);
            id
        })
    }

    /// Taint the turn for a non-trusted tool observation.
    pub fn mark_observation(&self, session_id: &str, tool: &str) {
        if self
            .config
            .trusted_observation_tools
            .iter()
            .any(|t| t == tool)
        {
            return;
        }
        self.with_session(session_id, |session| {
            session.tainted = true;
        });
    }

    /// Record paths a file-write tool intends to touch.
    pub fn insert_pending_write(&self, session_id: &str, tool_call_id: &str, paths: Vec<String>) {
        let now = Utc::now();
        self.with_session(session_id, |session| {
            session.pending_writes.insert(
                tool_call_id.to_string(),
                PendingWrite {
                    tool_call_id: tool_call_id.to_string(),
                    paths,
                    turn: session.turn,
                    created_at: now,
                },
            );
        });
    }

    /// Commit or discard the pending write for a completed tool call.
    ///
    /// On success every declared path is stamped with the pending turn in
    /// `resource_last_write_turn`; either way the entry is removed, so a
    /// duplicate record commits at most once.
    pub fn commit_pending_writes(&self, session_id: &str, tool_call_id: &str, ok: bool) {
        self.with_session(session_id, |session| {
            let Some(pending) = session.pending_writes.remove(tool_call_id) else {
                return;
            };
            if ok {
                for path in &pending.paths {
                    session
                        .resource_last_write_turn
                        .insert(format!("file:{path}"), pending.turn);
                }
            }
        });
    }

    /// Resolve every `$ref` in `params` against this session's data.
    ///
    /// Fails closed if any referenced id is absent or its value was not
    /// retained.
    pub fn resolve_refs(&self, session_id: &str, params: &Value) -> Result<Value, ProvenanceError> {
        self.with_session(session_id, |session| {
            let data = &session.data;
            resolve_with(params, &|id| {
                data.get(id).and_then(|node| node.value.clone())
            })
        })
    }

    /// Look up the kind and turn of a referenced id.
    pub fn ref_status(&self, session_id: &str, id: &str) -> RefStatus {
        self.with_session(session_id, |session| match session.data.get(id) {
            Some(node) => RefStatus::Found {
                kind: node.kind,
                turn: node.turn,
            },
            None => RefStatus::Missing,
        })
    }

    pub fn turn(&self, session_id: &str) -> u64 {
        self.with_session(session_id, |session| session.turn)
    }

    pub fn is_tainted(&self, session_id: &str) -> bool {
        self.with_session(session_id, |session| session.tainted)
    }

    fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(Utc::now()));
        f(session)
    }

    /// Test hook: age the session so the next `auto_begin_turn` infers a
    /// new turn.
    #[cfg(test)]
    fn backdate_last_event(&self, session_id: &str, ms: i64) {
        self.with_session(session_id, |session| {
            session.last_event_at -= chrono::Duration::milliseconds(ms);
        });
    }
}

fn register_prompt(session: &mut Session, text: &str) -> String {
    let id = user_prompt_id(session.turn);
    // Prompts are not size-capped in practice; reuse the node constructor
    // with a cap large enough to always retain.
    let node = DataNode::new(
        id.clone(),
        DataKind::UserPrompt,
        session.turn,
        Value::String(text.to_string()),
        usize::MAX,
    );
    session.data.insert(id.clone(), node);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_policy::ProvenancePolicy;
    use serde_json::json;

    fn registry() -> ProvenanceRegistry {
        ProvenanceRegistry::new(ProvenancePolicy::default())
    }

    #[test]
    fn begin_user_turn_advances_and_returns_prompt_id() {
        let reg = registry();
        let id = reg.begin_user_turn("s1", "hello");
        assert_eq!(id, "user:t1:prompt");
        assert_eq!(reg.turn("s1"), 1);
        assert!(!reg.is_tainted("s1"));

        let id = reg.begin_user_turn("s1", "again");
        assert_eq!(id, "user:t2:prompt");
        assert_eq!(reg.turn("s1"), 2);
    }

    #[test]
    fn register_user_prompt_does_not_advance_the_turn() {
        let reg = registry();
        reg.begin_user_turn("s1", "first");
        let id = reg.register_user_prompt("s1", "revised prompt");
        assert_eq!(id, "user:t1:prompt");
        assert_eq!(reg.turn("s1"), 1);

        let resolved = reg.resolve_refs("s1", &json!({"$ref": id})).unwrap();
        assert_eq!(resolved, json!("revised prompt"));
    }

    #[test]
    fn turn_is_monotonic_across_operations() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        let before = reg.turn("s1");
        reg.register_observation("s1", "read", Some("c1"), &json!("data"));
        reg.resolve_refs("s1", &json!({})).unwrap();
        reg.mark_observation("s1", "read");
        assert_eq!(reg.turn("s1"), before);
    }

    #[test]
    fn taint_sets_on_untrusted_observation_and_clears_on_new_turn() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        reg.mark_observation("s1", "read");
        assert!(reg.is_tainted("s1"));

        // Monotonic within the turn.
        reg.mark_observation("s1", "read");
        assert!(reg.is_tainted("s1"));

        reg.begin_user_turn("s1", "b");
        assert!(!reg.is_tainted("s1"));
    }

    #[test]
    fn trusted_tool_does_not_taint() {
        let config = ProvenancePolicy {
            trusted_observation_tools: vec!["status".to_string()],
            ..ProvenancePolicy::default()
        };
        let reg = ProvenanceRegistry::new(config);
        reg.begin_user_turn("s1", "a");
        reg.mark_observation("s1", "status");
        assert!(!reg.is_tainted("s1"));
    }

    #[test]
    fn auto_begin_starts_first_turn() {
        let reg = registry();
        reg.auto_begin_turn("s1");
        assert_eq!(reg.turn("s1"), 1);
    }

    #[test]
    fn auto_begin_is_quiet_within_the_idle_window() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        reg.auto_begin_turn("s1");
        assert_eq!(reg.turn("s1"), 1);
    }

    #[test]
    fn auto_begin_infers_turn_after_idle_gap() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        reg.mark_observation("s1", "read");
        reg.backdate_last_event("s1", 20_000);

        reg.auto_begin_turn("s1");
        assert_eq!(reg.turn("s1"), 2);
        assert!(!reg.is_tainted("s1"));
    }

    #[test]
    fn observation_round_trips_through_resolve() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        let id = reg.register_observation("s1", "read", Some("c1"), &json!({"content": "X"}));

        let resolved = reg.resolve_refs("s1", &json!({"data": {"$ref": id}})).unwrap();
        assert_eq!(resolved, json!({"data": {"content": "X"}}));
    }

    #[test]
    fn observation_is_idempotent_per_call_id() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        let first = reg.register_observation("s1", "read", Some("c1"), &json!("x"));
        let second = reg.register_observation("s1", "read", Some("c1"), &json!("y"));
        assert_eq!(first, second);

        // The original value wins.
        let resolved = reg.resolve_refs("s1", &json!({"$ref": first})).unwrap();
        assert_eq!(resolved, json!("x"));
    }

    #[test]
    fn resolve_fails_for_other_sessions_ids() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        let id = reg.register_observation("s1", "read", Some("c1"), &json!("x"));

        let err = reg.resolve_refs("s2", &json!({"$ref": id})).unwrap_err();
        assert_eq!(err.rule_id(), "prov.ref_unresolved");
    }

    #[test]
    fn oversized_value_is_not_resolvable() {
        let config = ProvenancePolicy {
            max_stored_value_bytes: 16,
            ..ProvenancePolicy::default()
        };
        let reg = ProvenanceRegistry::new(config);
        reg.begin_user_turn("s1", "a");
        let id = reg.register_observation(
            "s1",
            "read",
            Some("c1"),
            &json!("a long payload well past the sixteen byte cap"),
        );

        assert!(matches!(reg.ref_status("s1", &id), RefStatus::Found { .. }));
        let err = reg.resolve_refs("s1", &json!({"$ref": id})).unwrap_err();
        assert_eq!(err, ProvenanceError::RefUnresolved { id });
    }

    #[test]
    fn ref_status_reports_kind_and_turn() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        let obs = reg.register_observation("s1", "read", Some("c1"), &json!("x"));
        reg.begin_user_turn("s1", "b");

        match reg.ref_status("s1", &obs) {
            RefStatus::Found { kind, turn } => {
                assert_eq!(kind, DataKind::ToolObservation);
                assert_eq!(turn, 1);
            }
            RefStatus::Missing => panic!("expected Found"),
        }
        assert_eq!(reg.ref_status("s1", "obs:t9:nope"), RefStatus::Missing);
    }

    #[test]
    fn pending_write_commits_on_success() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        reg.insert_pending_write("s1", "c1", vec!["/work/out.txt".to_string()]);
        reg.commit_pending_writes("s1", "c1", true);

        // A read of the freshly written file does not taint.
        reg.register_file_content("s1", "/work/out.txt", &json!("content"));
        assert!(!reg.is_tainted("s1"));
    }

    #[test]
    fn pending_write_discards_on_failure() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        reg.insert_pending_write("s1", "c1", vec!["/work/out.txt".to_string()]);
        reg.commit_pending_writes("s1", "c1", false);

        reg.register_file_content("s1", "/work/out.txt", &json!("content"));
        assert!(reg.is_tainted("s1"));
    }

    #[test]
    fn stale_file_read_taints_under_current_turn_only() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        reg.insert_pending_write("s1", "c1", vec!["/work/out.txt".to_string()]);
        reg.commit_pending_writes("s1", "c1", true);

        // Next turn: last write is now a turn behind.
        reg.begin_user_turn("s1", "b");
        reg.register_file_content("s1", "/work/out.txt", &json!("content"));
        assert!(reg.is_tainted("s1"));
    }

    #[test]
    fn file_read_without_tracking_does_not_taint_when_disabled() {
        let config = ProvenancePolicy {
            current_turn_only: false,
            ..ProvenancePolicy::default()
        };
        let reg = ProvenanceRegistry::new(config);
        reg.begin_user_turn("s1", "a");
        reg.register_file_content("s1", "/anywhere.txt", &json!("content"));
        assert!(!reg.is_tainted("s1"));
    }

    #[test]
    fn duplicate_commit_is_a_no_op() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        reg.insert_pending_write("s1", "c1", vec!["/work/out.txt".to_string()]);
        reg.commit_pending_writes("s1", "c1", true);

        reg.begin_user_turn("s1", "b");
        // Second commit of the same call must not stamp turn 2.
        reg.commit_pending_writes("s1", "c1", true);
        reg.register_file_content("s1", "/work/out.txt", &json!("content"));
        assert!(reg.is_tainted("s1"));
    }

    #[test]
    fn sessions_are_isolated() {
        let reg = registry();
        reg.begin_user_turn("s1", "a");
        reg.mark_observation("s1", "read");
        reg.begin_user_turn("s2", "b");

        assert!(reg.is_tainted("s1"));
        assert!(!reg.is_tainted("s2"));
    }
}
