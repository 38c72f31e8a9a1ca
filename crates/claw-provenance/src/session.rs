// session.rs — Per-session mutable state.
//
// A session is created lazily on first reference and lives for the
// process lifetime. Data nodes are never evicted individually; they are
// bounded indirectly by turn count times nodes per turn.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::DataNode;

/// Paths a file-write tool declared before executing, committed to
/// `resource_last_write_turn` once the tool reports success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingWrite {
    pub tool_call_id: String,
    pub paths: Vec<String>,
    /// The turn the write was proposed in; commits record this turn.
    pub turn: u64,
    pub created_at: DateTime<Utc>,
}

/// State for one session.
#[derive(Debug)]
pub(crate) struct Session {
    /// Current turn; 0 means no user turn yet.
    pub turn: u64,
    /// True once a non-trusted observation landed in the current turn.
    pub tainted: bool,
    pub last_event_at: DateTime<Utc>,
    /// Data-node id → node.
    pub data: HashMap<String, DataNode>,
    /// Observation node id per tool-call id, for idempotent re-records.
    pub obs_by_call: HashMap<String, String>,
    /// Resource key (`file:<abs-path>`) → turn of last committed write.
    pub resource_last_write_turn: HashMap<String, u64>,
    /// Tool-call id → declared write paths awaiting completion.
    pub pending_writes: HashMap<String, PendingWrite>,
}

impl Session {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            turn: 0,
            tainted: false,
            last_event_at: now,
            data: HashMap::new(),
            obs_by_call: HashMap::new(),
            resource_last_write_turn: HashMap::new(),
            pending_writes: HashMap::new(),
        }
    }

    /// Advance to a fresh turn: increment the counter, clear taint.
    pub fn begin_turn(&mut self, now: DateTime<Utc>) {
        self.turn += 1;
        self.tainted = false;
        self.last_event_at = now;
    }

    /// Whether the idle window has elapsed since the last event.
    pub fn idle_elapsed(&self, now: DateTime<Utc>, idle_ms: u64) -> bool {
        let elapsed = now.signed_duration_since(self.last_event_at);
        elapsed.num_milliseconds() > idle_ms as i64
    }
}
