// record.rs — One entry of the decision trail.
//
// Each record stores its own chain hash: a SHA-256 over a domain tag,
// the predecessor's hash, and every field, each length-prefixed so field
// boundaries cannot be confused. Editing any field — or re-pointing
// `previous_hash` — invalidates the stored hash, which is what lets
// verification pin tampering to the exact line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Domain tag bound into every chain hash.
const HASH_DOMAIN: &[u8] = b"openclaw.decision-trail.v1";

/// A single policy decision, as appended to the JSONL trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub record_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub tool_name: String,
    /// The issued decision: "allow", "deny", or "confirm".
    pub decision: String,
    /// Stable rule id when a rule fired.
    pub rule_id: Option<String>,
    pub reason: Option<String>,
    /// Chain hash of the preceding record; `None` for the first record.
    pub previous_hash: Option<String>,
    /// This record's own chain hash, filled in at append time.
    #[serde(default)]
    pub entry_hash: String,
}

impl DecisionRecord {
    pub fn new(
        session_id: impl Into<String>,
        tool_name: impl Into<String>,
        decision: impl Into<String>,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            tool_name: tool_name.into(),
            decision: decision.into(),
            rule_id: None,
            reason: None,
            previous_hash: None,
            entry_hash: String::new(),
        }
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Compute the chain hash over this record's content.
    ///
    /// Covers `previous_hash` and every payload field, but not
    /// `entry_hash` itself. Fields are length-prefixed (little-endian
    /// u64) under a fixed domain tag.
    pub fn compute_hash(&self) -> String {
        let record_id = self.record_id.to_string();
        let timestamp = self.timestamp.to_rfc3339();

        let mut hasher = Sha256::new();
        hasher.update(HASH_DOMAIN);
        for field in [
            self.previous_hash.as_deref().unwrap_or(""),
            record_id.as_str(),
            timestamp.as_str(),
            self.session_id.as_str(),
            self.tool_name.as_str(),
            self.decision.as_str(),
            self.rule_id.as_deref().unwrap_or(""),
            self.reason.as_deref().unwrap_or(""),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
