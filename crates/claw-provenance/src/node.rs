// node.rs — Data nodes: the vertices of the per-session origin graph.
//
// Node ids have the shape `<prefix>:t<turn>:<suffix>` with prefix in
// {user, obs, file}. Ids are assigned once at registration and never
// mutated; the turn embedded in the id is the turn in which the data
// became part of the session context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Where a piece of session data originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    UserPrompt,
    ToolObservation,
    FileContent,
    ModelLiteral,
    Unknown,
}

/// One registered piece of session data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataNode {
    pub id: String,
    pub kind: DataKind,
    /// The tool that produced this data, for observation nodes.
    pub tool_name: Option<String>,
    /// The resource this data came from (e.g. `file:/work/notes.md`).
    pub resource: Option<String>,
    /// The turn in which this data entered the session context.
    pub turn: u64,
    /// The raw payload. Omitted when the serialised size exceeds the
    /// configured cap — dereferencing such a node fails closed.
    pub value: Option<Value>,
    /// SHA-256 fingerprint of payloads too large to retain, for audit
    /// correlation.
    pub value_sha256: Option<String>,
}

impl DataNode {
    /// Build a node, retaining `value` only if its serialised size is at
    /// most `max_value_bytes`.
    pub fn new(id: String, kind: DataKind, turn: u64, value: Value, max_value_bytes: usize) -> Self {
        let serialised = serde_json::to_string(&value).unwrap_or_default();
        let (value, value_sha256) = if serialised.len() <= max_value_bytes {
            (Some(value), None)
        } else {
            (None, Some(sha256_hex(serialised.as_bytes())))
        };
        Self {
            id,
            kind,
            tool_name: None,
            resource: None,
            turn,
            value,
            value_sha256,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool_name = Some(tool.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

/// Id for the user-prompt node of a turn. One prompt starts each turn, so
/// the suffix is fixed.
pub(crate) fn user_prompt_id(turn: u64) -> String {
    format!("user:t{turn}:prompt")
}

/// Id for a tool-observation node.
pub(crate) fn observation_id(turn: u64, tool: &str, discriminator: &str) -> String {
    format!("obs:t{turn}:{tool}_{discriminator}")
}

/// Id for a file-content node. The path is fingerprinted rather than
/// embedded so ids stay short and separator-free.
pub(crate) fn file_content_id(turn: u64, path: &str) -> String {
    let digest = sha256_hex(path.as_bytes());
    format!("file:t{turn}:{}", &digest[..12])
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn small_value_is_retained() {
        let node = DataNode::new("obs:t1:x".into(), DataKind::ToolObservation, 1, json!("hi"), 64);
        assert_eq!(node.value, Some(json!("hi")));
        assert!(node.value_sha256.is_none());
    }

    #[test]
    fn oversized_value_is_dropped_but_fingerprinted() {
        let big = json!("x".repeat(100));
        let node = DataNode::new("obs:t1:x".into(), DataKind::ToolObservation, 1, big, 64);
        assert!(node.value.is_none());
        let digest = node.value_sha256.unwrap();
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn id_shapes() {
        assert_eq!(user_prompt_id(3), "user:t3:prompt");
        assert_eq!(observation_id(2, "read", "call-7"), "obs:t2:read_call-7");
        let file_id = file_content_id(1, "/work/notes.md");
        assert!(file_id.starts_with("file:t1:"));
        assert_eq!(file_id.len(), "file:t1:".len() + 12);
    }

    #[test]
    fn file_id_is_stable_per_path() {
        assert_eq!(file_content_id(1, "/a"), file_content_id(1, "/a"));
        assert_ne!(file_content_id(1, "/a"), file_content_id(1, "/b"));
        assert_ne!(file_content_id(1, "/a"), file_content_id(2, "/a"));
    }

    #[test]
    fn kind_serialises_snake_case() {
        let json = serde_json::to_string(&DataKind::UserPrompt).unwrap();
        assert_eq!(json, "\"user_prompt\"");
    }
}
