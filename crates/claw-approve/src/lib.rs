//! # claw-approve
//!
//! Client side of the human-in-the-loop approval channel.
//!
//! A `confirm` decision from the policy engine is forwarded to an
//! out-of-process listener on a stream socket. The protocol is one JSON
//! request terminated by a newline, one JSON reply: the listener answers
//! `allow-once`, `allow-always`, or `deny`.
//!
//! The bridge is fail-closed end to end: a missing descriptor, connection
//! error, timeout, or malformed reply all surface as "no approval", which
//! the caller converts to deny.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming the approval socket path.
pub const SOCKET_ENV: &str = "OPENCLAW_APPROVAL_SOCKET";
/// Environment variable carrying the bearer token echoed in each request.
pub const TOKEN_ENV: &str = "OPENCLAW_APPROVAL_TOKEN";

/// How long one approval round-trip may take.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A request forwarded to the approval listener.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub reason: String,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ApprovalRequest {
    pub fn new(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: "policy.request".to_string(),
            rule_id: rule_id.into(),
            tool_name: None,
            reason: reason.into(),
            metadata: serde_json::Value::Null,
            token: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool_name = Some(tool.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The listener's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalReply {
    AllowOnce,
    AllowAlways,
    Deny,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    result: ApprovalReply,
}

/// A connected-on-demand approval channel.
#[derive(Debug, Clone)]
pub struct ApprovalBridge {
    socket_path: PathBuf,
    token: Option<String>,
    timeout: Duration,
}

impl ApprovalBridge {
    pub fn new(socket_path: impl Into<PathBuf>, token: Option<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            token,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a bridge from the environment descriptor, if one is set.
    pub fn from_env() -> Option<Self> {
        let socket_path = std::env::var_os(SOCKET_ENV)?;
        let token = std::env::var(TOKEN_ENV).ok();
        Some(Self::new(PathBuf::from(socket_path), token))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Forward one request and wait for the listener's decision.
    ///
    /// Returns `None` on any failure — the caller must treat that as deny.
    pub fn request(&self, request: &ApprovalRequest) -> Option<ApprovalReply> {
        let mut request = request.clone();
        if request.token.is_none() {
            request.token = self.token.clone();
        }

        match self.round_trip(&request) {
            Ok(reply) => Some(reply),
            Err(err) => {
                tracing::warn!(
                    socket = %self.socket_path.display(),
                    rule_id = %request.rule_id,
                    %err,
                    "approval round-trip failed, treating as deny"
                );
                None
            }
        }
    }

    #[cfg(unix)]
    fn round_trip(&self, request: &ApprovalRequest) -> std::io::Result<ApprovalReply> {
        use std::os::unix::net::UnixStream;

        let stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let payload = serde_json::to_string(request)?;
        let mut writer = &stream;
        writeln!(writer, "{payload}")?;
        writer.flush()?;

        let mut reader = BufReader::new(&stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        if line.trim().is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "empty approval reply",
            ));
        }

        let reply: WireReply = serde_json::from_str(line.trim())?;
        Ok(reply.result)
    }

    #[cfg(not(unix))]
    fn round_trip(&self, _request: &ApprovalRequest) -> std::io::Result<ApprovalReply> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "approval sockets require a unix platform",
        ))
    }
}
