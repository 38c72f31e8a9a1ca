// error.rs — Gate errors surfaced to the agent harness.

use thiserror::Error;

/// Errors from the tool wrapper.
#[derive(Debug, Error)]
pub enum GateError {
    /// The pre-flight check blocked the call. No observation was recorded.
    #[error("blocked by policy{}: {reason}", rule_suffix(.rule_id))]
    Blocked {
        rule_id: Option<String>,
        reason: String,
    },

    /// The underlying tool failed. The failure was recorded as an
    /// observation before this error was re-raised.
    #[error("tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn rule_suffix(rule_id: &Option<String>) -> String {
    match rule_id {
        Some(rule_id) => format!(" ({rule_id})"),
        None => String::new(),
    }
}
