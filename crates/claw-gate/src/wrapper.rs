// wrapper.rs — Single pre/post integration point around a tool invocation.
//
// Blocked calls fail before the tool runs and record NO observation — a
// synthetic entry would taint the session for a call that never executed.
// Successful calls are recorded and the result decorated with the
// observation id; failed calls are recorded once (ok = false) and the
// error re-raised.

use serde_json::{json, Value};

use crate::engine::GuardEngine;
use crate::error::GateError;

/// Field attached to tool output carrying the observation node id.
pub const PROV_REF_FIELD: &str = "__prov_ref";

/// Errors an underlying tool may raise.
pub type ToolError = Box<dyn std::error::Error + Send + Sync>;

/// Run `invoke` under the full pre/post policy envelope.
///
/// On allow, the tool receives the `$ref`-resolved parameters. Object
/// results gain a [`PROV_REF_FIELD`] entry; primitive results are wrapped
/// as `{value, __prov_ref}` rather than mutated.
pub fn guard_tool_call<F>(
    engine: &GuardEngine,
    session_id: &str,
    tool_name: &str,
    params: &Value,
    tool_call_id: Option<&str>,
    invoke: F,
) -> Result<Value, GateError>
where
    F: FnOnce(&Value) -> Result<Value, ToolError>,
{
    let outcome = engine.preflight(session_id, tool_name, params, tool_call_id);
    if !outcome.allowed {
        return Err(GateError::Blocked {
            rule_id: outcome.rule_id,
            reason: outcome
                .reason
                .unwrap_or_else(|| "blocked by policy".to_string()),
        });
    }

    let resolved = match engine.resolve_params(session_id, params) {
        Ok(resolved) => resolved,
        Err(err) => {
            return Err(GateError::Blocked {
                rule_id: Some(err.rule_id().to_string()),
                reason: err.to_string(),
            });
        }
    };

    match invoke(&resolved) {
        Ok(value) => {
            let obs_id = engine.record(session_id, tool_name, &value, tool_call_id, true);
            Ok(decorate(value, &obs_id))
        }
        Err(source) => {
            engine.record(
                session_id,
                tool_name,
                &json!({ "error": source.to_string() }),
                tool_call_id,
                false,
            );
            Err(GateError::Tool {
                tool: tool_name.to_string(),
                source,
            })
        }
    }
}

fn decorate(value: Value, obs_id: &str) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert(PROV_REF_FIELD.to_string(), Value::String(obs_id.to_string()));
            Value::Object(map)
        }
        primitive => json!({ "value": primitive, PROV_REF_FIELD: obs_id }),
    }
}
