// shapes.rs — Shape-key path extraction from free-form tool parameters.
//
// Tool parameters are free-form JSON, so path discovery is a fixed-key
// heuristic, deliberately conservative: only well-known top-level keys
// and the `patches[]` array are consulted. Unknown shapes yield nothing
// and the caller denies.

use serde_json::Value;

/// Keys a file-write tool declares its targets under.
const WRITE_KEYS: &[&str] = &["path", "filePath", "filename", "target", "dst", "to"];

/// Keys any file tool may reference paths under.
const ACCESS_KEYS: &[&str] = &["path", "filePath", "src", "dst", "from", "to"];

/// Keys consulted inside each element of `patches[]`.
const PATCH_KEYS: &[&str] = &["path", "filePath"];

/// Paths a file-write tool declares it will touch (for pending-write
/// bookkeeping).
pub fn declared_write_paths(params: &Value) -> Vec<String> {
    extract(params, WRITE_KEYS)
}

/// Paths a file tool references at all (for the path firewall).
pub fn referenced_paths(params: &Value) -> Vec<String> {
    extract(params, ACCESS_KEYS)
}

fn extract(params: &Value, keys: &[&str]) -> Vec<String> {
    let Some(map) = params.as_object() else {
        return Vec::new();
    };

    let mut paths = Vec::new();
    let mut push = |raw: &str| {
        if !raw.is_empty() && !paths.iter().any(|p| p == raw) {
            paths.push(raw.to_string());
        }
    };

    for key in keys {
        if let Some(raw) = map.get(*key).and_then(Value::as_str) {
            push(raw);
        }
    }

    if let Some(patches) = map.get("patches").and_then(Value::as_array) {
        for patch in patches {
            let Some(patch) = patch.as_object() else {
                continue;
            };
            for key in PATCH_KEYS {
                if let Some(raw) = patch.get(*key).and_then(Value::as_str) {
                    push(raw);
                }
            }
        }
    }

    paths
}
