// refs.rs — `$ref` indirection walkers.
//
// A reference is any JSON object carrying a string value under the key
// `$ref` (or its alias `ref`). Resolution replaces the whole object with
// the referenced node's stored value. Substitution is recursive over
// containers but not over substituted values themselves — one level of
// indirection only.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::ProvenanceError;

const REF_KEYS: &[&str] = &["$ref", "ref"];

/// The referenced id, if `value` is a reference object.
pub(crate) fn ref_id(value: &Value) -> Option<&str> {
    let map = value.as_object()?;
    REF_KEYS
        .iter()
        .find_map(|key| map.get(*key))
        .and_then(Value::as_str)
}

/// Collect every referenced id in a parameter tree, without resolving.
pub fn collect_refs(params: &Value) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    collect_into(params, &mut ids);
    ids
}

fn collect_into(value: &Value, ids: &mut BTreeSet<String>) {
    if let Some(id) = ref_id(value) {
        ids.insert(id.to_string());
        return;
    }
    match value {
        Value::Object(map) => {
            for child in map.values() {
                collect_into(child, ids);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_into(child, ids);
            }
        }
        _ => {}
    }
}

/// Deep-copy `params`, replacing every reference object via `lookup`.
///
/// `lookup` returns the stored value for an id, or `None` when the id is
/// unknown or its value was not retained — either way resolution fails
/// closed on the first such id.
pub(crate) fn resolve_with<F>(params: &Value, lookup: &F) -> Result<Value, ProvenanceError>
where
    F: Fn(&str) -> Option<Value>,
{
    if let Some(id) = ref_id(params) {
        return lookup(id).ok_or_else(|| ProvenanceError::RefUnresolved { id: id.to_string() });
    }
    match params {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, child) in map {
                out.insert(key.clone(), resolve_with(child, lookup)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for child in items {
                out.push(resolve_with(child, lookup)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collect_finds_both_key_spellings() {
        let params = json!({
            "a": {"$ref": "obs:t1:read_1"},
            "b": [{"ref": "user:t1:prompt"}, "plain"]
        });
        let ids = collect_refs(&params);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("obs:t1:read_1"));
        assert!(ids.contains("user:t1:prompt"));
    }

    #[test]
    fn collect_on_ref_free_tree_is_empty() {
        let params = json!({"path": "/work/a.txt", "n": 3, "flags": ["-v"]});
        assert!(collect_refs(&params).is_empty());
    }

    #[test]
    fn non_string_ref_value_is_not_a_reference() {
        let params = json!({"x": {"$ref": 42}});
        assert!(collect_refs(&params).is_empty());
    }

    #[test]
    fn resolve_is_identity_without_refs() {
        let params = json!({"cmd": "echo hi", "args": [1, true, null]});
        let resolved = resolve_with(&params, &|_| None).unwrap();
        assert_eq!(resolved, params);
    }

    #[test]
    fn resolve_substitutes_the_whole_ref_object() {
        let params = json!({"command": {"$ref": "obs:t1:read_1", "note": "ignored"}});
        let resolved = resolve_with(&params, &|id| {
            (id == "obs:t1:read_1").then(|| json!("cat /etc/passwd"))
        })
        .unwrap();
        assert_eq!(resolved, json!({"command": "cat /etc/passwd"}));
    }

    #[test]
    fn resolve_fails_closed_on_unknown_id() {
        let params = json!({"x": {"$ref": "obs:t999:missing"}});
        let err = resolve_with(&params, &|_| None).unwrap_err();
        assert_eq!(
            err,
            ProvenanceError::RefUnresolved {
                id: "obs:t999:missing".to_string()
            }
        );
    }

    #[test]
    fn substituted_values_are_not_re_resolved() {
        // The looked-up value itself contains a ref-shaped object; it must
        // be inserted verbatim, not chased.
        let inner = json!({"$ref": "obs:t1:other"});
        let params = json!({"x": {"$ref": "obs:t1:read_1"}});
        let resolved = resolve_with(&params, &|id| {
            (id == "obs:t1:read_1").then(|| inner.clone())
        })
        .unwrap();
        assert_eq!(resolved, json!({"x": {"$ref": "obs:t1:other"}}));
    }

    #[test]
    fn nested_refs_resolve_throughout_the_tree() {
        let params = json!({
            "a": [{"$ref": "id-1"}],
            "b": {"c": {"ref": "id-2"}}
        });
        let resolved = resolve_with(&params, &|id| Some(json!(id.to_uppercase()))).unwrap();
        assert_eq!(resolved, json!({"a": ["ID-1"], "b": {"c": "ID-2"}}));
    }
}
