// document.rs — Policy document model and tolerant normalisation.
//
// The on-disk document is free-form JSON. Rather than letting one bad
// field poison the whole parse, normalisation walks the raw value and
// fills in the default for any field that is missing or wrongly typed.
// Unknown fields are ignored. The only whole-document rejections are a
// non-object root and a `version` other than 1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document version this engine understands.
const SUPPORTED_VERSION: u64 = 1;

/// An immutable per-load policy snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Global kill switch: `false` short-circuits every evaluator to allow.
    pub enabled: bool,
    /// Roots the agent may touch; tilde entries are home-expanded at use.
    pub allowed_roots: Vec<String>,
    pub restricted_paths: RestrictedPaths,
    pub user_space: UserSpacePolicy,
    pub network: NetworkPolicy,
    pub secrets: SecretsPolicy,
    pub provenance: ProvenancePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictedPaths {
    /// Prefixes denied outright, even inside an allowed root.
    pub system_critical: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSpacePolicy {
    /// Folder names under `$HOME` denied on any access.
    pub deny_on_any_access: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPolicy {
    /// Channel name → glob patterns for permitted targets. An empty map
    /// disables the network check entirely.
    pub allowlist: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretsPolicy {
    pub enabled: bool,
    /// Minimum trimmed length before a string is considered at all.
    pub min_length: usize,
    /// Shannon entropy (bits/char) a string must reach to be suspect.
    pub entropy_threshold: f64,
    pub exceptions: SecretExceptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretExceptions {
    /// Tool names whose parameters are never scanned.
    pub tools: Vec<String>,
    /// Field names (or full dotted paths) exempt from flagging.
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenancePolicy {
    pub enabled: bool,
    /// Referenced data must originate in the current turn.
    pub current_turn_only: bool,
    /// High-risk calls may only reference user-prompt data.
    pub forbid_non_user_data: bool,
    /// High-risk calls are blocked once the turn is tainted.
    pub require_clean_for_high_risk: bool,
    /// Decision issued when a provenance rule fires.
    pub on_violation: OnViolation,
    pub high_risk_tools: Vec<String>,
    /// Tools whose observations do not taint the turn.
    pub trusted_observation_tools: Vec<String>,
    pub file_write_tools: Vec<String>,
    pub file_read_tools: Vec<String>,
    /// Observation payloads above this size are not retained.
    pub max_stored_value_bytes: usize,
    /// Idle gap after which a new turn is inferred.
    pub turn_idle_ms: u64,
}

/// What a provenance violation turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnViolation {
    Deny,
    Confirm,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_roots: vec!["~".to_string()],
            restricted_paths: RestrictedPaths::default(),
            user_space: UserSpacePolicy::default(),
            network: NetworkPolicy::default(),
            secrets: SecretsPolicy::default(),
            provenance: ProvenancePolicy::default(),
        }
    }
}

impl Default for RestrictedPaths {
    fn default() -> Self {
        Self {
            system_critical: strings(&[
                "/etc", "/usr", "/bin", "/sbin", "/boot", "/sys", "/proc", "/dev", "/var",
                "C:/Windows", "C:/Program Files",
            ]),
        }
    }
}

impl Default for UserSpacePolicy {
    fn default() -> Self {
        Self {
            deny_on_any_access: strings(&[".ssh", ".aws", ".gnupg", ".kube", ".gcloud"]),
        }
    }
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            allowlist: BTreeMap::new(),
        }
    }
}

impl Default for SecretsPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_length: 20,
            entropy_threshold: 3.5,
            exceptions: SecretExceptions {
                tools: Vec::new(),
                fields: strings(&["buffer", "base64", "media"]),
            },
        }
    }
}

impl Default for ProvenancePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            current_turn_only: true,
            forbid_non_user_data: true,
            require_clean_for_high_risk: true,
            on_violation: OnViolation::Deny,
            high_risk_tools: strings(&["exec", "shell", "message", "send_message", "payment"]),
            trusted_observation_tools: Vec::new(),
            file_write_tools: strings(&["write", "write_file", "create_file", "edit", "apply_patch"]),
            file_read_tools: strings(&["read", "read_file", "cat"]),
            max_stored_value_bytes: 32 * 1024,
            turn_idle_ms: 15_000,
        }
    }
}

impl Policy {
    /// Normalise a raw JSON document into a policy.
    ///
    /// Per-field tolerant: anything missing or wrongly typed takes its
    /// default. A non-object root or an unsupported `version` yields the
    /// full default policy.
    pub fn from_value(raw: &Value) -> Self {
        let Some(doc) = raw.as_object() else {
            tracing::warn!("policy document is not a JSON object, using defaults");
            return Self::default();
        };

        if let Some(version) = doc.get("version") {
            if version.as_u64() != Some(SUPPORTED_VERSION) {
                tracing::warn!(?version, "unsupported policy version, using defaults");
                return Self::default();
            }
        }

        let defaults = Self::default();
        Self {
            enabled: bool_or(doc.get("enabled"), defaults.enabled),
            allowed_roots: string_list_or(doc.get("allowedRoots"), defaults.allowed_roots),
            restricted_paths: RestrictedPaths {
                system_critical: string_list_or(
                    nested(doc.get("restrictedPaths"), "systemCritical"),
                    defaults.restricted_paths.system_critical,
                ),
            },
            user_space: UserSpacePolicy {
                deny_on_any_access: string_list_or(
                    nested(doc.get("userSpace"), "denyOnAnyAccess"),
                    defaults.user_space.deny_on_any_access,
                ),
            },
            network: NetworkPolicy {
                allowlist: pattern_map_or(
                    nested(doc.get("network"), "allowlist"),
                    defaults.network.allowlist,
                ),
            },
            secrets: normalize_secrets(doc.get("secrets"), defaults.secrets),
            provenance: normalize_provenance(doc.get("provenance"), defaults.provenance),
        }
    }
}

fn normalize_secrets(raw: Option<&Value>, defaults: SecretsPolicy) -> SecretsPolicy {
    let section = raw.and_then(Value::as_object);
    let get = |key: &str| section.and_then(|s| s.get(key));
    SecretsPolicy {
        enabled: bool_or(get("enabled"), defaults.enabled),
        min_length: usize_or(get("minLength"), defaults.min_length),
        entropy_threshold: f64_or(get("entropyThreshold"), defaults.entropy_threshold),
        exceptions: SecretExceptions {
            tools: string_list_or(nested(get("exceptions"), "tools"), defaults.exceptions.tools),
            fields: string_list_or(
                nested(get("exceptions"), "fields"),
                defaults.exceptions.fields,
            ),
        },
    }
}

fn normalize_provenance(raw: Option<&Value>, defaults: ProvenancePolicy) -> ProvenancePolicy {
    let section = raw.and_then(Value::as_object);
    let get = |key: &str| section.and_then(|s| s.get(key));
    ProvenancePolicy {
        enabled: bool_or(get("enabled"), defaults.enabled),
        current_turn_only: bool_or(get("currentTurnOnly"), defaults.current_turn_only),
        forbid_non_user_data: bool_or(get("forbidNonUserData"), defaults.forbid_non_user_data),
        require_clean_for_high_risk: bool_or(
            get("requireCleanForHighRisk"),
            defaults.require_clean_for_high_risk,
        ),
        on_violation: on_violation_or(get("onViolation"), defaults.on_violation),
        high_risk_tools: string_list_or(get("highRiskTools"), defaults.high_risk_tools),
        trusted_observation_tools: string_list_or(
            get("trustedObservationTools"),
            defaults.trusted_observation_tools,
        ),
        file_write_tools: string_list_or(get("fileWriteTools"), defaults.file_write_tools),
        file_read_tools: string_list_or(get("fileReadTools"), defaults.file_read_tools),
        max_stored_value_bytes: usize_or(
            get("maxStoredValueBytes"),
            defaults.max_stored_value_bytes,
        ),
        turn_idle_ms: u64_or(get("turnIdleMs"), defaults.turn_idle_ms),
    }
}

// ── Field extraction helpers ─────────────────────────────────────

fn nested<'a>(section: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    section.and_then(Value::as_object).and_then(|s| s.get(key))
}

fn bool_or(raw: Option<&Value>, default: bool) -> bool {
    raw.and_then(Value::as_bool).unwrap_or(default)
}

fn u64_or(raw: Option<&Value>, default: u64) -> u64 {
    raw.and_then(Value::as_u64).unwrap_or(default)
}

fn usize_or(raw: Option<&Value>, default: usize) -> usize {
    raw.and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(default)
}

fn f64_or(raw: Option<&Value>, default: f64) -> f64 {
    raw.and_then(Value::as_f64).unwrap_or(default)
}

/// A list of strings; non-string elements are dropped, a non-array value
/// falls back wholesale.
fn string_list_or(raw: Option<&Value>, default: Vec<String>) -> Vec<String> {
    match raw.and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => default,
    }
}

fn pattern_map_or(
    raw: Option<&Value>,
    default: BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<String>> {
    match raw.and_then(Value::as_object) {
        Some(map) => map
            .iter()
            .map(|(channel, patterns)| {
                (
                    channel.clone(),
                    string_list_or(Some(patterns), Vec::new()),
                )
            })
            .collect(),
        None => default,
    }
}

fn on_violation_or(raw: Option<&Value>, default: OnViolation) -> OnViolation {
    match raw.and_then(Value::as_str) {
        Some("deny") => OnViolation::Deny,
        Some("confirm") => OnViolation::Confirm,
        _ => default,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
