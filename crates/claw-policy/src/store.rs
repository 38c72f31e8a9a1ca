// store.rs — Cached policy loading.
//
// Policies load from a fixed location (~/.openclaw/policy.json) and are
// cached per resolved path. Loading never fails outward: a missing or
// malformed file logs and degrades to defaults. Tests and operators
// invalidate the cache through `reset()`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use claw_path::home_dir;

use crate::document::Policy;

/// Cached store of normalised policy snapshots.
///
/// The cache is read-mostly; loads are idempotent, so contention on the
/// inner mutex is limited to the first load per path.
#[derive(Debug, Default)]
pub struct PolicyStore {
    cache: Mutex<HashMap<PathBuf, Arc<Policy>>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed on-disk location: `~/.openclaw/policy.json`.
    ///
    /// Falls back to a bare relative path when no home directory is
    /// resolvable (the subsequent load then degrades to defaults).
    pub fn default_path() -> PathBuf {
        home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".openclaw")
            .join("policy.json")
    }

    /// Load the policy from the default location.
    pub fn load(&self) -> Arc<Policy> {
        self.load_from(Self::default_path())
    }

    /// Load a policy from `path`, serving repeat loads from cache.
    pub fn load_from(&self, path: impl AsRef<Path>) -> Arc<Policy> {
        let path = path.as_ref().to_path_buf();

        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(cached) = cache.get(&path) {
            return Arc::clone(cached);
        }

        let policy = Arc::new(read_policy(&path));
        cache.insert(path, Arc::clone(&policy));
        policy
    }

    /// Drop every cached snapshot so the next load re-reads disk.
    pub fn reset(&self) {
        match self.cache.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

/// Read and normalise one policy file. Never fails.
fn read_policy(path: &Path) -> Policy {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::info!(path = %path.display(), %err, "no policy file, using defaults");
            return Policy::default();
        }
    };

    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(raw) => Policy::from_value(&raw),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "malformed policy file, using defaults");
            Policy::default()
        }
    }
}
