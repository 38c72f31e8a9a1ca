// firewall.rs — Path-access firewall.
//
// The firewall holds three rule sets, checked in a fixed order:
// allowed roots, blocked system-critical prefixes, then home-sensitive
// folders. The first failing check wins; a path that survives all three
// is returned in resolved form for downstream bookkeeping.

use std::path::{Path, PathBuf};

use crate::error::PathViolation;
use crate::resolve::{expand_tilde, home_dir, resolve, under};

/// Compiled path-access rules.
///
/// Roots and prefixes are resolved once at construction so per-call checks
/// are pure string comparisons.
#[derive(Debug, Clone)]
pub struct PathFirewall {
    allowed_roots: Vec<String>,
    system_critical: Vec<String>,
    home_sensitive: Vec<String>,
    base: PathBuf,
}

impl PathFirewall {
    /// Build a firewall from raw policy entries.
    ///
    /// `allowed_roots` and `system_critical` may contain tilde paths;
    /// `home_sensitive` entries are folder names relative to `$HOME`.
    /// `base` anchors relative paths handed to [`PathFirewall::check`].
    pub fn new(
        allowed_roots: &[String],
        system_critical: &[String],
        home_sensitive: &[String],
        base: impl AsRef<Path>,
    ) -> Self {
        let base = base.as_ref().to_path_buf();
        let allowed_roots = allowed_roots
            .iter()
            .map(|root| resolve(root, &base))
            .collect();
        // Blocked prefixes are compared lexically: they usually do not
        // exist as readable paths from the engine's account, so realpath
        // would degrade them anyway.
        let system_critical = system_critical
            .iter()
            .map(|prefix| slashed(&expand_tilde(prefix)))
            .collect();
        Self {
            allowed_roots,
            system_critical,
            home_sensitive: home_sensitive.to_vec(),
            base,
        }
    }

    /// Check one path. Returns the resolved canonical path on success.
    pub fn check(&self, path: &str) -> Result<String, PathViolation> {
        let target = resolve(path, &self.base);

        if !self.allowed_roots.iter().any(|root| under(root, &target)) {
            return Err(PathViolation::OutsideAllowedRoots { path: target });
        }

        if let Some(prefix) = self
            .system_critical
            .iter()
            .find(|prefix| under(prefix, &target))
        {
            return Err(PathViolation::Blocked {
                path: target,
                prefix: prefix.clone(),
            });
        }

        if let Some(home) = home_dir() {
            let home = slashed(&home);
            for folder in &self.home_sensitive {
                let protected = format!("{}/{}", home.trim_end_matches('/'), folder);
                if under(&protected, &target) {
                    return Err(PathViolation::HomeSensitive {
                        path: target,
                        folder: folder.clone(),
                    });
                }
            }
        }

        Ok(target)
    }

    /// The configured allowed roots in resolved form.
    pub fn allowed_roots(&self) -> &[String] {
        &self.allowed_roots
    }
}

fn slashed(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if raw.contains('\\') {
        raw.replace('\\', "/")
    } else {
        raw.into_owned()
    }
}
