// error.rs — Path firewall violations.

use thiserror::Error;

/// A path-access rule violation.
///
/// Each variant maps to a stable rule id consumed by operators and tests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathViolation {
    /// The path is not contained in any configured allowed root.
    #[error("path '{path}' is outside every allowed root")]
    OutsideAllowedRoots { path: String },

    /// The path falls under a system-critical blocked prefix.
    #[error("path '{path}' is under the blocked prefix '{prefix}'")]
    Blocked { path: String, prefix: String },

    /// The path is inside a protected folder in the user's home directory.
    #[error("path '{path}' is inside the protected home folder '{folder}'")]
    HomeSensitive { path: String, folder: String },
}

impl PathViolation {
    /// The stable rule id for this violation.
    pub fn rule_id(&self) -> &'static str {
        match self {
            PathViolation::OutsideAllowedRoots { .. } => "path.outside_allowed_roots",
            PathViolation::Blocked { .. } => "path.blocked",
            PathViolation::HomeSensitive { .. } => "path.home_sensitive",
        }
    }

    /// The resolved path that triggered the violation.
    pub fn path(&self) -> &str {
        match self {
            PathViolation::OutsideAllowedRoots { path }
            | PathViolation::Blocked { path, .. }
            | PathViolation::HomeSensitive { path, .. } => path,
        }
    }
}
