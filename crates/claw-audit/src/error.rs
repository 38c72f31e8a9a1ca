// error.rs — Decision trail errors.
//
// Three failure classes: the file itself is unreachable, a line is not a
// decision record at all, or the records parse but their hashes say the
// trail was altered. Verification errors carry the 1-based line number
// so an operator can jump straight to the damage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the decision trail.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The log file could not be read or written.
    #[error("decision log {path}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A line in the log is not a valid decision record.
    #[error("decision log line {line} is not a valid record: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },

    /// A record's stored hash disagrees with its content or with its
    /// predecessor.
    #[error("decision log tampered at line {line}: {detail}")]
    Tampered { line: usize, detail: String },
}
