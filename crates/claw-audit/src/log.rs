// log.rs — The append-only decision trail.
//
// One JSON record per line. The trail holds no open file handle: every
// append opens the file, writes one line, and closes it, so a crashed
// process never leaves a buffered record behind and several short-lived
// engines can take turns on the same trail.
//
// Chain state is carried by the records themselves. Each record stores
// its own content hash (see `DecisionRecord::compute_hash`) along with
// its predecessor's, so reopening only needs to parse the final record —
// and verification can tell an edited line from a deleted one.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AuditError;
use crate::record::DecisionRecord;

/// Handle to a decision trail on disk.
///
/// The file may not exist yet; it is created on the first append.
#[derive(Debug)]
pub struct DecisionLog {
    path: PathBuf,
    /// Chain hash of the last record on disk, `None` for an empty trail.
    tail_hash: Option<String>,
}

impl DecisionLog {
    /// Open a decision trail, recovering the chain tail from the last
    /// record already on disk.
    ///
    /// Fails if the tail record cannot be parsed or carries no hash —
    /// appending to a trail whose tail is unreadable would silently
    /// fork the chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(AuditError::Storage { path, source }),
        };

        let mut tail: Option<(usize, &str)> = None;
        for (idx, line) in content.lines().enumerate() {
            if !line.trim().is_empty() {
                tail = Some((idx + 1, line.trim()));
            }
        }

        let tail_hash = match tail {
            None => None,
            Some((line, raw)) => {
                let record: DecisionRecord = serde_json::from_str(raw)
                    .map_err(|source| AuditError::Malformed { line, source })?;
                if record.entry_hash.is_empty() {
                    return Err(AuditError::Tampered {
                        line,
                        detail: "tail record carries no chain hash".to_string(),
                    });
                }
                Some(record.entry_hash)
            }
        };

        Ok(Self { path, tail_hash })
    }

    /// Append one record: link it to the tail, stamp its chain hash, and
    /// write it out in a single open-write-close cycle.
    pub fn append(&mut self, record: &mut DecisionRecord) -> Result<(), AuditError> {
        record.previous_hash = self.tail_hash.clone();
        record.entry_hash = record.compute_hash();

        let mut line = serde_json::to_string(record).map_err(|source| AuditError::Storage {
            path: self.path.clone(),
            source: std::io::Error::other(source),
        })?;
        line.push('\n');

        let storage = |source| AuditError::Storage {
            path: self.path.clone(),
            source,
        };
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(storage)?;
        file.write_all(line.as_bytes()).map_err(storage)?;

        self.tail_hash = Some(record.entry_hash.clone());
        Ok(())
    }

    /// Read every record, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<DecisionRecord>, AuditError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| AuditError::Storage {
            path: path.to_path_buf(),
            source,
        })?;

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record = serde_json::from_str(trimmed)
                .map_err(|source| AuditError::Malformed { line: idx + 1, source })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Verify a trail end to end.
    ///
    /// Two checks per record: the stored hash must match the recomputed
    /// content hash (catches an edited record at its own line), and
    /// `previous_hash` must equal the predecessor's stored hash (catches
    /// deleted, inserted, or reordered records).
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<(), AuditError> {
        let mut tail: Option<String> = None;
        for (idx, record) in Self::read_all(path)?.into_iter().enumerate() {
            let line = idx + 1;

            if record.compute_hash() != record.entry_hash {
                return Err(AuditError::Tampered {
                    line,
                    detail: "stored hash does not match record content".to_string(),
                });
            }
            if record.previous_hash != tail {
                return Err(AuditError::Tampered {
                    line,
                    detail: "record does not chain to its predecessor".to_string(),
                });
            }

            tail = Some(record.entry_hash);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
