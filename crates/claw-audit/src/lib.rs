//! # claw-audit
//!
//! Append-only trail of policy decisions.
//!
//! Every pre-flight decision can be recorded as a [`DecisionRecord`] in a
//! JSONL file. Integrity lives in the records, not the file: each record
//! stores a content hash over its own fields plus its predecessor's hash,
//! so [`DecisionLog::verify_chain`] can tell an edited record (its stored
//! hash stops matching its content) from a deleted one (its successor
//! stops chaining), and reopening a trail only needs to parse the final
//! record.
//!
//! The trail is observability, not enforcement: callers append
//! best-effort and never let an audit failure change a decision.

pub mod error;
pub mod log;
pub mod record;

pub use error::AuditError;
pub use log::DecisionLog;
pub use record::DecisionRecord;
