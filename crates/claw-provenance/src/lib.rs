//! # claw-provenance
//!
//! Per-session data-origin tracking and the turn automaton.
//!
//! Every value that enters a session's context — the user's prompt, a tool
//! observation, file content — is registered as a [`DataNode`] with a
//! stable id. Tool parameters may point back at registered data through
//! `$ref` indirections; [`ProvenanceRegistry::resolve_refs`] substitutes
//! the stored values and fails closed on any id it cannot account for.
//!
//! The turn automaton keeps two facts per session: the monotonically
//! increasing turn counter and the taint flag. Taint flips true the moment
//! a non-trusted observation lands in the current turn and clears only on
//! the next user turn — within a turn it is one-way.
//!
//! All state lives behind a [`ProvenanceRegistry`] handle; there are no
//! module-level singletons. Callers within one session are expected to be
//! serialised by the agent harness; the registry only synchronises the
//! session map itself.

pub mod error;
pub mod node;
pub mod refs;
pub mod registry;
pub mod session;

pub use error::ProvenanceError;
pub use node::{DataKind, DataNode};
pub use refs::collect_refs;
pub use registry::{ProvenanceRegistry, RefStatus};
pub use session::PendingWrite;
