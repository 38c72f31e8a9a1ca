//! # claw-policy
//!
//! The declarative policy document that drives every evaluator in OpenClaw
//! Guard, plus the cached store that loads it.
//!
//! The document lives at `~/.openclaw/policy.json`. Loading is tolerant by
//! design: a missing file, malformed JSON, or a wrongly typed field never
//! fails a load — each field independently falls back to its default, so a
//! half-broken policy file degrades to a stricter default rather than
//! disabling the engine. `enabled: false` is the only global kill switch.

pub mod document;
pub mod store;

pub use document::{
    NetworkPolicy, OnViolation, Policy, ProvenancePolicy, RestrictedPaths, SecretExceptions,
    SecretsPolicy, UserSpacePolicy,
};
pub use store::PolicyStore;
