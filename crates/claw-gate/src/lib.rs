//! # claw-gate
//!
//! The tool-call gate: everything the agent harness touches.
//!
//! A [`GuardEngine`] owns the policy snapshot, the provenance registry,
//! the path firewall, the secret scanner, and (optionally) the approval
//! bridge and decision trail. The harness integrates at three points:
//!
//! - [`GuardEngine::begin_user_turn`] when a user prompt arrives;
//! - [`GuardEngine::preflight`] before executing any tool call;
//! - [`GuardEngine::record`] after a tool call completes.
//!
//! [`guard_tool_call`] bundles all three around a tool invocation and
//! decorates successful results with a provenance handle.
//!
//! The engine is fail-closed: internal errors in any sub-check surface as
//! a denial, never as an allow.

pub mod decision;
pub mod engine;
pub mod error;
pub mod exec;
pub mod network;
pub mod preflight;
pub mod shapes;
pub mod wrapper;

pub use decision::{rules, Decision, Evaluation, PreflightOutcome};
pub use engine::GuardEngine;
pub use error::GateError;
pub use wrapper::{guard_tool_call, PROV_REF_FIELD};
