//! # claw-secrets
//!
//! Secret detection over arbitrary nested tool parameters.
//!
//! The scanner walks JSON-shaped values and flags string fields that look
//! like credentials: long enough, high Shannon entropy, and matching one
//! of the known token shapes (API key prefixes, base64 runs, bearer
//! headers, JWTs). Both gates must agree — entropy alone produces too many
//! false positives on prose, patterns alone on file paths.
//!
//! Exceptions suppress findings per tool name or per field, so tools that
//! legitimately carry opaque blobs (`buffer`, `base64`, `media`) stay
//! usable.

pub mod scanner;

pub use scanner::{SecretFindings, SecretScanner};
