// error.rs — Provenance errors.

use thiserror::Error;

/// Errors from provenance operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvenanceError {
    /// A `$ref` names an id that is absent from this session, or whose
    /// value was not retained. Both cases fail closed.
    #[error("unresolved data reference '{id}'")]
    RefUnresolved { id: String },
}

impl ProvenanceError {
    /// The stable rule id for this error.
    pub fn rule_id(&self) -> &'static str {
        match self {
            ProvenanceError::RefUnresolved { .. } => "prov.ref_unresolved",
        }
    }
}
