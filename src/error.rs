use thiserror::Error;

/// Errors for calls that break a component contract. Malformed input data
/// never ends up here; it degrades to placeholders instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("choice for institution {found_institution} / field {found_field} does not belong to scope {scope}")]
    ScopeMismatch {
        scope: String,
        found_institution: String,
        found_field: String,
    },

    #[error("priority slot {0} is outside 1..=5")]
    InvalidSlot(usize),

    #[error("capacity record has an empty {0}")]
    EmptyCapacityKey(&'static str),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
