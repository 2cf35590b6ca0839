use crate::types::DbId;

/// Errors surfaced by the core engine.
///
/// Validation errors carry the CSV row number as the authoritative
/// locator. `PseudoRandomizationTimeout` is recoverable; the advice in
/// its message is part of the contract. Structural and frozen-study
/// errors are fatal for the requested operation but never corrupt
/// existing state.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("line {line}: {message}")]
    Validation { line: usize, message: String },

    #[error("Unsupported CSV format.")]
    UnsupportedDialect,

    #[error("Not enough data to detect the CSV format.")]
    NotEnoughData,

    #[error("{0}")]
    Structural(String),

    #[error("Unable to compute a pseudo-random order; retry or add more filler items.")]
    PseudoRandomizationTimeout,

    #[error("The study already has results; unpublish it and delete the results first.")]
    FrozenStudy,

    #[error("Not allowed: {0}")]
    NotAllowed(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },
}

impl CoreError {
    /// Coerce an unexpected CSV ingest failure to a validation error
    /// pointing at the offending row.
    pub fn unexpected_entry(line: usize) -> Self {
        CoreError::Validation {
            line,
            message: "unexpected entry".into(),
        }
    }

    pub fn validation(line: usize, message: impl Into<String>) -> Self {
        CoreError::Validation {
            line,
            message: message.into(),
        }
    }
}
