//! Error types for model construction.

use cx_core::CxError;
use thiserror::Error;

/// Malformed equation model, detected at construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Arity mismatch: {what} has {actual} entries, expected {expected}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Non-finite initial value for '{name}': {value}")]
    NonFiniteInitial { name: String, value: f64 },

    #[error("Duplicate variable name '{name}'")]
    DuplicateName { name: String },

    #[error("Variable name must not be empty")]
    EmptyName,

    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Non-finite value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid value: {what}")]
    Invalid { what: &'static str },
}

pub type ModelResult<T> = Result<T, ModelError>;

impl From<CxError> for ModelError {
    fn from(e: CxError) -> Self {
        match e {
            CxError::NonFinite { what, value } => ModelError::NonFinite { what, value },
            CxError::BadTolerance { .. } => ModelError::Invalid {
                what: "tolerance",
            },
        }
    }
}
