//! Error types for solver operations.

use cx_compiler::NumericDomainError;
use thiserror::Error;

/// Errors that can occur while initialising or stepping a solver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Numeric domain error: {0}")]
    Domain(#[from] NumericDomainError),

    #[error("Diverged: {what}")]
    Diverged { what: String },

    #[error("Maximum step count {max_steps} reached at t = {time}")]
    MaxStepsExceeded { max_steps: u64, time: f64 },

    #[error("Invalid solver configuration: {what}")]
    InvalidConfig { what: String },

    #[error("Unknown solver '{name}'")]
    UnknownSolver { name: String },

    #[error("Numeric error: {what}")]
    Numeric { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    pub(crate) fn diverged(what: impl Into<String>) -> Self {
        SolverError::Diverged { what: what.into() }
    }
}
