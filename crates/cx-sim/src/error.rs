//! Error types for run control.

use cx_compiler::CompileError;
use cx_results::ResultsError;
use cx_solver::SolverError;
use thiserror::Error;

use crate::status::RunStatus;

/// Errors reported by [`crate::RunController`] operations.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid run configuration: {what}")]
    InvalidConfiguration { what: String },

    #[error("No consistent initial state: {source}")]
    Initialization { source: SolverError },

    #[error("Parameters cannot change while the run is active")]
    ConcurrentMutation,

    #[error("Cannot {operation} while {status}")]
    InvalidTransition {
        operation: &'static str,
        status: RunStatus,
    },

    #[error("Parameter index {index} out of bounds (len={len})")]
    ParameterIndex { index: usize, len: usize },

    #[error("Parameter value must be finite, got {value}")]
    NonFiniteParameter { value: f64 },

    #[error("Run worker is not responding")]
    WorkerUnavailable,

    #[error("Failed to spawn run worker: {0}")]
    Spawn(std::io::Error),

    #[error("Timed out waiting for run status")]
    Timeout,

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Results(#[from] ResultsError),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn invalid_config(what: impl Into<String>) -> Self {
        SimError::InvalidConfiguration { what: what.into() }
    }
}
