//! Error types for the cx-app service layer.

use std::path::PathBuf;

/// Unified error for drivers (CLI, scripts) built on the service layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to read model file: {path}")]
    ModelFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Model file is not valid YAML: {0}")]
    ModelFileFormat(#[from] serde_yaml::Error),

    #[error("Expression error in '{expr}': {message}")]
    Expression { expr: String, message: String },

    #[error("Invalid model: {0}")]
    Model(String),

    #[error("Compilation failed: {0}")]
    Compile(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cx-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<cx_model::ModelError> for AppError {
    fn from(err: cx_model::ModelError) -> Self {
        AppError::Model(err.to_string())
    }
}

impl From<cx_compiler::CompileError> for AppError {
    fn from(err: cx_compiler::CompileError) -> Self {
        AppError::Compile(err.to_string())
    }
}

impl From<cx_solver::SolverError> for AppError {
    fn from(err: cx_solver::SolverError) -> Self {
        AppError::Solver(err.to_string())
    }
}

impl From<cx_sim::SimError> for AppError {
    fn from(err: cx_sim::SimError) -> Self {
        AppError::Simulation(err.to_string())
    }
}

impl From<cx_results::ResultsError> for AppError {
    fn from(err: cx_results::ResultsError) -> Self {
        match err {
            cx_results::ResultsError::RunNotFound { run_id } => AppError::RunNotFound(run_id),
            other => AppError::Results(other.to_string()),
        }
    }
}
