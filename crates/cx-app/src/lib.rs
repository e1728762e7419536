//! Application service layer for cellex.
//!
//! Loads YAML model files, compiles them through the shared routine cache,
//! drives runs to completion with progress reporting, archives results and
//! runs parameter sweeps. The CLI is a thin layer over this crate.

pub mod error;
pub mod expression;
pub mod model_file;
pub mod progress;
pub mod query;
pub mod run_service;
pub mod sweep;

pub use error::{AppError, AppResult};
pub use expression::parse_expr;
pub use model_file::{ComponentDef, ModelFile, ModelSummary, StateDef, VariableDef, load_model};
pub use progress::{RunProgressEvent, RunStage};
pub use query::{
    RunSummary, extract_series, get_run_summary, list_columns, resolve_column, select_columns,
};
pub use run_service::{
    RunOptions, RunRequest, RunResponse, compile_model, drive, list_runs, load_run, run_model,
    run_model_with_progress, solver_name,
};
pub use sweep::{SweepCase, SweepOutcome, linear_cases, run_sweep};
