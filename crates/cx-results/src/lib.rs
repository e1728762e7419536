//! cx-results: in-memory results store, export tables and run archive.

pub mod archive;
pub mod column;
pub mod hash;
pub mod store;
pub mod table;
pub mod types;

pub use archive::RunArchive;
pub use column::{ColumnInfo, compare_uri, sort_columns};
pub use hash::compute_run_id;
pub use store::{RecordedPoint, ResultsStore, Snapshot, StoreLease};
pub use table::ResultsTable;
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Results store is held by an active run")]
    StoreInUse,

    #[error("Unknown column: {uri}")]
    UnknownColumn { uri: String },
}
