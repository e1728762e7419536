//! cx-sim: simulation run control.
//!
//! A [`RunController`] drives one model through the lifecycle
//! `Idle -> Running <-> Paused -> Completed | Failed | Aborted`, stepping a
//! solver on a worker thread and recording sampled points into a
//! [`cx_results::ResultsStore`] that readers may snapshot at any time.

pub mod config;
pub mod controller;
pub mod error;
pub mod recorder;
mod shared;
pub mod status;
mod worker;

pub use config::RunConfiguration;
pub use controller::RunController;
pub use error::{SimError, SimResult};
pub use recorder::Recorder;
pub use status::{RunEvent, RunState, RunStatus};
