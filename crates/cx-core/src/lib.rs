//! cx-core: stable foundation for cellex.
//!
//! Contains:
//! - numeric (Real + tolerances + float helpers)
//! - ids (stable compact IDs for model objects)
//! - units (unit scale ratios)
//! - timing (wall-clock stopwatch)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod timing;
pub mod units;

pub use error::{CxError, CxResult};
pub use ids::*;
pub use numeric::*;
pub use timing::Stopwatch;
pub use units::*;
