//! Numerical integration over compiled equation models.
//!
//! Provides:
//! - explicit fixed-step (Euler, RK2, RK4) and adaptive Heun-Euler
//! - variable-order BDF for stiff systems
//! - damped Newton steady-state solver, also used for consistent
//!   initial conditions of DAEs
//! - [`SolverHandle`], the tagged interface selected at run start

pub mod bdf;
pub mod config;
pub mod dense;
pub mod error;
pub mod explicit;
pub mod handle;
pub mod jacobian;
pub mod newton;
pub mod registry;
pub mod steady;
pub mod system;

pub use config::{SolverConfig, SolverKind};
pub use dense::hermite;
pub use error::{SolverError, SolverResult};
pub use handle::{SolverHandle, StepOutcome, StepResult};
pub use newton::{NewtonConfig, NewtonResult, newton_solve};
pub use registry::{SolverDescriptor, SolverProperty, SolverRegistry};
pub use system::{OdeSystem, SolverPoint, consistent_initial_conditions};
