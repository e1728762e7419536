//! Compiles equation models into callable routines.
//!
//! Each rate and residual expression is lowered into a linear register
//! program with constant folding and common-subexpression elimination. The
//! resulting [`CompiledRoutineSet`] is immutable and can be shared between
//! concurrent runs of the same model.
//!
//! Compilation is fail-fast: an unknown variable, an unknown function, a bad
//! function arity or an unsupported operator returns a [`CompileError`] and
//! no routines.

mod diff;
mod lower;

pub mod cache;
pub mod error;
pub mod function;
pub mod program;
pub mod routine;

pub use cache::RoutineCache;
pub use error::{CompileError, CompileResult, NumericDomainError};
pub use program::{Inputs, Instr, Program};
pub use routine::{CompiledRoutine, CompiledRoutineSet, RoutineKind, compile};
