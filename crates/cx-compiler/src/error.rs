//! Error types for compilation and routine evaluation.

use thiserror::Error;

/// Expression lowering failure. No routine set is produced when any
/// expression fails.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Unknown variable '{name}' in {routine} equation {equation}")]
    UnknownVariable {
        name: String,
        routine: &'static str,
        equation: usize,
    },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Unsupported operator '{name}'")]
    UnsupportedOperator { name: String },

    #[error("Function '{func}' takes {expected} argument(s), got {actual}")]
    ArityMismatch {
        func: String,
        expected: usize,
        actual: usize,
    },
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Invalid math operation hit while evaluating a compiled routine.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum NumericDomainError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Logarithm of non-positive value {value}")]
    LogOfNonPositive { value: f64 },

    #[error("Square root of negative value {value}")]
    SqrtOfNegative { value: f64 },

    #[error("Argument {value} outside the domain of {func}")]
    OutOfDomain { func: &'static str, value: f64 },

    #[error("{routine} output {index} is not finite ({value})")]
    NonFinite {
        routine: &'static str,
        index: usize,
        value: f64,
    },

    #[error("{what} has length {actual}, expected {expected}")]
    InputLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}
