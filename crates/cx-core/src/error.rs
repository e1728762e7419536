use thiserror::Error;

pub type CxResult<T> = Result<T, CxError>;

/// Failures of the shared numeric helpers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CxError {
    #[error("{what} is not finite ({value})")]
    NonFinite { what: &'static str, value: f64 },

    #[error("{which} tolerance must be positive and finite, got {value}")]
    BadTolerance { which: &'static str, value: f64 },
}
