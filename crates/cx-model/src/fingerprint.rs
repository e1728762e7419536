//! Content-based model identity.
//!
//! The fingerprint covers everything that defines the compiled routines:
//! variable names, kinds and the rate/residual expressions. Parameter values
//! and initial values are excluded, so re-parameterising a model keeps its
//! fingerprint while editing an equation changes it.

use crate::expr::Expr;
use crate::variable::{VarKind, Variable};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelFingerprint([u8; 32]);

#[derive(Serialize)]
struct Defining<'a> {
    variables: Vec<(&'a str, VarKind)>,
    rates: &'a [Expr],
    residuals: &'a [Expr],
}

impl ModelFingerprint {
    pub(crate) fn compute(variables: &[Variable], rates: &[Expr], residuals: &[Expr]) -> Self {
        let defining = Defining {
            variables: variables
                .iter()
                .map(|v| (v.name.as_str(), v.kind))
                .collect(),
            rates,
            residuals,
        };

        let mut hasher = Sha256::new();
        let json = serde_json::to_string(&defining).unwrap_or_default();
        hasher.update(json.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        self.0[..6].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ModelFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ModelFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelFingerprint({})", self.short())
    }
}
