//! Model validation logic.

use std::collections::HashSet;

use crate::error::{ModelError, ModelResult};
use crate::expr::Expr;
use crate::variable::{VarKind, VariableDecl};

/// Validate declarations: names present and unique, initial values finite.
pub(crate) fn validate_declarations(decls: &[VariableDecl]) -> ModelResult<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for decl in decls {
        if decl.name.trim().is_empty() {
            return Err(ModelError::EmptyName);
        }
        if !seen.insert(decl.name.as_str()) {
            return Err(ModelError::DuplicateName {
                name: decl.name.clone(),
            });
        }
        if !decl.initial.is_finite() {
            return Err(ModelError::NonFiniteInitial {
                name: decl.name.clone(),
                value: decl.initial,
            });
        }
    }
    Ok(())
}

/// Rate count must match states, residual count must match algebraic
/// variables.
pub(crate) fn validate_arity(
    decls: &[VariableDecl],
    rates: &[Expr],
    residuals: &[Expr],
) -> ModelResult<()> {
    let states = decls.iter().filter(|d| d.kind == VarKind::State).count();
    let algebraic = decls
        .iter()
        .filter(|d| d.kind == VarKind::Algebraic)
        .count();

    if rates.len() != states {
        return Err(ModelError::ArityMismatch {
            what: "rate equations",
            expected: states,
            actual: rates.len(),
        });
    }
    if residuals.len() != algebraic {
        return Err(ModelError::ArityMismatch {
            what: "residual equations",
            expected: algebraic,
            actual: residuals.len(),
        });
    }
    Ok(())
}
