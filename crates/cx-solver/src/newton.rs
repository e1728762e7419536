//! Damped Newton solver with backtracking line search.

use cx_core::{Tolerances, max_scaled_error};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};

/// Newton solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Line search backtracking factor
    pub line_search_beta: f64,
    /// Maximum line search iterations
    pub max_line_search_iters: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            line_search_beta: 0.5,
            max_line_search_iters: 20,
        }
    }
}

/// Newton iteration result.
#[derive(Debug, Clone)]
pub struct NewtonResult {
    /// Solution vector
    pub x: DVector<f64>,
    /// Final residual norm
    pub residual_norm: f64,
    /// Number of iterations
    pub iterations: usize,
}

/// `|r_i| <= abs + rel * |x_i|` for every component.
fn residual_converged(r: &DVector<f64>, x: &DVector<f64>, tol: Tolerances) -> bool {
    max_scaled_error(r.as_slice(), x.as_slice(), tol) <= 1.0
}

/// Newton solver with backtracking line search.
///
/// A full step is taken when it reduces the residual norm; otherwise the step
/// is halved (by `line_search_beta`) until it does. The iteration has
/// converged once every residual component is within `tol` of zero (scaled
/// by the matching unknown), or once a full, undamped step moved every
/// unknown by no more than `tol`. Failing to converge within
/// `max_iterations`, a singular Jacobian, or a stagnating line search all
/// report [`SolverError::Diverged`].
pub fn newton_solve<F, J>(
    x0: DVector<f64>,
    mut residual_fn: F,
    mut jacobian_fn: J,
    config: &NewtonConfig,
    tol: Tolerances,
) -> SolverResult<NewtonResult>
where
    F: FnMut(&DVector<f64>) -> SolverResult<DVector<f64>>,
    J: FnMut(&DVector<f64>) -> SolverResult<DMatrix<f64>>,
{
    let mut x = x0;
    let mut r = residual_fn(&x)?;
    let mut r_norm = r.norm();

    for iter in 0..config.max_iterations {
        if residual_converged(&r, &x, tol) {
            return Ok(NewtonResult {
                x,
                residual_norm: r_norm,
                iterations: iter,
            });
        }

        let jac = jacobian_fn(&x)?;

        // Solve J * dx = -r
        let dx = jac
            .lu()
            .solve(&(-&r))
            .ok_or_else(|| SolverError::diverged("singular Jacobian in Newton iteration"))?;

        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..config.max_line_search_iters {
            let x_new = &x + alpha * &dx;
            // Domain errors on a trial point shorten the step.
            if let Ok(r_new) = residual_fn(&x_new) {
                let r_new_norm = r_new.norm();
                if r_new_norm.is_finite() && r_new_norm < r_norm {
                    accepted = Some((x_new, r_new, r_new_norm));
                    break;
                }
            }
            alpha *= config.line_search_beta;
        }

        match accepted {
            Some((x_new, r_new, r_new_norm)) => {
                let settled =
                    alpha == 1.0 && max_scaled_error(dx.as_slice(), x_new.as_slice(), tol) <= 1.0;
                x = x_new;
                r = r_new;
                r_norm = r_new_norm;
                if settled {
                    return Ok(NewtonResult {
                        x,
                        residual_norm: r_norm,
                        iterations: iter + 1,
                    });
                }
            }
            None => {
                return Err(SolverError::diverged(format!(
                    "line search stagnated at iteration {iter}, residual = {r_norm:e}"
                )));
            }
        }
    }

    if residual_converged(&r, &x, tol) {
        return Ok(NewtonResult {
            x,
            residual_norm: r_norm,
            iterations: config.max_iterations,
        });
    }

    Err(SolverError::diverged(format!(
        "maximum iterations {} reached, residual = {r_norm:e}",
        config.max_iterations
    )))
}
