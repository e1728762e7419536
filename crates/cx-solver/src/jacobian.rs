//! Finite difference Jacobian computation.

use nalgebra::{DMatrix, DVector};

use crate::error::SolverResult;

/// Default relative perturbation for forward differences.
pub const FD_EPSILON: f64 = 1e-7;

/// Compute Jacobian using forward finite differences.
///
/// Column `j` perturbs `x[j]` by `epsilon * max(|x[j]|, 1)`. `f_x` is the
/// already evaluated `f(x)`, so each call costs `n` evaluations.
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    f_x: &DVector<f64>,
    mut f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: FnMut(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let n = x.len();
    let m = f_x.len();
    let mut jac = DMatrix::zeros(m, n);

    let mut x_perturbed = x.clone();
    for j in 0..n {
        let dx = epsilon * x[j].abs().max(1.0);
        x_perturbed[j] = x[j] + dx;
        let f_perturbed = f(&x_perturbed)?;
        x_perturbed[j] = x[j];

        let df = (f_perturbed - f_x) / dx;
        jac.set_column(j, &df);
    }

    Ok(jac)
}
