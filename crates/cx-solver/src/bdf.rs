//! Variable-step, variable-order BDF integrator for stiff systems.
//!
//! Coefficients are derived each step from the actual history times
//! (derivative of the Lagrange interpolant at the new time), so step size
//! changes need no history rescaling. The implicit corrector equation
//!
//! ```text
//! alpha_0 * y + sum_j alpha_j * y_j - f(t, y) = 0
//! ```
//!
//! is solved by simplified Newton iteration with matrix `alpha_0 * I - J`,
//! reusing `J` across steps until the corrector fails or the matrix ages out.

use std::collections::VecDeque;

use cx_core::{Tolerances, max_scaled_error};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::config::SolverConfig;
use crate::error::SolverResult;
use crate::explicit::{axpy, clamp_to_stop, min_step};
use crate::handle::StepOutcome;
use crate::system::{OdeSystem, SolverPoint};

const MAX_CORRECTOR_ITERATIONS: usize = 5;
/// Corrector update size, in tolerance units, regarded as converged.
const CORRECTOR_TOL: f64 = 0.1;
/// Accepted steps after which the Jacobian is re-evaluated.
const JACOBIAN_MAX_AGE: usize = 20;

/// `L_j'(x_0)` for the Lagrange basis on `nodes`, where `nodes[0]` is the
/// new time and the rest are history times.
fn bdf_coefficients(nodes: &[f64]) -> Vec<f64> {
    let x0 = nodes[0];
    let k = nodes.len();
    let mut alpha = vec![0.0; k];
    alpha[0] = nodes[1..].iter().map(|xm| 1.0 / (x0 - xm)).sum();
    for j in 1..k {
        let mut num = 1.0;
        let mut den = 1.0;
        for m in 0..k {
            if m == j {
                continue;
            }
            if m != 0 {
                num *= x0 - nodes[m];
            }
            den *= nodes[j] - nodes[m];
        }
        alpha[j] = num / den;
    }
    alpha
}

enum Attempt {
    Accepted(SolverPoint, f64),
    ErrorTooLarge(f64),
    CorrectorFailed,
}

pub struct Bdf {
    pub(crate) system: OdeSystem,
    pub(crate) point: SolverPoint,
    /// Accepted `(t, y)`, newest first; the front is always `point`.
    history: VecDeque<(f64, Vec<f64>)>,
    h: f64,
    order: usize,
    max_order: usize,
    steps_at_order: usize,
    jacobian: Option<DMatrix<f64>>,
    jacobian_fresh: bool,
    jacobian_age: usize,
    max_step: Option<f64>,
    tol: Tolerances,
    safety: f64,
    max_growth: f64,
    max_retries: usize,
}

impl Bdf {
    pub fn new(system: OdeSystem, point: SolverPoint, config: &SolverConfig) -> Self {
        let mut history = VecDeque::with_capacity(config.max_order + 2);
        history.push_front((point.t, point.y.clone()));
        Self {
            system,
            point,
            history,
            h: config.clamp_step(config.step),
            order: 1,
            max_order: config.max_order,
            steps_at_order: 0,
            jacobian: None,
            jacobian_fresh: false,
            jacobian_age: 0,
            max_step: config.max_step,
            tol: config.tolerances,
            safety: config.safety,
            max_growth: config.max_growth,
            max_retries: config.max_retries,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn step_size(&self) -> f64 {
        self.h
    }

    /// Forget history and restart at order 1 from `point`.
    pub fn reset(&mut self, point: SolverPoint) {
        self.history.clear();
        self.history.push_front((point.t, point.y.clone()));
        self.point = point;
        self.order = 1;
        self.steps_at_order = 0;
        self.invalidate_jacobian();
    }

    pub fn invalidate_jacobian(&mut self) {
        self.jacobian = None;
        self.jacobian_fresh = false;
    }

    fn ensure_jacobian(&mut self) -> SolverResult<()> {
        if self.jacobian.is_none() {
            let p = &self.point;
            let j = self.system.jacobian(p.t, &p.y, &p.f)?;
            self.jacobian = Some(j);
            self.jacobian_fresh = true;
            self.jacobian_age = 0;
        }
        Ok(())
    }

    /// Extrapolate the history polynomial to `t_new`.
    fn predict(&self, t_new: f64, h: f64, k: usize) -> Vec<f64> {
        let m = (k + 1).min(self.history.len());
        if m < 2 {
            return axpy(&self.point.y, h, &self.point.f);
        }
        let pts: Vec<&(f64, Vec<f64>)> = self.history.iter().take(m).collect();
        let mut y = vec![0.0; self.point.y.len()];
        for j in 0..m {
            let mut w = 1.0;
            for l in 0..m {
                if l != j {
                    w *= (t_new - pts[l].0) / (pts[j].0 - pts[l].0);
                }
            }
            for (yi, hist) in y.iter_mut().zip(&pts[j].1) {
                *yi += w * hist;
            }
        }
        y
    }

    fn attempt(&mut self, h: f64, t_new: f64) -> SolverResult<Attempt> {
        let k = self.order.min(self.history.len());
        let n = self.point.y.len();

        let mut nodes = Vec::with_capacity(k + 1);
        nodes.push(t_new);
        nodes.extend(self.history.iter().take(k).map(|(t, _)| *t));
        let alpha = bdf_coefficients(&nodes);

        // History part of the BDF derivative.
        let mut c = vec![0.0; n];
        for (a, (_, yj)) in alpha[1..].iter().zip(self.history.iter()) {
            for (ci, yji) in c.iter_mut().zip(yj) {
                *ci += a * yji;
            }
        }

        let y_pred = self.predict(t_new, h, k);
        let Some(jac) = self.jacobian.as_ref() else {
            return Ok(Attempt::CorrectorFailed);
        };
        let iteration = DMatrix::identity(n, n) * alpha[0] - jac;
        let lu = iteration.lu();

        let mut y = y_pred.clone();
        let mut f = vec![0.0; n];
        let mut prev_norm = f64::INFINITY;
        let mut converged = false;
        for _ in 0..MAX_CORRECTOR_ITERATIONS {
            self.system.rhs(t_new, &y, &mut f)?;
            let g = DVector::from_iterator(n, (0..n).map(|i| alpha[0] * y[i] + c[i] - f[i]));
            let Some(delta) = lu.solve(&g) else {
                return Ok(Attempt::CorrectorFailed);
            };
            for (yi, di) in y.iter_mut().zip(delta.iter()) {
                *yi -= di;
            }
            let norm = max_scaled_error(delta.as_slice(), &y, self.tol);
            if norm <= CORRECTOR_TOL {
                converged = true;
                break;
            }
            if norm > 2.0 * prev_norm {
                break;
            }
            prev_norm = norm;
        }
        if !converged {
            return Ok(Attempt::CorrectorFailed);
        }

        let scale = 1.0 / (k as f64 + 1.0);
        let err_vec: Vec<f64> = y.iter().zip(&y_pred).map(|(a, b)| (a - b) * scale).collect();
        let err = max_scaled_error(&err_vec, &y, self.tol);
        if !(err <= 1.0) {
            return Ok(Attempt::ErrorTooLarge(err));
        }

        let point = self.system.point(t_new, y)?;
        Ok(Attempt::Accepted(point, err))
    }

    fn accept(&mut self, point: SolverPoint, err: f64, h: f64) {
        self.history.push_front((point.t, point.y.clone()));
        self.history.truncate(self.max_order + 1);
        self.point = point;

        self.jacobian_fresh = false;
        self.jacobian_age += 1;
        if self.jacobian_age >= JACOBIAN_MAX_AGE {
            self.jacobian = None;
        }

        let k = self.order;
        let mut factor = if err == 0.0 {
            self.max_growth
        } else {
            (self.safety * err.powf(-1.0 / (k as f64 + 1.0))).clamp(0.2, self.max_growth)
        };
        // Small changes are not worth it.
        if (1.0..1.2).contains(&factor) {
            factor = 1.0;
        }

        self.steps_at_order += 1;
        if self.steps_at_order > k
            && k < self.max_order
            && self.history.len() >= k + 2
            && err < 0.5
        {
            self.order = k + 1;
            self.steps_at_order = 0;
            debug!(t = self.point.t, order = self.order, "BDF order raised");
        }

        if h == self.h || factor < 1.0 {
            let new_h = h * factor;
            self.h = match self.max_step {
                Some(max) => new_h.min(max),
                None => new_h,
            };
        }
    }

    fn reject(&mut self, err: f64, h: f64) {
        let k = self.order as f64;
        let factor = (self.safety * err.powf(-1.0 / (k + 1.0))).clamp(0.2, 0.9);
        self.h = h * factor;
        if self.order > 1 {
            self.order -= 1;
            self.steps_at_order = 0;
            debug!(t = self.point.t, order = self.order, "BDF order lowered");
        }
    }

    pub fn step(&mut self, t_stop: f64) -> StepOutcome {
        let mut last = StepOutcome::RejectedRetrying;
        let mut retries = 0;
        while retries < self.max_retries {
            retries += 1;
            let (h, t_new) = clamp_to_stop(self.point.t, self.h, t_stop);
            if h < min_step(self.point.t) {
                return StepOutcome::Diverged(format!(
                    "step size {h:e} below minimum at t = {}",
                    self.point.t
                ));
            }

            let result = self.ensure_jacobian().and_then(|_| self.attempt(h, t_new));
            match result {
                Ok(Attempt::Accepted(point, err)) => {
                    self.accept(point, err, h);
                    return StepOutcome::Accepted;
                }
                Ok(Attempt::ErrorTooLarge(err)) => {
                    debug!(t = self.point.t, h, err, "BDF step rejected");
                    self.reject(err, h);
                    last = StepOutcome::RejectedRetrying;
                }
                Ok(Attempt::CorrectorFailed) => {
                    if !self.jacobian_fresh {
                        // Retry the same step with a current Jacobian.
                        self.invalidate_jacobian();
                        continue;
                    }
                    debug!(t = self.point.t, h, "BDF corrector failed");
                    self.h = h * 0.25;
                    last = StepOutcome::Diverged(format!(
                        "corrector failed to converge at t = {}",
                        self.point.t
                    ));
                }
                Err(e) => {
                    debug!(t = self.point.t, h, error = %e, "BDF step failed");
                    self.h = h * 0.25;
                    last = StepOutcome::from_error(e);
                }
            }
        }

        match last {
            StepOutcome::RejectedRetrying => StepOutcome::Diverged(format!(
                "{} consecutive rejected steps at t = {}",
                self.max_retries, self.point.t
            )),
            terminal => terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bdf1_is_backward_euler() {
        let alpha = bdf_coefficients(&[1.1, 1.0]);
        assert!((alpha[0] - 10.0).abs() < 1e-9);
        assert!((alpha[1] + 10.0).abs() < 1e-9);
    }

    #[test]
    fn bdf2_constant_step() {
        // 3/2 y_{n+1} - 2 y_n + 1/2 y_{n-1} = h f
        let h = 0.5;
        let alpha = bdf_coefficients(&[1.0, 0.5, 0.0]);
        assert!((alpha[0] * h - 1.5).abs() < 1e-12);
        assert!((alpha[1] * h + 2.0).abs() < 1e-12);
        assert!((alpha[2] * h - 0.5).abs() < 1e-12);
    }

    #[test]
    fn coefficients_differentiate_polynomials_exactly() {
        // Any BDF-k formula is exact for degree-k polynomials.
        let nodes = [0.9, 0.7, 0.65, 0.4];
        let alpha = bdf_coefficients(&nodes);
        let p = |t: f64| 2.0 * t * t * t - t + 3.0;
        let dp = 6.0 * 0.9 * 0.9 - 1.0;
        let approx: f64 = alpha.iter().zip(nodes).map(|(a, t)| a * p(t)).sum();
        assert!((approx - dp).abs() < 1e-9);
    }
}
