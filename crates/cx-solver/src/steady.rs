//! Steady-state solver.
//!
//! Instead of integrating, each step jumps to the next time and solves
//! `rates(t, y, z) = 0` together with the algebraic residuals for `(y, z)`,
//! warm-started from the previous solution. Useful for models whose
//! transients are uninteresting or whose inputs vary slowly with time.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::SolverResult;
use crate::explicit::min_step;
use crate::handle::StepOutcome;
use crate::jacobian::{FD_EPSILON, finite_difference_jacobian};
use crate::newton::newton_solve;
use crate::system::{OdeSystem, SolverPoint};

pub struct SteadyState {
    pub(crate) system: OdeSystem,
    pub(crate) point: SolverPoint,
    h: f64,
}

impl SteadyState {
    pub fn new(system: OdeSystem, point: SolverPoint, h: f64) -> Self {
        Self { system, point, h }
    }

    pub fn reset(&mut self, point: SolverPoint) {
        self.point = point;
    }

    /// Solve for the steady point at time `t`, starting from `(y0, z0)`.
    pub fn solve_at(&mut self, t: f64, y0: &[f64], z0: &[f64]) -> SolverResult<SolverPoint> {
        let n = y0.len();
        let m = z0.len();
        let routines = std::sync::Arc::clone(self.system.routines());
        let constants = self.system.constants().to_vec();

        let eval = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            let (y, z) = x.as_slice().split_at(n);
            let mut r = DVector::zeros(n + m);
            routines
                .derivative
                .call(t, y, z, &constants, &mut r.as_mut_slice()[..n])?;
            if let Some(residual) = routines.residual.as_ref() {
                residual.call(t, y, z, &constants, &mut r.as_mut_slice()[n..])?;
            }
            Ok(r)
        };
        let jac = |x: &DVector<f64>| -> SolverResult<DMatrix<f64>> {
            let r = eval(x)?;
            finite_difference_jacobian(x, &r, eval, FD_EPSILON)
        };

        let x0 = DVector::from_iterator(n + m, y0.iter().chain(z0).copied());
        let solved = newton_solve(
            x0,
            eval,
            jac,
            self.system.newton(),
            self.system.tolerances(),
        )?;
        debug!(t, iterations = solved.iterations, "Steady state solved");

        let (y, z) = solved.x.as_slice().split_at(n);
        Ok(SolverPoint {
            t,
            y: y.to_vec(),
            z: z.to_vec(),
            f: vec![0.0; n],
        })
    }

    pub fn step(&mut self, t_stop: f64) -> StepOutcome {
        let mut t_next = self.point.t + self.h;
        if t_next >= t_stop - 1e-9 * self.h {
            t_next = t_stop;
        }
        if t_next - self.point.t < min_step(self.point.t) {
            return StepOutcome::Diverged(format!(
                "no room for a step at t = {} before {t_stop}",
                self.point.t
            ));
        }

        let y0 = self.point.y.clone();
        let z0 = self.point.z.clone();
        match self.solve_at(t_next, &y0, &z0) {
            Ok(point) => {
                self.point = point;
                StepOutcome::Accepted
            }
            Err(e) => StepOutcome::from_error(e),
        }
    }
}
