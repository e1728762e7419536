//! The compiled model as seen by the integrators.
//!
//! For semi-explicit index-1 DAEs the algebraic variables are eliminated by
//! solving the residual equations inside every right-hand-side evaluation,
//! warm-started from the previous algebraic solution.

use std::sync::Arc;

use cx_compiler::CompiledRoutineSet;
use cx_core::Tolerances;
use nalgebra::{DMatrix, DVector};

use crate::error::{SolverError, SolverResult};
use crate::jacobian::{FD_EPSILON, finite_difference_jacobian};
use crate::newton::{NewtonConfig, newton_solve};

/// A solution point: time, states, algebraic values and state rates.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverPoint {
    pub t: f64,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub f: Vec<f64>,
}

pub struct OdeSystem {
    routines: Arc<CompiledRoutineSet>,
    constants: Vec<f64>,
    /// Last algebraic solution, used as the next Newton guess.
    z: Vec<f64>,
    newton: NewtonConfig,
    /// Convergence test for the algebraic and steady Newton solves.
    tolerances: Tolerances,
    rhs_evaluations: u64,
}

impl OdeSystem {
    pub fn new(
        routines: Arc<CompiledRoutineSet>,
        constants: Vec<f64>,
        algebraic_guess: Vec<f64>,
        newton: NewtonConfig,
        tolerances: Tolerances,
    ) -> SolverResult<Self> {
        if constants.len() != routines.parameter_count() {
            return Err(SolverError::InvalidConfig {
                what: format!(
                    "expected {} constants, got {}",
                    routines.parameter_count(),
                    constants.len()
                ),
            });
        }
        if algebraic_guess.len() != routines.algebraic_count() {
            return Err(SolverError::InvalidConfig {
                what: format!(
                    "expected {} algebraic values, got {}",
                    routines.algebraic_count(),
                    algebraic_guess.len()
                ),
            });
        }
        Ok(Self {
            routines,
            constants,
            z: algebraic_guess,
            newton,
            tolerances,
            rhs_evaluations: 0,
        })
    }

    pub fn state_count(&self) -> usize {
        self.routines.state_count()
    }

    pub fn algebraic_count(&self) -> usize {
        self.routines.algebraic_count()
    }

    pub fn constants(&self) -> &[f64] {
        &self.constants
    }

    pub fn set_constants(&mut self, constants: Vec<f64>) -> SolverResult<()> {
        if constants.len() != self.constants.len() {
            return Err(SolverError::InvalidConfig {
                what: format!(
                    "expected {} constants, got {}",
                    self.constants.len(),
                    constants.len()
                ),
            });
        }
        self.constants = constants;
        Ok(())
    }

    pub fn rhs_evaluations(&self) -> u64 {
        self.rhs_evaluations
    }

    pub fn routines(&self) -> &Arc<CompiledRoutineSet> {
        &self.routines
    }

    pub(crate) fn newton(&self) -> &NewtonConfig {
        &self.newton
    }

    pub fn tolerances(&self) -> Tolerances {
        self.tolerances
    }

    /// Solve the algebraic constraints at `(t, y)`, starting from the last
    /// solution.
    pub fn solve_algebraic(&mut self, t: f64, y: &[f64]) -> SolverResult<Vec<f64>> {
        let Some(residual) = self.routines.residual.as_ref() else {
            return Ok(Vec::new());
        };
        let m = residual.output_len();
        let constants = &self.constants;

        let eval = |z: &DVector<f64>| -> SolverResult<DVector<f64>> {
            let mut r = DVector::zeros(m);
            residual.call(t, y, z.as_slice(), constants, r.as_mut_slice())?;
            Ok(r)
        };
        let jac = |z: &DVector<f64>| -> SolverResult<DMatrix<f64>> {
            let r = eval(z)?;
            finite_difference_jacobian(z, &r, eval, FD_EPSILON)
        };

        let z0 = DVector::from_column_slice(&self.z);
        let solved = newton_solve(z0, eval, jac, &self.newton, self.tolerances)?;
        self.z = solved.x.as_slice().to_vec();
        Ok(self.z.clone())
    }

    /// Evaluate state rates at `(t, y)`, solving algebraic constraints first.
    /// Returns the algebraic values used.
    pub fn rhs(&mut self, t: f64, y: &[f64], dy: &mut [f64]) -> SolverResult<Vec<f64>> {
        self.rhs_evaluations += 1;
        let z = self.solve_algebraic(t, y)?;
        self.routines
            .derivative
            .call(t, y, &z, &self.constants, dy)?;
        Ok(z)
    }

    /// Full solution point at `(t, y)`.
    pub fn point(&mut self, t: f64, y: Vec<f64>) -> SolverResult<SolverPoint> {
        let mut f = vec![0.0; y.len()];
        let z = self.rhs(t, &y, &mut f)?;
        Ok(SolverPoint { t, y, z, f })
    }

    /// State Jacobian `df/dy` at `(t, y)`. Uses the compiled symbolic
    /// Jacobian when present, forward differences otherwise.
    pub fn jacobian(&mut self, t: f64, y: &[f64], f: &[f64]) -> SolverResult<DMatrix<f64>> {
        let n = y.len();
        if let Some(jac) = self.routines.jacobian.as_ref() {
            let mut flat = vec![0.0; n * n];
            // A domain fault in the symbolic form (e.g. sqrt at 0) falls back
            // to differences.
            if jac.call(t, y, &[], &self.constants, &mut flat).is_ok() {
                return Ok(DMatrix::from_row_slice(n, n, &flat));
            }
        }

        let x = DVector::from_column_slice(y);
        let fx = DVector::from_column_slice(f);
        finite_difference_jacobian(
            &x,
            &fx,
            |yp: &DVector<f64>| {
                let mut dy = DVector::zeros(n);
                self.rhs(t, yp.as_slice(), dy.as_mut_slice())?;
                Ok(dy)
            },
            FD_EPSILON,
        )
    }
}

/// Find algebraic values consistent with `(t, y)`.
///
/// Models without algebraic variables return an empty vector.
pub fn consistent_initial_conditions(
    routines: &Arc<CompiledRoutineSet>,
    constants: &[f64],
    t: f64,
    y: &[f64],
    algebraic_guess: &[f64],
    newton: &NewtonConfig,
    tolerances: Tolerances,
) -> SolverResult<Vec<f64>> {
    let mut system = OdeSystem::new(
        Arc::clone(routines),
        constants.to_vec(),
        algebraic_guess.to_vec(),
        newton.clone(),
        tolerances,
    )?;
    system.solve_algebraic(t, y)
}
