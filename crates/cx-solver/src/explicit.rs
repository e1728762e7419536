//! Explicit integrators: fixed-step Euler/RK2/RK4 and adaptive Heun-Euler.

use cx_core::{Tolerances, max_scaled_error};
use tracing::debug;

use crate::config::{SolverConfig, SolverKind};
use crate::error::SolverResult;
use crate::handle::StepOutcome;
use crate::system::{OdeSystem, SolverPoint};

/// `y + h * k`
pub(crate) fn axpy(y: &[f64], h: f64, k: &[f64]) -> Vec<f64> {
    y.iter().zip(k).map(|(yi, ki)| yi + h * ki).collect()
}

/// Smallest step worth taking at time `t`.
pub(crate) fn min_step(t: f64) -> f64 {
    16.0 * f64::EPSILON * t.abs().max(1.0)
}

/// Step size and end time for a step of at most `h` from `t` toward
/// `t_stop`. A step that would stop just short of `t_stop` is stretched to
/// land on it exactly.
pub(crate) fn clamp_to_stop(t: f64, h: f64, t_stop: f64) -> (f64, f64) {
    let remaining = t_stop - t;
    if h >= remaining - 1e-9 * h.max(min_step(t)) {
        (remaining, t_stop)
    } else {
        (h, t + h)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedMethod {
    Euler,
    Rk2,
    Rk4,
}

impl FixedMethod {
    pub(crate) fn from_kind(kind: SolverKind) -> Option<Self> {
        match kind {
            SolverKind::Euler => Some(FixedMethod::Euler),
            SolverKind::Rk2 => Some(FixedMethod::Rk2),
            SolverKind::Rk4 => Some(FixedMethod::Rk4),
            _ => None,
        }
    }

    /// New state after one step of size `h` from `p`, whose rates are
    /// already known.
    fn advance(self, system: &mut OdeSystem, p: &SolverPoint, h: f64) -> SolverResult<Vec<f64>> {
        let n = p.y.len();
        let (t, y, k1) = (p.t, &p.y, &p.f);
        match self {
            FixedMethod::Euler => Ok(axpy(y, h, k1)),
            FixedMethod::Rk2 => {
                let mut k2 = vec![0.0; n];
                system.rhs(t + 0.5 * h, &axpy(y, 0.5 * h, k1), &mut k2)?;
                Ok(axpy(y, h, &k2))
            }
            FixedMethod::Rk4 => {
                let mut k2 = vec![0.0; n];
                let mut k3 = vec![0.0; n];
                let mut k4 = vec![0.0; n];
                system.rhs(t + 0.5 * h, &axpy(y, 0.5 * h, k1), &mut k2)?;
                system.rhs(t + 0.5 * h, &axpy(y, 0.5 * h, &k2), &mut k3)?;
                system.rhs(t + h, &axpy(y, h, &k3), &mut k4)?;

                // y + (h/6) * (k1 + 2*k2 + 2*k3 + k4)
                Ok((0..n)
                    .map(|i| y[i] + h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
                    .collect())
            }
        }
    }
}

/// Fixed-step explicit integrator.
///
/// Step `i` lands on `origin + i * h` exactly, so long runs do not drift;
/// only the final step is shortened to hit the stop time.
pub struct FixedStep {
    method: FixedMethod,
    pub(crate) system: OdeSystem,
    h: f64,
    origin: f64,
    index: u64,
    pub(crate) point: SolverPoint,
}

impl FixedStep {
    pub fn new(method: FixedMethod, system: OdeSystem, h: f64, point: SolverPoint) -> Self {
        Self {
            method,
            system,
            h,
            origin: point.t,
            index: 0,
            point,
        }
    }

    pub fn reset(&mut self, point: SolverPoint) {
        self.origin = point.t;
        self.index = 0;
        self.point = point;
    }

    pub fn step(&mut self, t_stop: f64) -> StepOutcome {
        let mut index = self.index + 1;
        let mut t_next = self.origin + index as f64 * self.h;
        if t_next >= t_stop - 1e-9 * self.h {
            t_next = t_stop;
        }
        let h = t_next - self.point.t;
        if h < min_step(self.point.t) {
            return StepOutcome::Diverged(format!(
                "no room for a step at t = {} before {t_stop}",
                self.point.t
            ));
        }

        let result = self
            .method
            .advance(&mut self.system, &self.point, h)
            .and_then(|y| self.system.point(t_next, y));
        match result {
            Ok(p) => {
                if t_next == t_stop {
                    // Restart the grid so a later stop time keeps spacing.
                    self.origin = t_next;
                    index = 0;
                }
                self.index = index;
                self.point = p;
                StepOutcome::Accepted
            }
            Err(e) => StepOutcome::from_error(e),
        }
    }
}

/// Heun-Euler embedded pair (orders 2 and 1) with local error control.
///
/// Rejected steps halve the step size. After two accepted steps in a row
/// the step may grow, by at most `max_growth`.
pub struct AdaptiveHeunEuler {
    pub(crate) system: OdeSystem,
    pub(crate) point: SolverPoint,
    h: f64,
    max_step: Option<f64>,
    tol: Tolerances,
    safety: f64,
    max_growth: f64,
    max_retries: usize,
    accepted_streak: u32,
}

impl AdaptiveHeunEuler {
    pub fn new(system: OdeSystem, point: SolverPoint, config: &SolverConfig) -> Self {
        Self {
            system,
            point,
            h: config.clamp_step(config.step),
            max_step: config.max_step,
            tol: config.tolerances,
            safety: config.safety,
            max_growth: config.max_growth,
            max_retries: config.max_retries,
            accepted_streak: 0,
        }
    }

    pub fn step_size(&self) -> f64 {
        self.h
    }

    pub fn reset(&mut self, point: SolverPoint) {
        self.point = point;
        self.accepted_streak = 0;
    }

    fn attempt(&mut self, h: f64, t_new: f64) -> SolverResult<Option<(SolverPoint, f64)>> {
        let p = &self.point;
        let n = p.y.len();
        let y_euler = axpy(&p.y, h, &p.f);
        let mut k2 = vec![0.0; n];
        self.system.rhs(t_new, &y_euler, &mut k2)?;

        let y_new: Vec<f64> = (0..n)
            .map(|i| p.y[i] + 0.5 * h * (p.f[i] + k2[i]))
            .collect();
        let err: Vec<f64> = (0..n).map(|i| 0.5 * h * (k2[i] - p.f[i])).collect();
        let reference: Vec<f64> = (0..n)
            .map(|i| p.y[i].abs().max(y_new[i].abs()))
            .collect();
        let err_norm = max_scaled_error(&err, &reference, self.tol);
        if !(err_norm <= 1.0) {
            return Ok(None);
        }

        let point = self.system.point(t_new, y_new)?;
        Ok(Some((point, err_norm)))
    }

    pub fn step(&mut self, t_stop: f64) -> StepOutcome {
        let mut last = StepOutcome::RejectedRetrying;
        for _ in 0..self.max_retries {
            let (h, t_new) = clamp_to_stop(self.point.t, self.h, t_stop);
            if h < min_step(self.point.t) {
                return StepOutcome::Diverged(format!(
                    "step size {h:e} below minimum at t = {}",
                    self.point.t
                ));
            }

            match self.attempt(h, t_new) {
                Ok(Some((point, err_norm))) => {
                    let factor = if err_norm == 0.0 {
                        self.max_growth
                    } else {
                        (self.safety * err_norm.powf(-0.5)).min(self.max_growth)
                    };
                    let factor = if self.accepted_streak >= 1 {
                        factor
                    } else {
                        factor.min(1.0)
                    };
                    // A step shortened to hit `t_stop` does not shrink `h`.
                    if h >= self.h {
                        self.h = h * factor;
                    }
                    self.h = match self.max_step {
                        Some(max) => self.h.min(max),
                        None => self.h,
                    };
                    self.accepted_streak = self.accepted_streak.saturating_add(1);
                    self.point = point;
                    return StepOutcome::Accepted;
                }
                Ok(None) => {
                    last = StepOutcome::RejectedRetrying;
                }
                Err(e) => {
                    last = StepOutcome::from_error(e);
                }
            }
            self.accepted_streak = 0;
            self.h = h * 0.5;
            debug!(t = self.point.t, h = self.h, "Step rejected, halving");
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
    fn steps_land_on_stop_time() {
        assert_eq!(clamp_to_stop(0.0, 0.25, 1.0), (0.25, 0.25));
        assert_eq!(clamp_to_stop(0.75, 0.5, 1.0), (0.25, 1.0));
        // One ulp short of the stop is stretched onto it.
        let t = 0.7;
        let (_, t_new) = clamp_to_stop(t, 0.3 - 1e-16, 1.0);
        assert_eq!(t_new, 1.0);
    }
}
