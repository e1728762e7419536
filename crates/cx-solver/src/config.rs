//! Solver selection and settings.

use cx_core::Tolerances;
use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};
use crate::newton::NewtonConfig;

/// Integration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Forward Euler, fixed step.
    Euler,
    /// Second-order Runge-Kutta (midpoint), fixed step.
    Rk2,
    /// Classic fourth-order Runge-Kutta, fixed step.
    #[default]
    Rk4,
    /// Heun-Euler embedded pair with local error control.
    AdaptiveHeunEuler,
    /// Variable-step, variable-order BDF for stiff systems.
    Bdf,
    /// Nonlinear steady-state solve at each output time.
    Steady,
    /// BDF when the model is flagged stiff, adaptive Heun-Euler otherwise.
    Auto,
}

impl SolverKind {
    /// Replace `Auto` with a concrete strategy.
    pub fn resolve(self, stiff: bool) -> SolverKind {
        match self {
            SolverKind::Auto if stiff => SolverKind::Bdf,
            SolverKind::Auto => SolverKind::AdaptiveHeunEuler,
            other => other,
        }
    }

    pub fn is_fixed_step(self) -> bool {
        matches!(self, SolverKind::Euler | SolverKind::Rk2 | SolverKind::Rk4)
    }

    pub fn is_implicit(self) -> bool {
        matches!(self, SolverKind::Bdf | SolverKind::Steady)
    }
}

/// Solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub kind: SolverKind,
    /// Fixed step for explicit fixed-step methods, initial step otherwise.
    pub step: f64,
    /// Upper bound on the internal step, if any.
    pub max_step: Option<f64>,
    pub tolerances: Tolerances,
    pub newton: NewtonConfig,
    /// Consecutive rejected attempts allowed within one step.
    pub max_retries: usize,
    /// Step size safety factor for adaptive methods.
    pub safety: f64,
    /// Largest factor a step may grow by after an accepted step.
    pub max_growth: f64,
    /// Highest BDF order (1..=5).
    pub max_order: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::default(),
            step: 1e-3,
            max_step: None,
            tolerances: Tolerances::default(),
            newton: NewtonConfig::default(),
            max_retries: 12,
            safety: 0.9,
            max_growth: 5.0,
            max_order: 5,
        }
    }
}

impl SolverConfig {
    pub fn with_kind(kind: SolverKind, step: f64) -> Self {
        Self {
            kind,
            step,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SolverResult<()> {
        let invalid = |what: &str| {
            Err(SolverError::InvalidConfig {
                what: what.to_string(),
            })
        };
        if !(self.step > 0.0 && self.step.is_finite()) {
            return invalid("step must be positive and finite");
        }
        if let Some(max) = self.max_step {
            if !(max > 0.0) {
                return invalid("max_step must be positive");
            }
        }
        if !(self.tolerances.abs > 0.0 && self.tolerances.rel > 0.0) {
            return invalid("tolerances must be positive");
        }
        if !(self.safety > 0.0 && self.safety <= 1.0) {
            return invalid("safety factor must be in (0, 1]");
        }
        if !(self.max_growth > 1.0) {
            return invalid("max_growth must exceed 1");
        }
        if !(1..=5).contains(&self.max_order) {
            return invalid("max_order must be between 1 and 5");
        }
        if self.max_retries == 0 {
            return invalid("max_retries must be positive");
        }
        Ok(())
    }

    /// Internal step clamped to `max_step`.
    pub(crate) fn clamp_step(&self, h: f64) -> f64 {
        match self.max_step {
            Some(max) => h.min(max),
            None => h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_resolution() {
        assert_eq!(SolverKind::Auto.resolve(true), SolverKind::Bdf);
        assert_eq!(
            SolverKind::Auto.resolve(false),
            SolverKind::AdaptiveHeunEuler
        );
        assert_eq!(SolverKind::Rk2.resolve(true), SolverKind::Rk2);
    }

    #[test]
    fn config_validation() {
        assert!(SolverConfig::default().validate().is_ok());
        let mut c = SolverConfig::default();
        c.step = 0.0;
        assert!(c.validate().is_err());
        let mut c = SolverConfig::default();
        c.max_order = 6;
        assert!(c.validate().is_err());
    }

    #[test]
    fn config_from_json_uses_defaults() {
        let c: SolverConfig = serde_json::from_str(r#"{"kind":"bdf","step":0.01}"#).unwrap();
        assert_eq!(c.kind, SolverKind::Bdf);
        assert_eq!(c.step, 0.01);
        assert_eq!(c.max_order, 5);
    }
}
