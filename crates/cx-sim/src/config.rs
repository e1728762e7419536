//! Run configuration.

use std::time::Duration;

use cx_core::Tolerances;
use cx_solver::{NewtonConfig, SolverConfig, SolverKind};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Settings for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    pub start_time: f64,
    pub end_time: f64,
    /// Fixed step for fixed-step solvers, initial step otherwise.
    pub step: f64,
    /// Upper bound on the internal step of adaptive solvers.
    pub max_step: Option<f64>,
    pub tolerances: Tolerances,
    pub solver: SolverKind,
    /// Spacing of recorded points, independent of the solver step.
    pub output_interval: f64,
    /// Safety bound on internal solver steps.
    pub max_steps: Option<u64>,
    /// Wall-clock pause after each recorded point, in milliseconds.
    pub delay_ms: u64,
    /// Keep solver history across a parameter change made while paused.
    /// Off by default: the solver is rebuilt from the current state.
    pub warm_resume_after_parameter_change: bool,
    pub newton: NewtonConfig,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 1.0,
            step: 1e-3,
            max_step: None,
            tolerances: Tolerances::default(),
            solver: SolverKind::default(),
            output_interval: 0.01,
            max_steps: Some(10_000_000),
            delay_ms: 0,
            warm_resume_after_parameter_change: false,
            newton: NewtonConfig::default(),
        }
    }
}

impl RunConfiguration {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.start_time.is_finite() && self.end_time.is_finite()) {
            return Err(SimError::invalid_config("start and end times must be finite"));
        }
        if !(self.end_time > self.start_time) {
            return Err(SimError::invalid_config(format!(
                "end time {} must exceed start time {}",
                self.end_time, self.start_time
            )));
        }
        if !(self.output_interval > 0.0 && self.output_interval.is_finite()) {
            return Err(SimError::invalid_config("output interval must be positive"));
        }
        if self.max_steps == Some(0) {
            return Err(SimError::invalid_config("max_steps must be positive"));
        }
        self.solver_config()
            .validate()
            .map_err(|e| SimError::invalid_config(e.to_string()))
    }

    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            kind: self.solver,
            step: self.step,
            max_step: self.max_step,
            tolerances: self.tolerances,
            newton: self.newton.clone(),
            ..SolverConfig::default()
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        (self.delay_ms > 0).then(|| Duration::from_millis(self.delay_ms))
    }

    /// Time of recorded point `index`: `start + index * interval`, with the
    /// last point pinned to the end time.
    pub fn sample_time(&self, index: u64) -> f64 {
        let t = self.start_time + index as f64 * self.output_interval;
        if t >= self.end_time - 1e-9 * self.output_interval {
            self.end_time
        } else {
            t
        }
    }

    /// Number of points a completed run records.
    pub fn sample_count(&self) -> u64 {
        let mut n = 1;
        while self.sample_time(n - 1) < self.end_time {
            n += 1;
        }
        n
    }

    pub fn progress_at(&self, t: f64) -> f64 {
        ((t - self.start_time) / (self.end_time - self.start_time)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RunConfiguration::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_ranges() {
        let c = RunConfiguration {
            end_time: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(SimError::InvalidConfiguration { .. })
        ));

        let c = RunConfiguration {
            output_interval: 0.0,
            ..Default::default()
        };
        assert!(c.validate().is_err());

        let c = RunConfiguration {
            tolerances: Tolerances { abs: 0.0, rel: 1e-6 },
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn sample_grid_has_no_drift() {
        let c = RunConfiguration {
            end_time: 1.0,
            output_interval: 0.1,
            ..Default::default()
        };
        assert_eq!(c.sample_time(0), 0.0);
        assert_eq!(c.sample_time(7), 0.7000000000000001);
        assert_eq!(c.sample_time(10), 1.0);
        assert_eq!(c.sample_count(), 11);

        let c = RunConfiguration {
            end_time: 1.0,
            output_interval: 0.3,
            ..Default::default()
        };
        // 0, 0.3, 0.6, 0.9, 1.0
        assert_eq!(c.sample_count(), 5);
    }

    #[test]
    fn loads_from_yaml() {
        let c: RunConfiguration =
            serde_yaml::from_str("end_time: 5.0\nsolver: bdf\noutput_interval: 0.5\n").unwrap();
        assert_eq!(c.solver, SolverKind::Bdf);
        assert_eq!(c.end_time, 5.0);
        assert_eq!(c.step, 1e-3);
    }
}
