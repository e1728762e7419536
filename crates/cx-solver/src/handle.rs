//! One interface over every integration strategy.

use std::sync::Arc;

use cx_compiler::{CompiledRoutineSet, NumericDomainError};
use tracing::{debug, info};

use crate::bdf::Bdf;
use crate::config::{SolverConfig, SolverKind};
use crate::dense;
use crate::error::{SolverError, SolverResult};
use crate::explicit::{AdaptiveHeunEuler, FixedMethod, FixedStep};
use crate::steady::SteadyState;
use crate::system::{OdeSystem, SolverPoint};

/// How a call to [`SolverHandle::step`] ended.
///
/// `RejectedRetrying` is only used inside the integrators; `step` never
/// returns it.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Accepted,
    RejectedRetrying,
    DomainError(NumericDomainError),
    Diverged(String),
}

impl StepOutcome {
    pub fn from_error(e: SolverError) -> Self {
        match e {
            SolverError::Domain(d) => StepOutcome::DomainError(d),
            other => StepOutcome::Diverged(other.to_string()),
        }
    }

    /// Whether the run cannot continue after this outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepOutcome::DomainError(_) | StepOutcome::Diverged(_))
    }

    /// The error a terminal outcome stands for.
    pub fn into_error(self) -> Option<SolverError> {
        match self {
            StepOutcome::DomainError(d) => Some(SolverError::Domain(d)),
            StepOutcome::Diverged(what) => Some(SolverError::Diverged { what }),
            _ => None,
        }
    }
}

impl From<SolverError> for StepOutcome {
    fn from(e: SolverError) -> Self {
        StepOutcome::from_error(e)
    }
}

/// Result of one solver step.
///
/// On a terminal outcome the values are those of the last accepted point.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub time: f64,
    pub state: Vec<f64>,
    pub algebraic: Vec<f64>,
    pub rates: Vec<f64>,
    pub outcome: StepOutcome,
}

/// An initialised solver bound to one compiled model and parameter set.
pub enum SolverHandle {
    Fixed(FixedStep),
    Adaptive(AdaptiveHeunEuler),
    Bdf(Bdf),
    Steady(SteadyState),
}

impl SolverHandle {
    /// Build a solver at `(t0, states)`.
    ///
    /// Algebraic values consistent with the initial states are solved for
    /// first, starting from `algebraic_guess`; failing that returns the
    /// underlying error and no handle. `stiff` resolves [`SolverKind::Auto`].
    pub fn initialize(
        routines: Arc<CompiledRoutineSet>,
        constants: Vec<f64>,
        t0: f64,
        states: Vec<f64>,
        algebraic_guess: Vec<f64>,
        config: &SolverConfig,
        stiff: bool,
    ) -> SolverResult<Self> {
        config.validate()?;
        if states.len() != routines.state_count() {
            return Err(SolverError::InvalidConfig {
                what: format!(
                    "expected {} states, got {}",
                    routines.state_count(),
                    states.len()
                ),
            });
        }
        let kind = config.kind.resolve(stiff);
        let mut system = OdeSystem::new(
            routines,
            constants,
            algebraic_guess.clone(),
            config.newton.clone(),
            config.tolerances,
        )?;

        let handle = match kind {
            SolverKind::Steady => {
                let placeholder = SolverPoint {
                    t: t0,
                    y: states.clone(),
                    z: algebraic_guess.clone(),
                    f: vec![0.0; states.len()],
                };
                let mut steady = SteadyState::new(system, placeholder, config.step);
                let point = steady.solve_at(t0, &states, &algebraic_guess)?;
                steady.reset(point);
                SolverHandle::Steady(steady)
            }
            SolverKind::Bdf => {
                let point = system.point(t0, states)?;
                SolverHandle::Bdf(Bdf::new(system, point, config))
            }
            SolverKind::AdaptiveHeunEuler => {
                let point = system.point(t0, states)?;
                SolverHandle::Adaptive(AdaptiveHeunEuler::new(system, point, config))
            }
            fixed => {
                let method = FixedMethod::from_kind(fixed).ok_or_else(|| {
                    SolverError::InvalidConfig {
                        what: format!("{fixed:?} is not a fixed-step method"),
                    }
                })?;
                let point = system.point(t0, states)?;
                SolverHandle::Fixed(FixedStep::new(method, system, config.step, point))
            }
        };

        info!(solver = ?kind, t0, "Solver initialised");
        Ok(handle)
    }

    /// The concrete strategy this handle runs.
    pub fn kind(&self) -> &'static str {
        match self {
            SolverHandle::Fixed(_) => "fixed_step",
            SolverHandle::Adaptive(_) => "heun_euler",
            SolverHandle::Bdf(_) => "bdf",
            SolverHandle::Steady(_) => "steady",
        }
    }

    /// Current solution point.
    pub fn point(&self) -> &SolverPoint {
        match self {
            SolverHandle::Fixed(s) => &s.point,
            SolverHandle::Adaptive(s) => &s.point,
            SolverHandle::Bdf(s) => &s.point,
            SolverHandle::Steady(s) => &s.point,
        }
    }

    fn system_mut(&mut self) -> &mut OdeSystem {
        match self {
            SolverHandle::Fixed(s) => &mut s.system,
            SolverHandle::Adaptive(s) => &mut s.system,
            SolverHandle::Bdf(s) => &mut s.system,
            SolverHandle::Steady(s) => &mut s.system,
        }
    }

    fn system(&self) -> &OdeSystem {
        match self {
            SolverHandle::Fixed(s) => &s.system,
            SolverHandle::Adaptive(s) => &s.system,
            SolverHandle::Bdf(s) => &s.system,
            SolverHandle::Steady(s) => &s.system,
        }
    }

    pub fn constants(&self) -> &[f64] {
        self.system().constants()
    }

    pub fn rhs_evaluations(&self) -> u64 {
        self.system().rhs_evaluations()
    }

    /// States and algebraic values at `t` between two accepted points.
    ///
    /// States use cubic Hermite interpolation, except for the steady solver
    /// whose points carry no meaningful rates.
    pub fn interpolate(&self, a: &SolverPoint, b: &SolverPoint, t: f64) -> (Vec<f64>, Vec<f64>) {
        let y = match self {
            SolverHandle::Steady(_) => dense::linear(a.t, &a.y, b.t, &b.y, t),
            _ => dense::hermite(a, b, t),
        };
        let z = dense::linear(a.t, &a.z, b.t, &b.z, t);
        (y, z)
    }

    /// Whether stepping can continue after a pause without rebuilding
    /// internal memory.
    pub fn supports_warm_continuation(&self) -> bool {
        !matches!(self, SolverHandle::Steady(_))
    }

    /// Advance by one internal step, never past `t_stop`.
    ///
    /// Rejected attempts are retried internally; the returned outcome is
    /// `Accepted` or terminal.
    pub fn step(&mut self, t_stop: f64) -> StepResult {
        let outcome = match self {
            SolverHandle::Fixed(s) => s.step(t_stop),
            SolverHandle::Adaptive(s) => s.step(t_stop),
            SolverHandle::Bdf(s) => s.step(t_stop),
            SolverHandle::Steady(s) => s.step(t_stop),
        };
        let outcome = match outcome {
            // Integrators exhaust their own retries before this point.
            StepOutcome::RejectedRetrying => {
                StepOutcome::Diverged("step rejected without a terminal cause".to_string())
            }
            other => other,
        };
        let p = self.point();
        StepResult {
            time: p.t,
            state: p.y.clone(),
            algebraic: p.z.clone(),
            rates: p.f.clone(),
            outcome,
        }
    }

    /// Restart from `(t, states)`, discarding step history.
    pub fn reset(&mut self, t: f64, states: Vec<f64>) -> SolverResult<()> {
        debug!(t, solver = self.kind(), "Solver reset");
        match self {
            SolverHandle::Steady(s) => {
                let z = s.point.z.clone();
                let point = s.solve_at(t, &states, &z)?;
                s.reset(point);
            }
            SolverHandle::Fixed(s) => {
                let point = s.system.point(t, states)?;
                s.reset(point);
            }
            SolverHandle::Adaptive(s) => {
                let point = s.system.point(t, states)?;
                s.reset(point);
            }
            SolverHandle::Bdf(s) => {
                let point = s.system.point(t, states)?;
                s.reset(point);
            }
        }
        Ok(())
    }

    /// Swap in new parameter values, keeping step history.
    ///
    /// The current point's rates and algebraic values are re-evaluated and
    /// any cached Jacobian is dropped.
    pub fn set_constants(&mut self, constants: Vec<f64>) -> SolverResult<()> {
        self.system_mut().set_constants(constants)?;
        match self {
            SolverHandle::Fixed(s) => {
                let y = s.point.y.clone();
                s.point = s.system.point(s.point.t, y)?;
            }
            SolverHandle::Adaptive(s) => {
                let y = s.point.y.clone();
                s.point = s.system.point(s.point.t, y)?;
            }
            SolverHandle::Bdf(s) => {
                let y = s.point.y.clone();
                s.point = s.system.point(s.point.t, y)?;
                s.invalidate_jacobian();
            }
            SolverHandle::Steady(_) => {}
        }
        Ok(())
    }
}
