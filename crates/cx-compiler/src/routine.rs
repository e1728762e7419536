//! Compiled routines and the compile entry point.

use cx_model::{EquationModel, Expr, ModelFingerprint};
use tracing::{debug, info};

use crate::diff::derivative;
use crate::error::{CompileResult, NumericDomainError};
use crate::lower::Lowerer;
use crate::program::{Inputs, Program};

/// Jacobians larger than this many instructions are not compiled; solvers
/// estimate them by finite differences instead.
const MAX_JACOBIAN_INSTRUCTIONS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Derivative,
    Residual,
    Jacobian,
}

impl RoutineKind {
    pub fn name(self) -> &'static str {
        match self {
            RoutineKind::Derivative => "derivative",
            RoutineKind::Residual => "residual",
            RoutineKind::Jacobian => "jacobian",
        }
    }
}

/// One callable entry point.
///
/// Holds no per-call state: every call receives its inputs and output
/// buffer, so one routine can serve many runs at once.
#[derive(Debug, Clone)]
pub struct CompiledRoutine {
    kind: RoutineKind,
    program: Program,
    state_len: usize,
    algebraic_len: usize,
    parameter_len: usize,
}

impl CompiledRoutine {
    pub fn kind(&self) -> RoutineKind {
        self.kind
    }

    pub fn output_len(&self) -> usize {
        self.program.outputs().len()
    }

    pub fn instruction_count(&self) -> usize {
        self.program.len()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Evaluate the routine at `(t, states, algebraic, constants)` into `out`.
    ///
    /// Inputs are never modified. On error `out` may be partially written.
    pub fn call(
        &self,
        t: f64,
        states: &[f64],
        algebraic: &[f64],
        constants: &[f64],
        out: &mut [f64],
    ) -> Result<(), NumericDomainError> {
        check_len("state vector", self.state_len, states.len())?;
        check_len("algebraic vector", self.algebraic_len, algebraic.len())?;
        check_len("constants", self.parameter_len, constants.len())?;
        let inputs = Inputs {
            t,
            states,
            algebraic,
            constants,
        };
        self.program.run(self.kind.name(), &inputs, out)
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), NumericDomainError> {
    if expected == actual {
        Ok(())
    } else {
        Err(NumericDomainError::InputLength {
            what,
            expected,
            actual,
        })
    }
}

/// Compiled entry points for one model.
#[derive(Debug, Clone)]
pub struct CompiledRoutineSet {
    fingerprint: ModelFingerprint,
    pub derivative: CompiledRoutine,
    pub residual: Option<CompiledRoutine>,
    /// Row-major `d rate_i / d state_j`, when available.
    pub jacobian: Option<CompiledRoutine>,
}

impl CompiledRoutineSet {
    pub fn fingerprint(&self) -> ModelFingerprint {
        self.fingerprint
    }

    pub fn state_count(&self) -> usize {
        self.derivative.state_len
    }

    pub fn algebraic_count(&self) -> usize {
        self.derivative.algebraic_len
    }

    pub fn parameter_count(&self) -> usize {
        self.derivative.parameter_len
    }

    /// Whether the state Jacobian was compiled.
    pub fn has_jacobian(&self) -> bool {
        self.jacobian.is_some()
    }
}

/// Compile a model into its routine set.
///
/// Fails fast: the first invalid expression aborts compilation and nothing is
/// returned.
pub fn compile(model: &EquationModel) -> CompileResult<CompiledRoutineSet> {
    let fingerprint = model.fingerprint();
    info!(
        model = model.name(),
        fingerprint = %fingerprint.short(),
        states = model.state_count(),
        algebraic = model.algebraic_count(),
        "Compiling model"
    );

    let routine = |kind: RoutineKind, program: Program| CompiledRoutine {
        kind,
        program,
        state_len: model.state_count(),
        algebraic_len: model.algebraic_count(),
        parameter_len: model.parameter_count(),
    };

    let derivative_program =
        Lowerer::new(model, RoutineKind::Derivative.name()).lower_all(model.rates())?;
    let derivative = routine(RoutineKind::Derivative, derivative_program);

    let residual = if model.algebraic_count() > 0 {
        let program =
            Lowerer::new(model, RoutineKind::Residual.name()).lower_all(model.residuals())?;
        Some(routine(RoutineKind::Residual, program))
    } else {
        None
    };

    let jacobian = compile_jacobian(model)?.map(|p| routine(RoutineKind::Jacobian, p));

    debug!(
        derivative_instructions = derivative.instruction_count(),
        residual_instructions = residual.as_ref().map_or(0, |r| r.instruction_count()),
        jacobian_instructions = jacobian.as_ref().map_or(0, |r| r.instruction_count()),
        "Compiled routines"
    );

    Ok(CompiledRoutineSet {
        fingerprint,
        derivative,
        residual,
        jacobian,
    })
}

/// Symbolic state Jacobian for ODE models.
///
/// DAE models get none: their effective Jacobian depends on the nested
/// algebraic solve, which solvers approximate numerically.
fn compile_jacobian(model: &EquationModel) -> CompileResult<Option<Program>> {
    if model.algebraic_count() > 0 || model.state_count() == 0 {
        return Ok(None);
    }

    let names: Vec<&str> = model.states().map(|v| v.name.as_str()).collect();
    let mut entries: Vec<Expr> = Vec::with_capacity(names.len() * names.len());
    for rate in model.rates() {
        for name in &names {
            entries.push(derivative(rate, name)?);
        }
    }

    let program = Lowerer::new(model, RoutineKind::Jacobian.name()).lower_all(&entries)?;
    if program.len() > MAX_JACOBIAN_INSTRUCTIONS {
        debug!(
            instructions = program.len(),
            "Jacobian too large, using finite differences"
        );
        return Ok(None);
    }
    Ok(Some(program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use cx_model::ModelBuilder;

    #[test]
    fn decay_routines() {
        let mut b = ModelBuilder::new("decay");
        b.add_constant("k", 0.5);
        b.add_state("y", 1.0, -Expr::var("k") * Expr::var("y"));
        let model = b.build().unwrap();

        let set = compile(&model).unwrap();
        assert!(set.residual.is_none());
        assert!(set.has_jacobian());

        let mut out = [0.0];
        set.derivative
            .call(0.0, &[2.0], &[], model.constants(), &mut out)
            .unwrap();
        assert!((out[0] + 1.0).abs() < 1e-12);

        let jac = set.jacobian.as_ref().unwrap();
        jac.call(0.0, &[2.0], &[], model.constants(), &mut out).unwrap();
        assert!((out[0] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn wrong_input_length_is_reported() {
        let mut b = ModelBuilder::new("decay");
        b.add_state("y", 1.0, -Expr::var("y"));
        let set = compile(&b.build().unwrap()).unwrap();
        let mut out = [0.0];
        assert!(matches!(
            set.derivative.call(0.0, &[1.0, 2.0], &[], &[], &mut out),
            Err(NumericDomainError::InputLength { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn bad_residual_fails_whole_compile() {
        let mut b = ModelBuilder::new("dae");
        b.add_state("x", 1.0, -Expr::var("z"));
        b.add_algebraic("z", 0.0);
        b.add_residual(Expr::var("z") - Expr::call("mystery", vec![Expr::var("x")]));
        let err = compile(&b.build().unwrap()).unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction { .. }));
    }
}
