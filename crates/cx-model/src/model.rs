//! The immutable equation model.

use std::collections::HashMap;

use cx_core::VarId;

use crate::error::{ModelError, ModelResult};
use crate::expr::Expr;
use crate::fingerprint::ModelFingerprint;
use crate::validate;
use crate::variable::{VarKind, Variable, VariableDecl};

/// ODE models have no algebraic constraints; DAE models do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Ode,
    Dae,
}

/// Already-parsed model description, as produced by a model reader.
#[derive(Debug, Clone, Default)]
pub struct ModelParts {
    pub name: String,
    pub variables: Vec<VariableDecl>,
    /// One rate expression per state, in state declaration order.
    pub rates: Vec<Expr>,
    /// One residual expression per algebraic variable.
    pub residuals: Vec<Expr>,
    pub stiff: bool,
}

/// Equation model.
///
/// Variable layout:
/// - state vector: states in declaration order
/// - algebraic vector: algebraic variables in declaration order
/// - parameter array: constants in declaration order, then external inputs
///
/// Only the parameter array may change after construction.
#[derive(Debug, Clone)]
pub struct EquationModel {
    name: String,
    variables: Vec<Variable>,
    states: Vec<VarId>,
    algebraic: Vec<VarId>,
    parameters: Vec<VarId>,
    constant_count: usize,
    rates: Vec<Expr>,
    residuals: Vec<Expr>,
    parameter_values: Vec<f64>,
    stiff: bool,
    by_name: HashMap<String, VarId>,
    fingerprint: ModelFingerprint,
}

impl EquationModel {
    /// Build a model from parsed parts.
    ///
    /// Fails if the rate or residual counts do not match the declared state
    /// and algebraic counts, if names collide, or if any initial value is
    /// non-finite.
    pub fn new(parts: ModelParts) -> ModelResult<Self> {
        validate::validate_declarations(&parts.variables)?;
        validate::validate_arity(&parts.variables, &parts.rates, &parts.residuals)?;

        let mut variables = Vec::with_capacity(parts.variables.len());
        let mut states = Vec::new();
        let mut algebraic = Vec::new();
        let mut constants = Vec::new();
        let mut inputs = Vec::new();

        for (i, decl) in parts.variables.into_iter().enumerate() {
            let id = VarId::from_index(i as u32);
            let slot = match decl.kind {
                VarKind::State => {
                    states.push(id);
                    states.len() - 1
                }
                VarKind::Algebraic => {
                    algebraic.push(id);
                    algebraic.len() - 1
                }
                VarKind::Constant => {
                    constants.push(id);
                    constants.len() - 1
                }
                VarKind::ExternalInput => {
                    inputs.push(id);
                    inputs.len() - 1
                }
            };
            variables.push(Variable {
                id,
                name: decl.name,
                component: decl.component,
                kind: decl.kind,
                units: decl.units,
                initial: decl.initial,
                visible: decl.visible,
                slot,
            });
        }

        // Inputs sit after constants in the parameter array.
        let constant_count = constants.len();
        for &id in &inputs {
            variables[id.slot()].slot += constant_count;
        }
        let mut parameters = constants;
        parameters.extend(inputs);

        let parameter_values = parameters
            .iter()
            .map(|id| variables[id.slot()].initial)
            .collect();

        let by_name = variables
            .iter()
            .map(|v| (v.name.clone(), v.id))
            .collect();

        let fingerprint = ModelFingerprint::compute(&variables, &parts.rates, &parts.residuals);

        Ok(Self {
            name: parts.name,
            variables,
            states,
            algebraic,
            parameters,
            constant_count,
            rates: parts.rates,
            residuals: parts.residuals,
            parameter_values,
            stiff: parts.stiff,
            by_name,
            fingerprint,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fingerprint(&self) -> ModelFingerprint {
        self.fingerprint
    }

    pub fn model_type(&self) -> ModelType {
        if self.algebraic.is_empty() {
            ModelType::Ode
        } else {
            ModelType::Dae
        }
    }

    /// Algebraic constraints need the nonlinear solver for consistent
    /// initial conditions.
    pub fn needs_nla_solver(&self) -> bool {
        !self.algebraic.is_empty()
    }

    pub fn is_stiff(&self) -> bool {
        self.stiff
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn algebraic_count(&self) -> usize {
        self.algebraic.len()
    }

    /// Length of the parameter array (constants plus inputs).
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn constant_count(&self) -> usize {
        self.constant_count
    }

    pub fn input_count(&self) -> usize {
        self.parameters.len() - self.constant_count
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.slot())
    }

    pub fn variable_by_name(&self, name: &str) -> Option<&Variable> {
        self.by_name.get(name).and_then(|id| self.variable(*id))
    }

    pub fn states(&self) -> impl Iterator<Item = &Variable> {
        self.states.iter().map(|id| &self.variables[id.slot()])
    }

    pub fn algebraic(&self) -> impl Iterator<Item = &Variable> {
        self.algebraic.iter().map(|id| &self.variables[id.slot()])
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Variable> {
        self.parameters.iter().map(|id| &self.variables[id.slot()])
    }

    /// Variables whose trajectories are recorded, in declaration order.
    pub fn visible_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| v.visible)
    }

    pub fn rates(&self) -> &[Expr] {
        &self.rates
    }

    pub fn residuals(&self) -> &[Expr] {
        &self.residuals
    }

    pub fn initial_states(&self) -> Vec<f64> {
        self.states().map(|v| v.initial).collect()
    }

    pub fn initial_algebraic(&self) -> Vec<f64> {
        self.algebraic().map(|v| v.initial).collect()
    }

    /// Current parameter values (constants then inputs).
    pub fn constants(&self) -> &[f64] {
        &self.parameter_values
    }

    pub fn constant(&self, index: usize) -> ModelResult<f64> {
        self.parameter_values
            .get(index)
            .copied()
            .ok_or(ModelError::IndexOob {
                what: "parameter",
                index,
                len: self.parameter_values.len(),
            })
    }

    /// Overwrite one parameter value. Expressions are untouched, so compiled
    /// routines stay valid.
    pub fn set_constant(&mut self, index: usize, value: f64) -> ModelResult<()> {
        let len = self.parameter_values.len();
        let slot = self
            .parameter_values
            .get_mut(index)
            .ok_or(ModelError::IndexOob {
                what: "parameter",
                index,
                len,
            })?;
        *slot = cx_core::ensure_finite(value, "parameter value")?;
        Ok(())
    }

    /// Look up a parameter slot by variable name.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.variable_by_name(name)
            .filter(|v| v.kind.is_parameter())
            .map(|v| v.slot)
    }
}
