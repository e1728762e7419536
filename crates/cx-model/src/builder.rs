//! Incremental model builder.

use cx_core::VarId;

use crate::error::{ModelError, ModelResult};
use crate::expr::Expr;
use crate::model::{EquationModel, ModelParts};
use crate::variable::{Units, VarKind, VariableDecl};

/// Builder for constructing a model incrementally.
///
/// Use the `add_*` methods to declare variables, then call `build()` to
/// validate and freeze them into an immutable [`EquationModel`]. Variable ids
/// follow declaration order.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    name: String,
    component: String,
    variables: Vec<VariableDecl>,
    rates: Vec<Expr>,
    residuals: Vec<Expr>,
    stiff: bool,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Component name attached to variables declared from now on.
    pub fn component(&mut self, name: impl Into<String>) -> &mut Self {
        self.component = name.into();
        self
    }

    /// Hint that the model is stiff.
    pub fn stiff(&mut self, stiff: bool) -> &mut Self {
        self.stiff = stiff;
        self
    }

    fn push(&mut self, name: impl Into<String>, kind: VarKind, initial: f64) -> VarId {
        let id = VarId::from_index(self.variables.len() as u32);
        self.variables
            .push(VariableDecl::new(name, kind, initial).in_component(self.component.clone()));
        id
    }

    /// Add a state variable with its initial value and rate equation.
    pub fn add_state(&mut self, name: impl Into<String>, initial: f64, rate: Expr) -> VarId {
        self.rates.push(rate);
        self.push(name, VarKind::State, initial)
    }

    /// Add an algebraic variable with an initial guess. Its constraint is
    /// added separately with [`ModelBuilder::add_residual`].
    pub fn add_algebraic(&mut self, name: impl Into<String>, guess: f64) -> VarId {
        self.push(name, VarKind::Algebraic, guess)
    }

    /// Add a constraint `residual = 0`.
    pub fn add_residual(&mut self, residual: Expr) -> &mut Self {
        self.residuals.push(residual);
        self
    }

    pub fn add_constant(&mut self, name: impl Into<String>, value: f64) -> VarId {
        self.push(name, VarKind::Constant, value)
    }

    pub fn add_input(&mut self, name: impl Into<String>, value: f64) -> VarId {
        self.push(name, VarKind::ExternalInput, value)
    }

    pub fn set_units(&mut self, id: VarId, units: Units) -> ModelResult<&mut Self> {
        self.decl_mut(id)?.units = units;
        Ok(self)
    }

    pub fn set_visible(&mut self, id: VarId, visible: bool) -> ModelResult<&mut Self> {
        self.decl_mut(id)?.visible = visible;
        Ok(self)
    }

    /// Id of a previously declared variable.
    pub fn lookup(&self, name: &str) -> ModelResult<VarId> {
        self.variables
            .iter()
            .position(|d| d.name == name)
            .map(|i| VarId::from_index(i as u32))
            .ok_or_else(|| ModelError::UnknownVariable {
                name: name.to_string(),
            })
    }

    fn decl_mut(&mut self, id: VarId) -> ModelResult<&mut VariableDecl> {
        let len = self.variables.len();
        self.variables
            .get_mut(id.slot())
            .ok_or(ModelError::IndexOob {
                what: "variable",
                index: id.slot(),
                len,
            })
    }

    /// Validate and freeze.
    pub fn build(self) -> ModelResult<EquationModel> {
        EquationModel::new(ModelParts {
            name: self.name,
            variables: self.variables,
            rates: self.rates,
            residuals: self.residuals,
            stiff: self.stiff,
        })
    }
}
