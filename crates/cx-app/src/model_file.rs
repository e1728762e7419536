//! YAML model files.
//!
//! ```yaml
//! name: decay
//! components:
//!   - name: cell
//!     constants:
//!       - { name: k, value: 1.0, unit: 1/s }
//!     states:
//!       - { name: y, value: 1.0, rate: "-k * y" }
//! ```

use std::fs;
use std::path::Path;

use cx_model::{EquationModel, ModelBuilder, ModelType, Units};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::expression::parse_expr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub name: String,
    #[serde(default)]
    pub stiff: bool,
    #[serde(default)]
    pub components: Vec<ComponentDef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentDef {
    pub name: String,
    pub constants: Vec<VariableDef>,
    pub inputs: Vec<VariableDef>,
    pub states: Vec<StateDef>,
    /// Algebraic variables; `value` is the initial guess.
    pub algebraic: Vec<VariableDef>,
    /// Constraints, each read as `expr = 0`.
    pub residuals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    #[serde(flatten)]
    pub var: VariableDef,
    pub rate: String,
}

fn default_visible() -> bool {
    true
}

/// Counts shown by `validate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub name: String,
    pub model_type: ModelType,
    pub state_count: usize,
    pub algebraic_count: usize,
    pub parameter_count: usize,
    pub fingerprint: String,
}

impl ModelSummary {
    pub fn of(model: &EquationModel) -> Self {
        Self {
            name: model.name().to_string(),
            model_type: model.model_type(),
            state_count: model.state_count(),
            algebraic_count: model.algebraic_count(),
            parameter_count: model.parameter_count(),
            fingerprint: model.fingerprint().to_string(),
        }
    }
}

impl ModelFile {
    pub fn from_yaml_str(src: &str) -> AppResult<Self> {
        Ok(serde_yaml::from_str(src)?)
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let src = fs::read_to_string(path).map_err(|source| AppError::ModelFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&src)
    }

    pub fn to_yaml_string(&self) -> AppResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse every expression and build the model.
    pub fn to_model(&self) -> AppResult<EquationModel> {
        let mut b = ModelBuilder::new(self.name.clone());
        b.stiff(self.stiff);

        for component in &self.components {
            b.component(component.name.clone());
            for c in &component.constants {
                let id = b.add_constant(c.name.clone(), c.value);
                decorate(&mut b, id, c)?;
            }
            for input in &component.inputs {
                let id = b.add_input(input.name.clone(), input.value);
                decorate(&mut b, id, input)?;
            }
            for s in &component.states {
                let id = b.add_state(s.var.name.clone(), s.var.value, parse_expr(&s.rate)?);
                decorate(&mut b, id, &s.var)?;
            }
            for a in &component.algebraic {
                let id = b.add_algebraic(a.name.clone(), a.value);
                decorate(&mut b, id, a)?;
            }
            for r in &component.residuals {
                b.add_residual(parse_expr(r)?);
            }
        }
        Ok(b.build()?)
    }
}

fn decorate(b: &mut ModelBuilder, id: cx_core::VarId, def: &VariableDef) -> AppResult<()> {
    if def.unit.is_some() || def.scale.is_some() {
        let label = def.unit.clone().unwrap_or_else(|| "dimensionless".to_string());
        b.set_units(id, Units::new(label, def.scale.unwrap_or(1.0)))?;
    }
    if !def.visible {
        b.set_visible(id, false)?;
    }
    Ok(())
}

/// Load and build the model at `path`.
pub fn load_model(path: &Path) -> AppResult<EquationModel> {
    ModelFile::load(path)?.to_model()
}
