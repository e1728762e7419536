//! Model variables and their metadata.

use cx_core::{Ratio, VarId, ratio_value, unitless};
use serde::{Deserialize, Serialize};

/// Role of a variable in the equation system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    /// Integrated over time; has a rate equation.
    State,
    /// Determined by residual constraints.
    Algebraic,
    /// Fixed parameter; overwritable between runs.
    Constant,
    /// Parameter supplied by the driver at run time.
    ExternalInput,
}

impl VarKind {
    /// Constants and inputs share the parameter array.
    pub fn is_parameter(self) -> bool {
        matches!(self, VarKind::Constant | VarKind::ExternalInput)
    }
}

/// Unit metadata. The engine treats the label as opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct Units {
    pub label: String,
    pub scale: Ratio,
}

impl Default for Units {
    fn default() -> Self {
        Self::dimensionless()
    }
}

impl Units {
    pub fn dimensionless() -> Self {
        Self {
            label: "dimensionless".to_string(),
            scale: unitless(1.0),
        }
    }

    pub fn new(label: impl Into<String>, scale: f64) -> Self {
        Self {
            label: label.into(),
            scale: unitless(scale),
        }
    }

    /// Convert an engine value into this unit's scaled value.
    pub fn apply(&self, value: f64) -> f64 {
        value * ratio_value(self.scale)
    }
}

/// Declaration of a variable before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub component: String,
    pub kind: VarKind,
    pub units: Units,
    /// Initial value for states, initial guess for algebraic variables,
    /// value for constants and inputs.
    pub initial: f64,
    pub visible: bool,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, kind: VarKind, initial: f64) -> Self {
        Self {
            name: name.into(),
            component: String::new(),
            kind,
            units: Units::default(),
            initial,
            visible: true,
        }
    }

    pub fn in_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// A variable inside a built model.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub component: String,
    pub kind: VarKind,
    pub units: Units,
    pub initial: f64,
    pub visible: bool,
    /// Position inside the array for this kind (state vector, algebraic
    /// vector or parameter array).
    pub slot: usize,
}

impl Variable {
    /// `component.name`, or just `name` for top-level variables.
    pub fn qualified_name(&self) -> String {
        if self.component.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.component, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_apply_scale() {
        let ms = Units::new("ms", 1e3);
        assert_eq!(ms.apply(0.5), 500.0);
        assert_eq!(Units::dimensionless().apply(2.0), 2.0);
    }

    #[test]
    fn qualified_name_uses_component() {
        let v = Variable {
            id: VarId::from_index(0),
            name: "V".to_string(),
            component: "membrane".to_string(),
            kind: VarKind::State,
            units: Units::default(),
            initial: -75.0,
            visible: true,
            slot: 0,
        };
        assert_eq!(v.qualified_name(), "membrane.V");
        assert!(VarKind::ExternalInput.is_parameter());
        assert!(!VarKind::Algebraic.is_parameter());
    }
}
