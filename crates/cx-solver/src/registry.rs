//! Named solver catalogue.
//!
//! Drivers list and select solvers by name or by KiSAO identifier.

use serde::Serialize;

use crate::config::SolverKind;
use crate::error::{SolverError, SolverResult};

/// A tunable solver setting and its default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverProperty {
    pub id: &'static str,
    pub description: &'static str,
    pub default: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverDescriptor {
    pub name: &'static str,
    pub kind: SolverKind,
    pub kisao: &'static str,
    pub description: &'static str,
    pub properties: Vec<SolverProperty>,
}

#[derive(Debug, Clone)]
pub struct SolverRegistry {
    solvers: Vec<SolverDescriptor>,
}

fn step_property() -> SolverProperty {
    SolverProperty {
        id: "step",
        description: "Step size (initial step for adaptive methods)",
        default: 1e-3,
    }
}

fn tolerance_properties() -> Vec<SolverProperty> {
    vec![
        step_property(),
        SolverProperty {
            id: "abs_tol",
            description: "Absolute tolerance",
            default: 1e-7,
        },
        SolverProperty {
            id: "rel_tol",
            description: "Relative tolerance",
            default: 1e-7,
        },
    ]
}

impl SolverRegistry {
    /// All solvers shipped with this crate.
    pub fn builtin() -> Self {
        let mut bdf_props = tolerance_properties();
        bdf_props.push(SolverProperty {
            id: "max_order",
            description: "Highest BDF order",
            default: 5.0,
        });

        let solvers = vec![
            SolverDescriptor {
                name: "euler",
                kind: SolverKind::Euler,
                kisao: "KISAO:0000030",
                description: "Forward Euler, fixed step",
                properties: vec![step_property()],
            },
            SolverDescriptor {
                name: "rk2",
                kind: SolverKind::Rk2,
                kisao: "KISAO:0000381",
                description: "Second-order Runge-Kutta (midpoint), fixed step",
                properties: vec![step_property()],
            },
            SolverDescriptor {
                name: "rk4",
                kind: SolverKind::Rk4,
                kisao: "KISAO:0000032",
                description: "Classic fourth-order Runge-Kutta, fixed step",
                properties: vec![step_property()],
            },
            SolverDescriptor {
                name: "heun_euler",
                kind: SolverKind::AdaptiveHeunEuler,
                kisao: "KISAO:0000301",
                description: "Adaptive Heun-Euler embedded pair",
                properties: tolerance_properties(),
            },
            SolverDescriptor {
                name: "bdf",
                kind: SolverKind::Bdf,
                kisao: "KISAO:0000288",
                description: "Variable-order BDF for stiff systems",
                properties: bdf_props,
            },
            SolverDescriptor {
                name: "steady",
                kind: SolverKind::Steady,
                kisao: "KISAO:0000282",
                description: "Damped Newton steady-state solve",
                properties: vec![step_property()],
            },
        ];
        Self { solvers }
    }

    pub fn solvers(&self) -> &[SolverDescriptor] {
        &self.solvers
    }

    /// Look up by name (case-insensitive) or KiSAO id.
    pub fn find(&self, name: &str) -> Option<&SolverDescriptor> {
        self.solvers
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name) || s.kisao == name)
    }

    /// Resolve a name to a solver kind. `auto` is accepted as well.
    pub fn kind_for(&self, name: &str) -> SolverResult<SolverKind> {
        if name.eq_ignore_ascii_case("auto") {
            return Ok(SolverKind::Auto);
        }
        self.find(name)
            .map(|s| s.kind)
            .ok_or_else(|| SolverError::UnknownSolver {
                name: name.to_string(),
            })
    }
}

impl Default for SolverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_kisao() {
        let reg = SolverRegistry::builtin();
        assert_eq!(reg.kind_for("BDF").unwrap(), SolverKind::Bdf);
        assert_eq!(reg.kind_for("KISAO:0000032").unwrap(), SolverKind::Rk4);
        assert_eq!(reg.kind_for("auto").unwrap(), SolverKind::Auto);
    }

    #[test]
    fn unknown_solver() {
        let reg = SolverRegistry::builtin();
        assert!(matches!(
            reg.kind_for("cvode"),
            Err(SolverError::UnknownSolver { .. })
        ));
    }

    #[test]
    fn names_are_unique() {
        let reg = SolverRegistry::builtin();
        let mut names: Vec<_> = reg.solvers().iter().map(|s| s.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), reg.solvers().len());
    }
}
