//! Immutable equation models for the cellex execution engine.
//!
//! An [`EquationModel`] lists state, algebraic, constant and external-input
//! variables together with the expression trees that define state
//! derivatives and algebraic residuals. Models are assembled either from
//! already-parsed parts ([`EquationModel::new`]) or incrementally with a
//! [`ModelBuilder`].

pub mod builder;
pub mod error;
pub mod expr;
pub mod fingerprint;
pub mod model;
pub mod variable;

mod validate;

pub use builder::ModelBuilder;
pub use error::{ModelError, ModelResult};
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use fingerprint::ModelFingerprint;
pub use model::{EquationModel, ModelParts, ModelType};
pub use variable::{Units, VarKind, Variable, VariableDecl};
