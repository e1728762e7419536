//! Expression trees for rate and residual equations.
//!
//! Variables are referenced by name. Name resolution, operator support and
//! function arity are checked by the compiler, not here, so an `Expr` can
//! hold references that a given model cannot satisfy.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// Comparison and logical operators yield 0.0 or 1.0.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

/// Expression tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Literal number.
    Num(f64),
    /// The variable of integration.
    Time,
    /// Named model variable (state, algebraic, constant or input).
    Var(String),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Named function call, e.g. `exp`, `pow`, `min`.
    Call {
        func: String,
        args: Vec<Expr>,
    },
    /// Piecewise: `then` where `cond != 0`, else `otherwise`.
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    pub fn num(v: f64) -> Self {
        Expr::Num(v)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn time() -> Self {
        Expr::Time
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: func.into(),
            args,
        }
    }

    pub fn unary(op: UnaryOp, arg: Expr) -> Self {
        Expr::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn if_then_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn pow(self, exponent: Expr) -> Self {
        Expr::binary(BinaryOp::Pow, self, exponent)
    }

    pub fn lt(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Lt, self, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Gt, self, rhs)
    }

    pub fn exp(self) -> Self {
        Expr::call("exp", vec![self])
    }

    pub fn ln(self) -> Self {
        Expr::call("ln", vec![self])
    }

    pub fn sin(self) -> Self {
        Expr::call("sin", vec![self])
    }

    pub fn cos(self) -> Self {
        Expr::call("cos", vec![self])
    }

    pub fn sqrt(self) -> Self {
        Expr::call("sqrt", vec![self])
    }

    /// Visit every variable name referenced by this expression.
    pub fn for_each_var<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Expr::Num(_) | Expr::Time => {}
            Expr::Var(name) => f(name),
            Expr::Unary { arg, .. } => arg.for_each_var(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_var(f);
                rhs.for_each_var(f);
            }
            Expr::Call { args, .. } => {
                for a in args {
                    a.for_each_var(f);
                }
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                cond.for_each_var(f);
                then.for_each_var(f);
                otherwise.for_each_var(f);
            }
        }
    }

    /// Whether `name` appears anywhere in this expression.
    pub fn references(&self, name: &str) -> bool {
        let mut found = false;
        self.for_each_var(&mut |v| found |= v == name);
        found
    }

    /// Total number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        match self {
            Expr::Num(_) | Expr::Time | Expr::Var(_) => 1,
            Expr::Unary { arg, .. } => 1 + arg.node_count(),
            Expr::Binary { lhs, rhs, .. } => 1 + lhs.node_count() + rhs.node_count(),
            Expr::Call { args, .. } => 1 + args.iter().map(Expr::node_count).sum::<usize>(),
            Expr::If {
                cond,
                then,
                otherwise,
            } => 1 + cond.node_count() + then.node_count() + otherwise.node_count(),
        }
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Num(v)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::Var(name.to_string())
    }
}

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self, Expr::Num(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, Expr::Num(self), rhs)
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Sub);
impl_binary_operator!(Mul, mul, BinaryOp::Mul);
impl_binary_operator!(Div, div, BinaryOp::Div);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_build_trees() {
        let e = -Expr::var("k") * Expr::var("y") + 1.0;
        match &e {
            Expr::Binary {
                op: BinaryOp::Add,
                lhs,
                rhs,
            } => {
                assert!(matches!(**rhs, Expr::Num(v) if v == 1.0));
                assert!(matches!(**lhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
        assert_eq!(e.node_count(), 6);
    }

    #[test]
    fn variable_visit_finds_all_names() {
        let e = Expr::if_then_else(
            Expr::time().gt(Expr::num(1.0)),
            Expr::var("a").exp(),
            Expr::call("max", vec![Expr::var("b"), Expr::var("a")]),
        );
        let mut names = Vec::new();
        e.for_each_var(&mut |n| names.push(n.to_string()));
        assert_eq!(names, vec!["a", "b", "a"]);
        assert!(e.references("b"));
        assert!(!e.references("c"));
    }

    #[test]
    fn serde_shape_is_externally_tagged() {
        let e = Expr::var("y") * -1.0;
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(
            json,
            r#"{"binary":{"op":"mul","lhs":{"var":"y"},"rhs":{"num":-1.0}}}"#
        );
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
