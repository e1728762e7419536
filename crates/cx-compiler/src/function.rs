//! Built-in function table and primitive operation semantics.
//!
//! Every primitive either returns a value or a [`NumericDomainError`]. The
//! same functions are used for constant folding and at run time, so a folded
//! constant always matches what the routine would have computed.

use crate::error::{CompileError, CompileResult, NumericDomainError};

/// Single-argument built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Floor,
    Ceil,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Asin => "asin",
            Func::Acos => "acos",
            Func::Atan => "atan",
            Func::Sinh => "sinh",
            Func::Cosh => "cosh",
            Func::Tanh => "tanh",
            Func::Exp => "exp",
            Func::Ln => "ln",
            Func::Log10 => "log10",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
            Func::Floor => "floor",
            Func::Ceil => "ceil",
        }
    }

    pub fn apply(self, x: f64) -> Result<f64, NumericDomainError> {
        let v = match self {
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Asin | Func::Acos if x.abs() > 1.0 => {
                return Err(NumericDomainError::OutOfDomain {
                    func: self.name(),
                    value: x,
                });
            }
            Func::Asin => x.asin(),
            Func::Acos => x.acos(),
            Func::Atan => x.atan(),
            Func::Sinh => x.sinh(),
            Func::Cosh => x.cosh(),
            Func::Tanh => x.tanh(),
            Func::Exp => x.exp(),
            Func::Ln | Func::Log10 if x <= 0.0 => {
                return Err(NumericDomainError::LogOfNonPositive { value: x });
            }
            Func::Ln => x.ln(),
            Func::Log10 => x.log10(),
            Func::Sqrt if x < 0.0 => return Err(NumericDomainError::SqrtOfNegative { value: x }),
            Func::Sqrt => x.sqrt(),
            Func::Abs => x.abs(),
            Func::Floor => x.floor(),
            Func::Ceil => x.ceil(),
        };
        Ok(v)
    }
}

/// Two-operand primitives. Comparisons and logic yield 0.0 or 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOpcode {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

impl BinaryOpcode {
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOpcode::Add
                | BinaryOpcode::Mul
                | BinaryOpcode::Min
                | BinaryOpcode::Max
                | BinaryOpcode::Eq
                | BinaryOpcode::Ne
                | BinaryOpcode::And
                | BinaryOpcode::Or
        )
    }

    pub fn apply(self, a: f64, b: f64) -> Result<f64, NumericDomainError> {
        let v = match self {
            BinaryOpcode::Add => a + b,
            BinaryOpcode::Sub => a - b,
            BinaryOpcode::Mul => a * b,
            BinaryOpcode::Div => {
                if b == 0.0 {
                    return Err(NumericDomainError::DivisionByZero);
                }
                a / b
            }
            BinaryOpcode::Pow => {
                if a == 0.0 && b < 0.0 {
                    return Err(NumericDomainError::DivisionByZero);
                }
                if a < 0.0 && b.fract() != 0.0 {
                    return Err(NumericDomainError::OutOfDomain {
                        func: "pow",
                        value: a,
                    });
                }
                a.powf(b)
            }
            BinaryOpcode::Min => a.min(b),
            BinaryOpcode::Max => a.max(b),
            BinaryOpcode::Lt => truth(a < b),
            BinaryOpcode::Le => truth(a <= b),
            BinaryOpcode::Gt => truth(a > b),
            BinaryOpcode::Ge => truth(a >= b),
            BinaryOpcode::Eq => truth(a == b),
            BinaryOpcode::Ne => truth(a != b),
            BinaryOpcode::And => truth(a != 0.0 && b != 0.0),
            BinaryOpcode::Or => truth(a != 0.0 || b != 0.0),
        };
        Ok(v)
    }
}

/// One-operand primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOpcode {
    Neg,
    Not,
    Call(Func),
}

impl UnaryOpcode {
    pub fn apply(self, x: f64) -> Result<f64, NumericDomainError> {
        match self {
            UnaryOpcode::Neg => Ok(-x),
            UnaryOpcode::Not => Ok(truth(x == 0.0)),
            UnaryOpcode::Call(f) => f.apply(x),
        }
    }
}

/// Resolved call target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Callee {
    Unary(Func),
    Binary(BinaryOpcode),
}

/// Operators some model formats know that this engine does not evaluate.
const UNSUPPORTED: &[&str] = &["factorial", "rem", "quotient", "diff", "int", "gcd", "lcm"];

/// Look up a call by name and check its arity.
pub(crate) fn resolve_call(name: &str, arg_count: usize) -> CompileResult<Callee> {
    let (callee, arity) = match name {
        "sin" => (Callee::Unary(Func::Sin), 1),
        "cos" => (Callee::Unary(Func::Cos), 1),
        "tan" => (Callee::Unary(Func::Tan), 1),
        "asin" => (Callee::Unary(Func::Asin), 1),
        "acos" => (Callee::Unary(Func::Acos), 1),
        "atan" => (Callee::Unary(Func::Atan), 1),
        "sinh" => (Callee::Unary(Func::Sinh), 1),
        "cosh" => (Callee::Unary(Func::Cosh), 1),
        "tanh" => (Callee::Unary(Func::Tanh), 1),
        "exp" => (Callee::Unary(Func::Exp), 1),
        "ln" => (Callee::Unary(Func::Ln), 1),
        "log10" => (Callee::Unary(Func::Log10), 1),
        "sqrt" => (Callee::Unary(Func::Sqrt), 1),
        "abs" => (Callee::Unary(Func::Abs), 1),
        "floor" => (Callee::Unary(Func::Floor), 1),
        "ceil" => (Callee::Unary(Func::Ceil), 1),
        "pow" => (Callee::Binary(BinaryOpcode::Pow), 2),
        "min" => (Callee::Binary(BinaryOpcode::Min), 2),
        "max" => (Callee::Binary(BinaryOpcode::Max), 2),
        other if UNSUPPORTED.contains(&other) => {
            return Err(CompileError::UnsupportedOperator {
                name: other.to_string(),
            });
        }
        other => {
            return Err(CompileError::UnknownFunction {
                name: other.to_string(),
            });
        }
    };

    if arg_count != arity {
        return Err(CompileError::ArityMismatch {
            func: name.to_string(),
            expected: arity,
            actual: arg_count,
        });
    }
    Ok(callee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors() {
        assert_eq!(
            BinaryOpcode::Div.apply(1.0, 0.0),
            Err(NumericDomainError::DivisionByZero)
        );
        assert!(matches!(
            Func::Ln.apply(-1.0),
            Err(NumericDomainError::LogOfNonPositive { .. })
        ));
        assert!(matches!(
            Func::Sqrt.apply(-4.0),
            Err(NumericDomainError::SqrtOfNegative { .. })
        ));
        assert!(BinaryOpcode::Pow.apply(-8.0, 0.5).is_err());
        assert_eq!(BinaryOpcode::Pow.apply(-2.0, 3.0), Ok(-8.0));
    }

    #[test]
    fn call_resolution() {
        assert_eq!(resolve_call("exp", 1), Ok(Callee::Unary(Func::Exp)));
        assert_eq!(
            resolve_call("max", 2),
            Ok(Callee::Binary(BinaryOpcode::Max))
        );
        assert!(matches!(
            resolve_call("exp", 2),
            Err(CompileError::ArityMismatch { expected: 1, actual: 2, .. })
        ));
        assert!(matches!(
            resolve_call("factorial", 1),
            Err(CompileError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            resolve_call("frobnicate", 1),
            Err(CompileError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn logic_is_boolean_valued() {
        assert_eq!(BinaryOpcode::And.apply(2.0, 0.0), Ok(0.0));
        assert_eq!(BinaryOpcode::Or.apply(2.0, 0.0), Ok(1.0));
        assert_eq!(UnaryOpcode::Not.apply(0.0), Ok(1.0));
    }
}
