//! Symbolic differentiation of expression trees.
//!
//! Produces the partial derivative of an expression with respect to one named
//! variable. Products and sums with literal zeros and ones are simplified on
//! construction; constant folding and CSE in the lowering pass handle the
//! rest.

use cx_model::{BinaryOp, Expr, UnaryOp};

use crate::error::CompileResult;
use crate::function::{BinaryOpcode, Callee, Func, resolve_call};

fn is_num(e: &Expr, v: f64) -> bool {
    matches!(e, Expr::Num(x) if *x == v)
}

fn both_num(a: &Expr, b: &Expr) -> Option<(f64, f64)> {
    match (a, b) {
        (Expr::Num(x), Expr::Num(y)) => Some((*x, *y)),
        _ => None,
    }
}

fn add(a: Expr, b: Expr) -> Expr {
    if let Some((x, y)) = both_num(&a, &b) {
        return Expr::num(x + y);
    }
    if is_num(&a, 0.0) {
        return b;
    }
    if is_num(&b, 0.0) {
        return a;
    }
    a + b
}

fn sub(a: Expr, b: Expr) -> Expr {
    if let Some((x, y)) = both_num(&a, &b) {
        return Expr::num(x - y);
    }
    if is_num(&b, 0.0) {
        return a;
    }
    if is_num(&a, 0.0) {
        return neg(b);
    }
    a - b
}

fn mul(a: Expr, b: Expr) -> Expr {
    if let Some((x, y)) = both_num(&a, &b) {
        return Expr::num(x * y);
    }
    if is_num(&a, 0.0) || is_num(&b, 0.0) {
        return Expr::num(0.0);
    }
    if is_num(&a, 1.0) {
        return b;
    }
    if is_num(&b, 1.0) {
        return a;
    }
    a * b
}

fn div(a: Expr, b: Expr) -> Expr {
    if is_num(&a, 0.0) {
        return Expr::num(0.0);
    }
    if is_num(&b, 1.0) {
        return a;
    }
    a / b
}

fn neg(a: Expr) -> Expr {
    match a {
        Expr::Num(x) => Expr::num(-x),
        other => -other,
    }
}

fn call1(f: Func, arg: Expr) -> Expr {
    Expr::call(f.name(), vec![arg])
}

/// `d expr / d wrt`.
///
/// Unknown function names are reported the same way the lowering pass
/// reports them.
pub(crate) fn derivative(expr: &Expr, wrt: &str) -> CompileResult<Expr> {
    // Subtrees that never mention `wrt` are constant here.
    if !expr.references(wrt) {
        return Ok(Expr::num(0.0));
    }

    let d = match expr {
        Expr::Num(_) | Expr::Time => Expr::num(0.0),
        Expr::Var(name) => Expr::num(if name == wrt { 1.0 } else { 0.0 }),
        Expr::Unary { op, arg } => match op {
            UnaryOp::Neg => neg(derivative(arg, wrt)?),
            UnaryOp::Not => Expr::num(0.0),
        },
        Expr::Binary { op, lhs, rhs } => binary(*op, lhs, rhs, wrt)?,
        Expr::Call { func, args } => match resolve_call(func, args.len())? {
            Callee::Unary(f) => unary_call(f, &args[0], wrt)?,
            Callee::Binary(op) => {
                let (a, b) = (&args[0], &args[1]);
                match op {
                    BinaryOpcode::Pow => binary(BinaryOp::Pow, a, b, wrt)?,
                    BinaryOpcode::Min => Expr::if_then_else(
                        Expr::binary(BinaryOp::Le, a.clone(), b.clone()),
                        derivative(a, wrt)?,
                        derivative(b, wrt)?,
                    ),
                    _ => Expr::if_then_else(
                        Expr::binary(BinaryOp::Ge, a.clone(), b.clone()),
                        derivative(a, wrt)?,
                        derivative(b, wrt)?,
                    ),
                }
            }
        },
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            let dt = derivative(then, wrt)?;
            let de = derivative(otherwise, wrt)?;
            if dt == de {
                dt
            } else {
                Expr::if_then_else((**cond).clone(), dt, de)
            }
        }
    };
    Ok(d)
}

fn binary(op: BinaryOp, u: &Expr, v: &Expr, wrt: &str) -> CompileResult<Expr> {
    let d = match op {
        BinaryOp::Add => add(derivative(u, wrt)?, derivative(v, wrt)?),
        BinaryOp::Sub => sub(derivative(u, wrt)?, derivative(v, wrt)?),
        BinaryOp::Mul => add(
            mul(derivative(u, wrt)?, v.clone()),
            mul(u.clone(), derivative(v, wrt)?),
        ),
        BinaryOp::Div => {
            // (u'v - uv') / v^2
            let num = sub(
                mul(derivative(u, wrt)?, v.clone()),
                mul(u.clone(), derivative(v, wrt)?),
            );
            div(num, mul(v.clone(), v.clone()))
        }
        BinaryOp::Pow => {
            if !v.references(wrt) {
                // n * u^(n-1) * u'
                let n_minus_1 = sub(v.clone(), Expr::num(1.0));
                mul(
                    mul(v.clone(), u.clone().pow(n_minus_1)),
                    derivative(u, wrt)?,
                )
            } else if !u.references(wrt) {
                // u^v * ln(u) * v'
                mul(
                    mul(u.clone().pow(v.clone()), call1(Func::Ln, u.clone())),
                    derivative(v, wrt)?,
                )
            } else {
                // u^v * (v' ln(u) + v u'/u)
                let inner = add(
                    mul(derivative(v, wrt)?, call1(Func::Ln, u.clone())),
                    div(mul(v.clone(), derivative(u, wrt)?), u.clone()),
                );
                mul(u.clone().pow(v.clone()), inner)
            }
        }
        _ => Expr::num(0.0),
    };
    Ok(d)
}

fn unary_call(f: Func, u: &Expr, wrt: &str) -> CompileResult<Expr> {
    let du = derivative(u, wrt)?;
    let u = u.clone();
    let outer = match f {
        Func::Sin => call1(Func::Cos, u),
        Func::Cos => neg(call1(Func::Sin, u)),
        Func::Tan => div(Expr::num(1.0), call1(Func::Cos, u).pow(Expr::num(2.0))),
        Func::Asin => div(
            Expr::num(1.0),
            call1(Func::Sqrt, Expr::num(1.0) - u.clone() * u),
        ),
        Func::Acos => neg(div(
            Expr::num(1.0),
            call1(Func::Sqrt, Expr::num(1.0) - u.clone() * u),
        )),
        Func::Atan => div(Expr::num(1.0), Expr::num(1.0) + u.clone() * u),
        Func::Sinh => call1(Func::Cosh, u),
        Func::Cosh => call1(Func::Sinh, u),
        Func::Tanh => Expr::num(1.0) - call1(Func::Tanh, u).pow(Expr::num(2.0)),
        Func::Exp => call1(Func::Exp, u),
        Func::Ln => div(Expr::num(1.0), u),
        Func::Log10 => div(Expr::num(1.0), u * std::f64::consts::LN_10),
        Func::Sqrt => div(Expr::num(1.0), call1(Func::Sqrt, u) * 2.0),
        Func::Abs => Expr::if_then_else(u.lt(Expr::num(0.0)), Expr::num(-1.0), Expr::num(1.0)),
        // Piecewise constant.
        Func::Floor | Func::Ceil => Expr::num(0.0),
    };
    Ok(mul(outer, du))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_subtree_is_zero() {
        let e = Expr::var("k") * Expr::var("z");
        assert_eq!(derivative(&e, "y").unwrap(), Expr::num(0.0));
    }

    #[test]
    fn product_rule_simplifies() {
        // d(-k*y)/dy = -k
        let e = -Expr::var("k") * Expr::var("y");
        assert_eq!(derivative(&e, "y").unwrap(), -Expr::var("k"));
    }

    #[test]
    fn power_with_constant_exponent() {
        let e = Expr::var("y").pow(Expr::num(3.0));
        let d = derivative(&e, "y").unwrap();
        assert_eq!(
            d,
            Expr::num(3.0) * Expr::var("y").pow(Expr::num(2.0))
        );
    }

    #[test]
    fn unknown_function_is_reported() {
        let e = Expr::call("nope", vec![Expr::var("y")]);
        assert!(derivative(&e, "y").is_err());
    }
}
