//! Lowering of expression trees into register programs.

use std::collections::HashMap;

use cx_model::{BinaryOp, EquationModel, Expr, UnaryOp, VarKind};

use crate::error::{CompileError, CompileResult};
use crate::function::{BinaryOpcode, Callee, UnaryOpcode, resolve_call};
use crate::program::{ConstBits, Instr, Program, Reg};

fn opcode(op: BinaryOp) -> BinaryOpcode {
    match op {
        BinaryOp::Add => BinaryOpcode::Add,
        BinaryOp::Sub => BinaryOpcode::Sub,
        BinaryOp::Mul => BinaryOpcode::Mul,
        BinaryOp::Div => BinaryOpcode::Div,
        BinaryOp::Pow => BinaryOpcode::Pow,
        BinaryOp::Lt => BinaryOpcode::Lt,
        BinaryOp::Le => BinaryOpcode::Le,
        BinaryOp::Gt => BinaryOpcode::Gt,
        BinaryOp::Ge => BinaryOpcode::Ge,
        BinaryOp::Eq => BinaryOpcode::Eq,
        BinaryOp::Ne => BinaryOpcode::Ne,
        BinaryOp::And => BinaryOpcode::And,
        BinaryOp::Or => BinaryOpcode::Or,
    }
}

/// Lowers the expressions of one routine into a shared register program.
///
/// Identical subexpressions across all outputs of the routine share one
/// register, and operations on literal operands are folded at compile time.
pub(crate) struct Lowerer<'m> {
    model: &'m EquationModel,
    routine: &'static str,
    instrs: Vec<Instr>,
    seen: HashMap<Instr, Reg>,
}

impl<'m> Lowerer<'m> {
    pub(crate) fn new(model: &'m EquationModel, routine: &'static str) -> Self {
        Self {
            model,
            routine,
            instrs: Vec::new(),
            seen: HashMap::new(),
        }
    }

    pub(crate) fn lower_all<'e>(
        mut self,
        exprs: impl IntoIterator<Item = &'e Expr>,
    ) -> CompileResult<Program> {
        let mut outputs = Vec::new();
        for (equation, expr) in exprs.into_iter().enumerate() {
            outputs.push(self.lower(expr, equation)?);
        }
        Ok(Program::new(self.instrs, outputs).eliminate_dead())
    }

    fn constant(&self, r: Reg) -> Option<f64> {
        match self.instrs[r as usize] {
            Instr::Const(c) => Some(c.get()),
            _ => None,
        }
    }

    fn push(&mut self, instr: Instr) -> Reg {
        if let Some(&r) = self.seen.get(&instr) {
            return r;
        }
        let r = self.instrs.len() as Reg;
        self.instrs.push(instr);
        self.seen.insert(instr, r);
        r
    }

    fn push_const(&mut self, v: f64) -> Reg {
        self.push(Instr::Const(ConstBits::new(v)))
    }

    fn unary(&mut self, op: UnaryOpcode, a: Reg) -> Reg {
        if let Some(x) = self.constant(a) {
            if let Ok(v) = op.apply(x) {
                if v.is_finite() {
                    return self.push_const(v);
                }
            }
        }
        self.push(Instr::Unary(op, a))
    }

    fn binary(&mut self, op: BinaryOpcode, a: Reg, b: Reg) -> Reg {
        let (ca, cb) = (self.constant(a), self.constant(b));
        if let (Some(x), Some(y)) = (ca, cb) {
            // Failing folds stay in the program so the error surfaces at
            // call time.
            if let Ok(v) = op.apply(x, y) {
                if v.is_finite() {
                    return self.push_const(v);
                }
            }
        }

        match (op, ca, cb) {
            (BinaryOpcode::Add, Some(z), _) if z == 0.0 => return b,
            (BinaryOpcode::Add | BinaryOpcode::Sub, _, Some(z)) if z == 0.0 => return a,
            (BinaryOpcode::Mul, Some(one), _) if one == 1.0 => return b,
            (BinaryOpcode::Mul | BinaryOpcode::Div, _, Some(one)) if one == 1.0 => return a,
            (BinaryOpcode::Pow, _, Some(one)) if one == 1.0 => return a,
            _ => {}
        }

        let (a, b) = if op.is_commutative() && b < a {
            (b, a)
        } else {
            (a, b)
        };
        self.push(Instr::Binary(op, a, b))
    }

    fn select(&mut self, c: Reg, a: Reg, b: Reg) -> Reg {
        if a == b {
            return a;
        }
        match self.constant(c) {
            Some(v) if v != 0.0 => a,
            Some(_) => b,
            None => self.push(Instr::Select(c, a, b)),
        }
    }

    fn variable(&mut self, name: &str, equation: usize) -> CompileResult<Reg> {
        let var = self
            .model
            .variable_by_name(name)
            .ok_or_else(|| CompileError::UnknownVariable {
                name: name.to_string(),
                routine: self.routine,
                equation,
            })?;
        let slot = var.slot as u32;
        let instr = match var.kind {
            VarKind::State => Instr::State(slot),
            VarKind::Algebraic => Instr::Algebraic(slot),
            VarKind::Constant | VarKind::ExternalInput => Instr::Param(slot),
        };
        Ok(self.push(instr))
    }

    fn lower(&mut self, expr: &Expr, equation: usize) -> CompileResult<Reg> {
        let r = match expr {
            Expr::Num(v) => self.push_const(*v),
            Expr::Time => self.push(Instr::Time),
            Expr::Var(name) => self.variable(name, equation)?,
            Expr::Unary { op, arg } => {
                let a = self.lower(arg, equation)?;
                let op = match op {
                    UnaryOp::Neg => UnaryOpcode::Neg,
                    UnaryOp::Not => UnaryOpcode::Not,
                };
                self.unary(op, a)
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.lower(lhs, equation)?;
                let b = self.lower(rhs, equation)?;
                self.binary(opcode(*op), a, b)
            }
            Expr::Call { func, args } => match resolve_call(func, args.len())? {
                Callee::Unary(f) => {
                    let a = self.lower(&args[0], equation)?;
                    self.unary(UnaryOpcode::Call(f), a)
                }
                Callee::Binary(op) => {
                    let a = self.lower(&args[0], equation)?;
                    let b = self.lower(&args[1], equation)?;
                    self.binary(op, a, b)
                }
            },
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let c = self.lower(cond, equation)?;
                let a = self.lower(then, equation)?;
                let b = self.lower(otherwise, equation)?;
                self.select(c, a, b)
            }
        };
        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cx_model::ModelBuilder;

    fn model() -> EquationModel {
        let mut b = ModelBuilder::new("m");
        b.add_constant("k", 2.0);
        b.add_state("y", 1.0, -Expr::var("k") * Expr::var("y"));
        b.build().unwrap()
    }

    #[test]
    fn constants_fold() {
        let m = model();
        let e = (Expr::num(2.0) + 3.0) * Expr::num(4.0);
        let p = Lowerer::new(&m, "derivative").lower_all([&e]).unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p.instructions()[0], Instr::Const(ConstBits::new(20.0)));
    }

    #[test]
    fn common_subexpressions_share_registers() {
        let m = model();
        let ky = Expr::var("k") * Expr::var("y");
        let a = ky.clone().exp() + ky.clone().exp();
        let b = Expr::var("y") * Expr::var("k");
        let p = Lowerer::new(&m, "derivative").lower_all([&a, &b]).unwrap();
        // k, y, k*y, exp, add
        assert_eq!(p.len(), 5);
        // Commuted product is the same register.
        let mul = p
            .instructions()
            .iter()
            .position(|i| matches!(i, Instr::Binary(BinaryOpcode::Mul, _, _)))
            .unwrap();
        assert_eq!(p.outputs()[1] as usize, mul);
    }

    #[test]
    fn division_by_literal_zero_is_not_folded() {
        let m = model();
        let e = Expr::num(1.0) / 0.0;
        let p = Lowerer::new(&m, "derivative").lower_all([&e]).unwrap();
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn unknown_variable_fails() {
        let m = model();
        let e = Expr::var("q");
        let err = Lowerer::new(&m, "derivative").lower_all([&e]).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownVariable {
                name: "q".to_string(),
                routine: "derivative",
                equation: 0
            }
        );
    }
}
