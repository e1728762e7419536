//! Linear register programs.
//!
//! A program is a list of single-assignment instructions; instruction `i`
//! writes register `i`. Operands always refer to earlier registers, so one
//! forward pass evaluates everything.

use std::fmt;

use crate::error::NumericDomainError;
use crate::function::{BinaryOpcode, UnaryOpcode};

pub type Reg = u32;

/// Bit pattern of an `f64` literal, so instructions can be hashed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstBits(u64);

impl ConstBits {
    pub fn new(v: f64) -> Self {
        // One key for both zeros.
        let v = if v == 0.0 { 0.0 } else { v };
        Self(v.to_bits())
    }

    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl fmt::Debug for ConstBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instr {
    Const(ConstBits),
    Time,
    State(u32),
    Algebraic(u32),
    Param(u32),
    Unary(UnaryOpcode, Reg),
    Binary(BinaryOpcode, Reg, Reg),
    /// `cond != 0 ? a : b`
    Select(Reg, Reg, Reg),
}

impl Instr {
    pub fn operands(&self) -> impl Iterator<Item = Reg> {
        let ops: [Option<Reg>; 3] = match *self {
            Instr::Const(_)
            | Instr::Time
            | Instr::State(_)
            | Instr::Algebraic(_)
            | Instr::Param(_) => [None, None, None],
            Instr::Unary(_, a) => [Some(a), None, None],
            Instr::Binary(_, a, b) => [Some(a), Some(b), None],
            Instr::Select(c, a, b) => [Some(c), Some(a), Some(b)],
        };
        ops.into_iter().flatten()
    }

    fn remap(self, map: &[Reg]) -> Self {
        let m = |r: Reg| map[r as usize];
        match self {
            Instr::Unary(op, a) => Instr::Unary(op, m(a)),
            Instr::Binary(op, a, b) => Instr::Binary(op, m(a), m(b)),
            Instr::Select(c, a, b) => Instr::Select(m(c), m(a), m(b)),
            other => other,
        }
    }
}

/// Evaluation inputs for one routine call.
#[derive(Debug, Clone, Copy)]
pub struct Inputs<'a> {
    pub t: f64,
    pub states: &'a [f64],
    pub algebraic: &'a [f64],
    pub constants: &'a [f64],
}

/// Register program with its output registers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    instrs: Vec<Instr>,
    outputs: Vec<Reg>,
}

impl Program {
    pub(crate) fn new(instrs: Vec<Instr>, outputs: Vec<Reg>) -> Self {
        Self { instrs, outputs }
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn outputs(&self) -> &[Reg] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Drop instructions no output depends on and renumber the rest.
    pub(crate) fn eliminate_dead(self) -> Self {
        let mut live = vec![false; self.instrs.len()];
        for &r in &self.outputs {
            live[r as usize] = true;
        }
        for i in (0..self.instrs.len()).rev() {
            if live[i] {
                for op in self.instrs[i].operands() {
                    live[op as usize] = true;
                }
            }
        }

        let mut map = vec![0; self.instrs.len()];
        let mut instrs = Vec::with_capacity(live.iter().filter(|l| **l).count());
        for (i, instr) in self.instrs.into_iter().enumerate() {
            if live[i] {
                map[i] = instrs.len() as Reg;
                instrs.push(instr.remap(&map));
            }
        }
        let outputs = self.outputs.iter().map(|&r| map[r as usize]).collect();
        Self { instrs, outputs }
    }

    /// Evaluate every instruction and write the outputs.
    ///
    /// Domain violations are tracked per register instead of aborting
    /// immediately: a branch of a `Select` that is not taken may fail without
    /// affecting the result. An output that depends on a failed register
    /// reports that failure.
    pub fn run(
        &self,
        routine: &'static str,
        inputs: &Inputs<'_>,
        out: &mut [f64],
    ) -> Result<(), NumericDomainError> {
        if out.len() != self.outputs.len() {
            return Err(NumericDomainError::InputLength {
                what: "output buffer",
                expected: self.outputs.len(),
                actual: out.len(),
            });
        }

        let n = self.instrs.len();
        let mut values = Vec::with_capacity(n);
        let mut faults: Vec<Option<NumericDomainError>> = Vec::with_capacity(n);

        for instr in &self.instrs {
            let (value, fault) = match *instr {
                Instr::Const(c) => (c.get(), None),
                Instr::Time => (inputs.t, None),
                Instr::State(i) => (inputs.states[i as usize], None),
                Instr::Algebraic(i) => (inputs.algebraic[i as usize], None),
                Instr::Param(i) => (inputs.constants[i as usize], None),
                Instr::Unary(op, a) => {
                    let a = a as usize;
                    match faults[a] {
                        Some(e) => (f64::NAN, Some(e)),
                        None => split(op.apply(values[a])),
                    }
                }
                Instr::Binary(op, a, b) => {
                    let (a, b) = (a as usize, b as usize);
                    match faults[a].or(faults[b]) {
                        Some(e) => (f64::NAN, Some(e)),
                        None => split(op.apply(values[a], values[b])),
                    }
                }
                Instr::Select(c, a, b) => {
                    let c = c as usize;
                    match faults[c] {
                        Some(e) => (f64::NAN, Some(e)),
                        None => {
                            let pick = (if values[c] != 0.0 { a } else { b }) as usize;
                            (values[pick], faults[pick])
                        }
                    }
                }
            };
            values.push(value);
            faults.push(fault);
        }

        for (index, (&r, slot)) in self.outputs.iter().zip(out.iter_mut()).enumerate() {
            let r = r as usize;
            if let Some(e) = faults[r] {
                return Err(e);
            }
            let value = values[r];
            if !value.is_finite() {
                return Err(NumericDomainError::NonFinite {
                    routine,
                    index,
                    value,
                });
            }
            *slot = value;
        }
        Ok(())
    }
}

fn split(r: Result<f64, NumericDomainError>) -> (f64, Option<NumericDomainError>) {
    match r {
        Ok(v) => (v, None),
        Err(e) => (f64::NAN, Some(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_INPUTS: Inputs<'static> = Inputs {
        t: 0.0,
        states: &[],
        algebraic: &[],
        constants: &[],
    };

    #[test]
    fn untaken_branch_fault_is_ignored() {
        // out = 1 ? 2 : (1 / 0)
        let program = Program::new(
            vec![
                Instr::Const(ConstBits::new(1.0)),
                Instr::Const(ConstBits::new(2.0)),
                Instr::Const(ConstBits::new(0.0)),
                Instr::Binary(BinaryOpcode::Div, 0, 2),
                Instr::Select(0, 1, 3),
            ],
            vec![4],
        );
        let mut out = [0.0];
        program.run("test", &NO_INPUTS, &mut out).unwrap();
        assert_eq!(out[0], 2.0);
    }

    #[test]
    fn taken_branch_fault_is_reported() {
        let program = Program::new(
            vec![
                Instr::Const(ConstBits::new(1.0)),
                Instr::Const(ConstBits::new(0.0)),
                Instr::Binary(BinaryOpcode::Div, 0, 1),
            ],
            vec![2],
        );
        let mut out = [0.0];
        assert_eq!(
            program.run("test", &NO_INPUTS, &mut out),
            Err(NumericDomainError::DivisionByZero)
        );
    }

    #[test]
    fn dead_code_is_removed() {
        let program = Program::new(
            vec![
                Instr::Time,
                Instr::Const(ConstBits::new(3.0)),
                Instr::Binary(BinaryOpcode::Mul, 0, 0),
            ],
            vec![2],
        )
        .eliminate_dead();
        assert_eq!(program.len(), 2);
        assert_eq!(program.outputs(), &[1]);

        let inputs = Inputs { t: 3.0, ..NO_INPUTS };
        let mut out = [0.0];
        program.run("test", &inputs, &mut out).unwrap();
        assert_eq!(out[0], 9.0);
    }
}
