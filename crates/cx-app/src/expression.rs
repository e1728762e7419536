//! Infix expression syntax used in model files.
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := cmp ("&&" cmp)*
//! cmp     := sum (("<" | "<=" | ">" | ">=" | "==" | "!=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := ("-" | "!") unary | power
//! power   := primary ("^" unary)?
//! primary := number | "time" | ident | ident "(" args ")" | "(" expr ")"
//!          | "if" expr "then" expr "else" expr
//! ```
//!
//! `-x^2` parses as `-(x^2)`. Function names are checked by the compiler,
//! not here.

use cx_model::{BinaryOp, Expr, UnaryOp};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

const OPERATORS: [&str; 16] = [
    "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "^", "<", ">", "!", "=", "%",
];

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit))
        {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("bad number '{text}'"))?;
            tokens.push(Token::Num(value));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| format!("unexpected character '{c}'"))?;
            if matches!(*op, "=" | "%") {
                return Err(format!("unsupported operator '{op}'"));
            }
            tokens.push(Token::Op(op));
            i += op.len();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        if let Some(Token::Op(op)) = self.peek() {
            if ops.contains(op) {
                let op = *op;
                self.pos += 1;
                return Some(op);
            }
        }
        None
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if let Some(Token::Ident(name)) = self.peek() {
            if name == keyword {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!("expected {expected:?}, found {tok:?}")),
            None => Err(format!("expected {expected:?}, found end of input")),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            lhs = Expr::binary(BinaryOp::Or, lhs, self.and()?);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.comparison()?;
        while self.eat_op(&["&&"]).is_some() {
            lhs = Expr::binary(BinaryOp::And, lhs, self.comparison()?);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.sum()?;
        let op = match self.eat_op(&["<", "<=", ">", ">=", "==", "!="]) {
            Some("<") => BinaryOp::Lt,
            Some("<=") => BinaryOp::Le,
            Some(">") => BinaryOp::Gt,
            Some(">=") => BinaryOp::Ge,
            Some("==") => BinaryOp::Eq,
            Some(_) => BinaryOp::Ne,
            None => return Ok(lhs),
        };
        Ok(Expr::binary(op, lhs, self.sum()?))
    }

    fn sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.product()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            lhs = Expr::binary(op, lhs, self.product()?);
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/"]) {
            let op = if op == "*" { BinaryOp::Mul } else { BinaryOp::Div };
            lhs = Expr::binary(op, lhs, self.unary()?);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        match self.eat_op(&["-", "!"]) {
            Some("-") => Ok(Expr::unary(UnaryOp::Neg, self.unary()?)),
            Some(_) => Ok(Expr::unary(UnaryOp::Not, self.unary()?)),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, String> {
        let base = self.primary()?;
        if self.eat_op(&["^"]).is_some() {
            return Ok(base.pow(self.unary()?));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::num(v)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "if" => {
                let cond = self.expr()?;
                if !self.eat_keyword("then") {
                    return Err("expected 'then'".to_string());
                }
                let then = self.expr()?;
                if !self.eat_keyword("else") {
                    return Err("expected 'else'".to_string());
                }
                let otherwise = self.expr()?;
                Ok(Expr::if_then_else(cond, then, otherwise))
            }
            Some(Token::Ident(name)) if name == "time" => Ok(Expr::time()),
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::var(name));
                }
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() == Some(&Token::RParen) {
                    self.pos += 1;
                    return Ok(Expr::call(name, args));
                }
                loop {
                    args.push(self.expr()?);
                    match self.next() {
                        Some(Token::Comma) => {}
                        Some(Token::RParen) => break,
                        other => {
                            return Err(format!(
                                "expected ',' or ')' in call to {name}, found {other:?}"
                            ));
                        }
                    }
                }
                Ok(Expr::call(name, args))
            }
            Some(tok) => Err(format!("unexpected {tok:?}")),
            None => Err("unexpected end of input".to_string()),
        }
    }
}

/// Parse an infix expression string.
pub fn parse_expr(src: &str) -> AppResult<Expr> {
    let fail = |message: String| AppError::Expression {
        expr: src.to_string(),
        message,
    };
    let tokens = tokenize(src).map_err(fail)?;
    if tokens.is_empty() {
        return Err(fail("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr().map_err(fail)?;
    if let Some(tok) = parser.peek() {
        return Err(fail(format!("trailing input at {tok:?}")));
    }
    Ok(expr)
}
