//! Expression engine for selections and weights.
//!
//! Two layers live here:
//!
//! - String-level helpers ([`properties`], [`negated`], [`added`], …) that
//!   inspect and compose expressions without parsing them. Composition wraps
//!   every operand in parentheses, so composed expressions never depend on
//!   operator precedence of their parts.
//! - [`CompiledExpr`], a small recursive-descent compiler evaluating an
//!   expression column-wise over a [`Table`].
//!
//! Supported syntax: arithmetic (`+ - * / // % **`), comparisons
//! (`== != < <= > >=`), boolean operators (`&& || ^ !`) and the functions
//! `abs sqrt log exp pow min max`. Booleans are `1.0`/`0.0`; any value
//! `> 0` is true.

use std::collections::BTreeSet;

use tally_core::{Error, Result};

use crate::table::Table;

// ── String-level helpers ───────────────────────────────────────

/// An identifier occurrence in an expression string.
struct Ident<'a> {
    start: usize,
    end: usize,
    text: &'a str,
    /// Immediately followed (modulo whitespace) by `(`.
    is_call: bool,
}

/// Scan identifiers, skipping numeric literals (so `1e5` yields nothing).
fn scan_identifiers(expr: &str) -> Vec<Ident<'_>> {
    let bytes = expr.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            i = skip_number(bytes, i);
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            out.push(Ident {
                start,
                end: i,
                text: &expr[start..i],
                is_call: bytes.get(j) == Some(&b'('),
            });
        } else {
            i += 1;
        }
    }
    out
}

/// Advance past a numeric literal starting at `i`.
fn skip_number(bytes: &[u8], mut i: usize) -> usize {
    let start = i;
    while i < bytes.len()
        && (bytes[i].is_ascii_digit()
            || bytes[i] == b'.'
            || bytes[i] == b'e'
            || bytes[i] == b'E'
            || ((bytes[i] == b'+' || bytes[i] == b'-')
                && i > start
                && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E')))
    {
        i += 1;
    }
    i
}

/// Column names ("properties") an expression reads.
///
/// Identifiers immediately followed by `(` are function calls and excluded.
pub fn properties(expr: &str) -> BTreeSet<String> {
    scan_identifiers(expr)
        .into_iter()
        .filter(|id| !id.is_call)
        .map(|id| id.text.to_string())
        .collect()
}

/// Translate alternative operator spellings (`~`, `&`, `|`) into engine
/// syntax (`!`, `&&`, `||`). Idempotent.
pub fn normalized(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len() + 8);
    let mut chars = expr.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '~' => out.push('!'),
            '&' | '|' => {
                if chars.peek() == Some(&c) {
                    chars.next();
                }
                out.push(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// `!(expr)`
pub fn negated(expr: &str) -> String {
    format!("!({})", expr)
}

/// Negate every exact occurrence of the variable `name`.
pub fn variable_negated(expr: &str, name: &str) -> String {
    let mut out = String::with_capacity(expr.len() + 8);
    let mut last = 0;
    for id in scan_identifiers(expr) {
        if id.text == name && !id.is_call {
            out.push_str(&expr[last..id.start]);
            out.push_str(&negated(id.text));
            last = id.end;
        }
    }
    out.push_str(&expr[last..]);
    out
}

fn combined<S: AsRef<str>>(exprs: &[S], op: &str) -> String {
    if exprs.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = exprs.iter().map(|e| format!("({})", e.as_ref())).collect();
    format!("({})", parts.join(&format!(" {} ", op)))
}

/// `((a) + (b) + …)`
pub fn added<S: AsRef<str>>(exprs: &[S]) -> String {
    combined(exprs, "+")
}

/// `((a) - (b) - …)`
pub fn subtracted<S: AsRef<str>>(exprs: &[S]) -> String {
    combined(exprs, "-")
}

/// `((a) * (b) * …)`
pub fn multiplied<S: AsRef<str>>(exprs: &[S]) -> String {
    combined(exprs, "*")
}

/// `((a) / (b) / …)`
pub fn divided<S: AsRef<str>>(exprs: &[S]) -> String {
    combined(exprs, "/")
}

/// `((a) // (b) // …)`
pub fn floor_divided<S: AsRef<str>>(exprs: &[S]) -> String {
    combined(exprs, "//")
}

/// `((a) && (b) && …)`
pub fn anded<S: AsRef<str>>(exprs: &[S]) -> String {
    combined(exprs, "&&")
}

/// `((a) || (b) || …)`
pub fn ored<S: AsRef<str>>(exprs: &[S]) -> String {
    combined(exprs, "||")
}

/// `((a) ^ (b) ^ …)`
pub fn xored<S: AsRef<str>>(exprs: &[S]) -> String {
    combined(exprs, "^")
}

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Var(usize), // index into required_columns
    UnaryNeg(Box<Expr>),
    UnaryNot(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}

impl Func {
    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

// ── Compiled expression ────────────────────────────────────────

/// A compiled expression ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    ast: Expr,
    source: String,
    /// Column names referenced by this expression (ordered by first occurrence).
    pub required_columns: Vec<String>,
}

impl CompiledExpr {
    /// Parse and compile an expression string.
    pub fn compile(input: &str) -> Result<Self> {
        let normalized_input = normalized(input);
        let tokens = tokenize(&normalized_input)?;
        if tokens.is_empty() {
            return Err(Error::Expression("empty expression".to_string()));
        }
        let mut parser = Parser::new(&tokens);
        let ast = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(Error::Expression(format!(
                "unexpected token after expression '{}': {:?}",
                input, parser.tokens[parser.pos]
            )));
        }
        let columns = std::mem::take(&mut parser.columns);
        Ok(CompiledExpr { ast, source: input.to_string(), required_columns: columns })
    }

    /// The source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the expression for a single row.
    ///
    /// `values` must have the same length and order as `required_columns`.
    pub fn eval_row(&self, values: &[f64]) -> f64 {
        eval_expr(&self.ast, values)
    }

    /// Evaluate the expression for all rows (column-wise).
    ///
    /// `columns` must have the same length and order as `required_columns`.
    pub fn eval_bulk(&self, columns: &[&[f64]]) -> Vec<f64> {
        if columns.is_empty() {
            // Constant expression: evaluate once
            return vec![eval_expr(&self.ast, &[])];
        }
        let n = columns[0].len();
        let mut row = vec![0.0f64; columns.len()];
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            for (j, col) in columns.iter().enumerate() {
                row[j] = col[i];
            }
            out.push(eval_expr(&self.ast, &row));
        }
        out
    }

    /// Evaluate over every row of a table.
    pub fn eval_table(&self, table: &Table) -> Result<Vec<f64>> {
        let cols: Vec<&[f64]> = self
            .required_columns
            .iter()
            .map(|name| {
                table.column(name).map_err(|_| {
                    Error::Expression(format!(
                        "missing column '{}' for expression '{}'",
                        name, self.source
                    ))
                })
            })
            .collect::<Result<_>>()?;

        if cols.is_empty() {
            let val = self.eval_row(&[]);
            return Ok(vec![val; table.n_rows()]);
        }
        Ok(self.eval_bulk(&cols))
    }
}

// ── Evaluation ─────────────────────────────────────────────────

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn eval_expr(e: &Expr, vals: &[f64]) -> f64 {
    match e {
        Expr::Number(n) => *n,
        Expr::Var(i) => vals[*i],
        Expr::UnaryNeg(a) => -eval_expr(a, vals),
        Expr::UnaryNot(a) => truth(eval_expr(a, vals) <= 0.0),
        Expr::BinOp(op, a, b) => {
            let lhs = eval_expr(a, vals);
            let rhs = eval_expr(b, vals);
            match op {
                BinOp::Add => lhs + rhs,
                BinOp::Sub => lhs - rhs,
                BinOp::Mul => lhs * rhs,
                BinOp::Div => lhs / rhs,
                BinOp::FloorDiv => (lhs / rhs).floor(),
                BinOp::Mod => lhs - rhs * (lhs / rhs).floor(),
                BinOp::Pow => lhs.powf(rhs),
                BinOp::Eq => truth((lhs - rhs).abs() < f64::EPSILON),
                BinOp::Ne => truth((lhs - rhs).abs() >= f64::EPSILON),
                BinOp::Lt => truth(lhs < rhs),
                BinOp::Le => truth(lhs <= rhs),
                BinOp::Gt => truth(lhs > rhs),
                BinOp::Ge => truth(lhs >= rhs),
                BinOp::And => truth(lhs > 0.0 && rhs > 0.0),
                BinOp::Or => truth(lhs > 0.0 || rhs > 0.0),
                BinOp::Xor => truth((lhs > 0.0) != (rhs > 0.0)),
            }
        }
        Expr::Call(f, args) => {
            let a0 = || eval_expr(&args[0], vals);
            let a1 = || eval_expr(&args[1], vals);
            match f {
                Func::Abs => a0().abs(),
                Func::Sqrt => a0().sqrt(),
                Func::Log => a0().ln(),
                Func::Exp => a0().exp(),
                Func::Pow => a0().powf(a1()),
                Func::Min => a0().min(a1()),
                Func::Max => a0().max(a1()),
            }
        }
    }
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Caret,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        if i + 1 < bytes.len() {
            let tok = match &bytes[i..i + 2] {
                b"&&" => Some(Token::And),
                b"||" => Some(Token::Or),
                b"==" => Some(Token::Eq),
                b"!=" => Some(Token::Ne),
                b"<=" => Some(Token::Le),
                b">=" => Some(Token::Ge),
                b"**" => Some(Token::StarStar),
                b"//" => Some(Token::SlashSlash),
                _ => None,
            };
            if let Some(t) = tok {
                tokens.push(t);
                i += 2;
                continue;
            }
        }

        let single = match c {
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'%' => Some(Token::Percent),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            b'<' => Some(Token::Lt),
            b'>' => Some(Token::Gt),
            b'^' => Some(Token::Caret),
            b'!' => Some(Token::Not),
            _ => None,
        };
        if let Some(t) = single {
            tokens.push(t);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            let start = i;
            i = skip_number(bytes, i);
            let s = &input[start..i];
            let n: f64 = s
                .parse()
                .map_err(|_| Error::Expression(format!("invalid number: '{}'", s)))?;
            tokens.push(Token::Num(n));
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(input[start..i].to_string()));
        } else {
            let ch = input[i..].chars().next().unwrap_or('?');
            return Err(Error::Expression(format!("unexpected character: '{}'", ch)));
        }
    }

    Ok(tokens)
}

// ── Parser (recursive descent) ─────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    columns: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0, columns: Vec::new() }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => Err(Error::Expression(format!("expected {:?}, got {:?}", expected, other))),
        }
    }

    fn resolve_var(&mut self, name: &str) -> usize {
        if let Some(i) = self.columns.iter().position(|b| b == name) {
            i
        } else {
            self.columns.push(name.to_string());
            self.columns.len() - 1
        }
    }

    // ── Grammar rules ──────────────────────────────────────────

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_xor()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_xor()?;
            lhs = Expr::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Caret)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(BinOp::Xor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Expr::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Expr::BinOp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Expr::UnaryNeg(Box::new(e)))
            }
            Some(Token::Not) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Expr::UnaryNot(Box::new(e)))
            }
            _ => self.parse_power(),
        }
    }

    /// `atom ** unary`, right-associative and binding tighter than unary minus.
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_atom()?;
        if matches!(self.peek(), Some(Token::StarStar)) {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::BinOp(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance().cloned() {
            Some(Token::Num(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance(); // consume '('
                    let func = match name.as_str() {
                        "abs" => Func::Abs,
                        "sqrt" => Func::Sqrt,
                        "log" => Func::Log,
                        "exp" => Func::Exp,
                        "pow" => Func::Pow,
                        "min" => Func::Min,
                        "max" => Func::Max,
                        _ => {
                            return Err(Error::Expression(format!(
                                "unknown function: '{}'",
                                name
                            )));
                        }
                    };
                    let mut args = vec![self.parse_or()?];
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                    self.expect(&Token::RParen)?;
                    if args.len() != func.arity() {
                        return Err(Error::Expression(format!(
                            "function '{}' takes {} argument(s), got {}",
                            name,
                            func.arity(),
                            args.len()
                        )));
                    }
                    Ok(Expr::Call(func, args))
                } else {
                    let idx = self.resolve_var(&name);
                    Ok(Expr::Var(idx))
                }
            }
            other => Err(Error::Expression(format!(
                "expected number, identifier, or '(', got {:?}",
                other
            ))),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const E1: &str = "x + y > 8";
    const E2: &str = "3 < (z - y)**2";

    #[test]
    fn properties_skip_calls_and_numbers() {
        let p = properties("electron_pt > (x * x)");
        assert_eq!(p, ["electron_pt", "x"].iter().map(|s| s.to_string()).collect());
        let p = properties("sqrt (a) + pow(b, 2) * 1e5 + .5e-3");
        assert_eq!(p, ["a", "b"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn normalization_is_idempotent() {
        assert_eq!(normalized("~x & y | z"), "!x && y || z");
        let once = normalized("~a & b || c && !d");
        assert_eq!(normalized(&once), once);
    }

    #[test]
    fn negation() {
        assert_eq!(negated("x + y > 7"), "!(x + y > 7)");
        assert_eq!(
            variable_negated("particle_is_e && particle_is_el", "particle_is_e"),
            "!(particle_is_e) && particle_is_el"
        );
        assert_eq!(variable_negated("f(x) && f", "f"), "f(x) && !(f)");
    }

    #[test]
    fn composition() {
        assert_eq!(added(&[E1, E2]), "((x + y > 8) + (3 < (z - y)**2))");
        assert_eq!(subtracted(&[E1, E2]), "((x + y > 8) - (3 < (z - y)**2))");
        assert_eq!(multiplied(&[E1, E2]), "((x + y > 8) * (3 < (z - y)**2))");
        assert_eq!(divided(&[E1, E2]), "((x + y > 8) / (3 < (z - y)**2))");
        assert_eq!(floor_divided(&[E1, E2]), "((x + y > 8) // (3 < (z - y)**2))");
        assert_eq!(anded(&[E1, E2]), "((x + y > 8) && (3 < (z - y)**2))");
        assert_eq!(ored(&[E1, E2]), "((x + y > 8) || (3 < (z - y)**2))");
        assert_eq!(xored(&[E1, E2]), "((x + y > 8) ^ (3 < (z - y)**2))");
        assert_eq!(anded(&["a", "b", "c"]), "((a) && (b) && (c))");
    }

    #[test]
    fn composed_expressions_compile() {
        for e in [added(&[E1, E2]), floor_divided(&[E1, E2]), xored(&[E1, E2])] {
            let c = CompiledExpr::compile(&e).unwrap();
            assert_eq!(c.required_columns, vec!["x", "y", "z"]);
        }
    }

    #[test]
    fn simple_arithmetic() {
        let e = CompiledExpr::compile("2 + 3 * 4").unwrap();
        assert!(e.required_columns.is_empty());
        assert!((e.eval_row(&[]) - 14.0).abs() < 1e-10);
    }

    #[test]
    fn power_and_floor_division() {
        let e = CompiledExpr::compile("-2**2 + 7 // 2 + 7 % 3").unwrap();
        assert!((e.eval_row(&[]) - (-4.0 + 3.0 + 1.0)).abs() < 1e-10);
        let e = CompiledExpr::compile("2 ** 3 ** 2").unwrap();
        assert!((e.eval_row(&[]) - 512.0).abs() < 1e-10);
    }

    #[test]
    fn comparison_and_boolean() {
        let e = CompiledExpr::compile("njet >= 4 && pt_lead > 25.0").unwrap();
        assert_eq!(e.required_columns, vec!["njet", "pt_lead"]);
        assert!((e.eval_row(&[4.0, 30.0]) - 1.0).abs() < 1e-10);
        assert!((e.eval_row(&[3.0, 30.0]) - 0.0).abs() < 1e-10);
    }

    #[test]
    fn xor_and_not() {
        let e = CompiledExpr::compile("(a > 0) ^ !(b > 0)").unwrap();
        assert_eq!(e.eval_row(&[1.0, 1.0]), 1.0);
        assert_eq!(e.eval_row(&[1.0, -1.0]), 0.0);
        assert_eq!(e.eval_row(&[-1.0, -1.0]), 1.0);
    }

    #[test]
    fn pandas_style_operators_are_normalized() {
        let e = CompiledExpr::compile("~(x > 3) & (y < 2)").unwrap();
        assert_eq!(e.eval_row(&[2.0, 1.0]), 1.0);
        assert_eq!(e.eval_row(&[5.0, 1.0]), 0.0);
    }

    #[test]
    fn functions_check_arity() {
        let e = CompiledExpr::compile("max(a, b)").unwrap();
        assert!((e.eval_row(&[3.0, 7.0]) - 7.0).abs() < 1e-10);
        assert!(CompiledExpr::compile("sqrt(a, b)").is_err());
        assert!(CompiledExpr::compile("frobnicate(a)").is_err());
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(CompiledExpr::compile("").is_err());
        assert!(CompiledExpr::compile("   ").is_err());
        assert!(CompiledExpr::compile("x $ y").is_err());
        assert!(CompiledExpr::compile("(x + 1").is_err());
    }

    #[test]
    fn bulk_eval() {
        let e = CompiledExpr::compile("a + b").unwrap();
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        assert_eq!(e.eval_bulk(&[&a, &b]), vec![11.0, 22.0, 33.0]);
    }
}
