//! URL templating and placeholder expansion.
//!
//! Templates contain `{name}` holes and `{...expr...}` expression holes
//! (one nested level of `{word}` allowed inside an expression). Simple
//! names resolve against the per-call placeholder scope first, then the
//! per-client scope; unresolved simple names are left literally,
//! braces included. Expressions are evaluated by a small pure
//! interpreter; compiled expressions are memoised per client by their
//! source text.
//!
//! The interpreter keeps the host semantics the templates were written
//! against: strict equality, truthiness where `0`, `""`, and an unbound
//! placeholder are falsy, and `+` concatenating when either side is a
//! string. An unbound placeholder evaluates to `undefined`, which is
//! distinct from every literal, so `{p} === 0` is false when `p` is
//! missing but true when it resolves to `0`.

use crate::error::{CouchLinkError, Result};
use crate::models::{PlaceholderValue, RequestOptions};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// Matches a balanced placeholder: plain content or one nested `{word}`.
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{((?:[^{}]+|\{\w+\})*)\}").expect("placeholder regex"))
}

fn simple_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+$").expect("simple name regex"))
}

/// Per-client template expander with an expression memo.
#[derive(Debug)]
pub(crate) struct TemplateEngine {
    memo: Mutex<HashMap<String, Arc<Expr>>>,
}

impl TemplateEngine {
    pub(crate) fn new() -> Self {
        Self {
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Parse every expression placeholder in `template`, rejecting
    /// unsupported syntax up front. Called at client construction for
    /// each configured base URL.
    pub(crate) fn validate(&self, template: &str) -> Result<()> {
        for cap in placeholder_regex().captures_iter(template) {
            let content = &cap[1];
            if !simple_name_regex().is_match(content) {
                self.compiled(content)?;
            }
        }
        Ok(())
    }

    /// Expand every placeholder in `template` against the two scopes.
    pub(crate) fn expand(
        &self,
        template: &str,
        options: &RequestOptions,
        client_scope: &HashMap<String, PlaceholderValue>,
    ) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for cap in placeholder_regex().captures_iter(template) {
            let whole = cap.get(0).expect("capture 0");
            out.push_str(&template[last..whole.start()]);
            last = whole.end();

            let content = &cap[1];
            if simple_name_regex().is_match(content) {
                match lookup(content, options, client_scope) {
                    Some(value) => out.push_str(&value.to_substitution()),
                    // No binding in either scope: keep the hole verbatim.
                    None => out.push_str(whole.as_str()),
                }
            } else {
                let expr = self.compiled(content)?;
                let value = expr.eval(&mut |name| lookup(name, options, client_scope))?;
                out.push_str(&value.to_substitution());
            }
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    fn compiled(&self, source: &str) -> Result<Arc<Expr>> {
        let mut memo = self.memo.lock().expect("template memo poisoned");
        if let Some(expr) = memo.get(source) {
            return Ok(expr.clone());
        }
        let expr = Arc::new(parse(source)?);
        memo.insert(source.to_string(), expr.clone());
        Ok(expr)
    }
}

fn lookup(
    name: &str,
    options: &RequestOptions,
    client_scope: &HashMap<String, PlaceholderValue>,
) -> Option<EvalValue> {
    options
        .placeholders
        .get(name)
        .or_else(|| client_scope.get(name))
        .map(|binding| EvalValue::from_json(&binding.resolve(options, name)))
}

// ---------------------------------------------------------------
// Expression values
// ---------------------------------------------------------------

/// Runtime value of the expression interpreter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EvalValue {
    Undefined,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl EvalValue {
    fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(s) => Self::Str(s.clone()),
            Value::Number(n) => Self::Num(n.as_f64().unwrap_or(f64::NAN)),
            Value::Bool(b) => Self::Bool(*b),
            Value::Null => Self::Undefined,
            other => Self::Str(other.to_string()),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Undefined => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
        }
    }

    fn as_num(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            },
            Self::Num(n) => *n,
            Self::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }

    /// Rendering used when the value lands in a URL.
    pub(crate) fn to_substitution(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Num(n) => fmt_number(*n),
            Self::Str(s) => s.clone(),
        }
    }
}

impl fmt::Display for EvalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_substitution())
    }
}

/// Integral floats print without a decimal point (`3`, not `3.0`).
fn fmt_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ---------------------------------------------------------------
// Expression grammar
// ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    StrictEq,
    StrictNe,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Num(f64),
    Str(String),
    /// Bare identifier or nested `{word}` reference; both resolve by
    /// the simple-name rule.
    Ident(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, resolve: &mut dyn FnMut(&str) -> Option<EvalValue>) -> Result<EvalValue> {
        Ok(match self {
            Self::Num(n) => EvalValue::Num(*n),
            Self::Str(s) => EvalValue::Str(s.clone()),
            Self::Ident(name) => resolve(name).unwrap_or(EvalValue::Undefined),
            Self::Not(inner) => EvalValue::Bool(!inner.eval(resolve)?.truthy()),
            Self::Neg(inner) => EvalValue::Num(-inner.eval(resolve)?.as_num()),
            Self::Binary(op, lhs, rhs) => {
                // Short-circuit forms yield the operand value itself.
                match op {
                    BinOp::And => {
                        let l = lhs.eval(resolve)?;
                        return if l.truthy() { rhs.eval(resolve) } else { Ok(l) };
                    },
                    BinOp::Or => {
                        let l = lhs.eval(resolve)?;
                        return if l.truthy() { Ok(l) } else { rhs.eval(resolve) };
                    },
                    _ => {},
                }
                let l = lhs.eval(resolve)?;
                let r = rhs.eval(resolve)?;
                match op {
                    BinOp::Add => match (&l, &r) {
                        (EvalValue::Str(_), _) | (_, EvalValue::Str(_)) => {
                            EvalValue::Str(format!("{}{}", l, r))
                        },
                        _ => EvalValue::Num(l.as_num() + r.as_num()),
                    },
                    BinOp::Sub => EvalValue::Num(l.as_num() - r.as_num()),
                    BinOp::Mul => EvalValue::Num(l.as_num() * r.as_num()),
                    BinOp::Div => EvalValue::Num(l.as_num() / r.as_num()),
                    BinOp::Lt => compare(&l, &r, |o| o == std::cmp::Ordering::Less),
                    BinOp::Gt => compare(&l, &r, |o| o == std::cmp::Ordering::Greater),
                    BinOp::Le => compare(&l, &r, |o| o != std::cmp::Ordering::Greater),
                    BinOp::Ge => compare(&l, &r, |o| o != std::cmp::Ordering::Less),
                    BinOp::StrictEq => EvalValue::Bool(l.strict_eq(&r)),
                    BinOp::StrictNe => EvalValue::Bool(!l.strict_eq(&r)),
                    BinOp::And | BinOp::Or => unreachable!("handled above"),
                }
            },
            Self::Ternary(cond, then, alt) => {
                if cond.eval(resolve)?.truthy() {
                    then.eval(resolve)?
                } else {
                    alt.eval(resolve)?
                }
            },
        })
    }
}

fn compare(l: &EvalValue, r: &EvalValue, pick: impl Fn(std::cmp::Ordering) -> bool) -> EvalValue {
    let ordering = match (l, r) {
        (EvalValue::Str(a), EvalValue::Str(b)) => Some(a.cmp(b)),
        _ => l.as_num().partial_cmp(&r.as_num()),
    };
    EvalValue::Bool(ordering.map(pick).unwrap_or(false))
}

// ---------------------------------------------------------------
// Lexer / parser
// ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Gt,
    Le,
    Ge,
    StrictEq,
    StrictNe,
    AndAnd,
    OrOr,
    Bang,
    Question,
    Colon,
    LParen,
    RParen,
}

fn unsupported(source: &str, detail: impl fmt::Display) -> CouchLinkError {
    CouchLinkError::ConfigurationError(format!(
        "Unsupported placeholder expression {{{}}}: {}",
        source, detail
    ))
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            },
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            },
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            },
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            },
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            },
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            },
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            },
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            },
            '<' | '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(if c == '<' { Token::Le } else { Token::Ge });
                    i += 2;
                } else {
                    tokens.push(if c == '<' { Token::Lt } else { Token::Gt });
                    i += 1;
                }
            },
            '=' => {
                if chars.get(i + 1) == Some(&'=') && chars.get(i + 2) == Some(&'=') {
                    tokens.push(Token::StrictEq);
                    i += 3;
                } else {
                    return Err(unsupported(source, "only strict equality `===` is supported"));
                }
            },
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    if chars.get(i + 2) == Some(&'=') {
                        tokens.push(Token::StrictNe);
                        i += 3;
                    } else {
                        return Err(unsupported(source, "only strict inequality `!==` is supported"));
                    }
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            },
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(unsupported(source, "single `&` is not supported"));
                }
            },
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(unsupported(source, "single `|` is not supported"));
                }
            },
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some(&esc) => s.push(esc),
                                None => return Err(unsupported(source, "dangling escape")),
                            }
                            i += 2;
                        },
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        },
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        },
                        None => return Err(unsupported(source, "unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(s));
            },
            '{' => {
                // Nested `{word}` placeholder reference.
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                if end == start || chars.get(end) != Some(&'}') {
                    return Err(unsupported(source, "nested placeholder must be {word}"));
                }
                tokens.push(Token::Ident(chars[start..end].iter().collect()));
                i = end + 1;
            },
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse()
                    .map_err(|_| unsupported(source, format!("bad number literal `{}`", text)))?;
                tokens.push(Token::Num(n));
            },
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            },
            other => return Err(unsupported(source, format!("unexpected character `{}`", other))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

pub(crate) fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.ternary()?;
    if parser.pos != parser.tokens.len() {
        return Err(unsupported(source, "trailing tokens"));
    }
    Ok(expr)
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ternary(&mut self) -> Result<Expr> {
        let cond = self.or()?;
        if self.eat(&Token::Question) {
            let then = self.ternary()?;
            if !self.eat(&Token::Colon) {
                return Err(unsupported(self.source, "ternary missing `:`"));
            }
            let alt = self.ternary()?;
            return Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(alt)));
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::StrictEq) => BinOp::StrictEq,
                Some(Token::StrictNe) => BinOp::StrictNe,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Ge) => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| unsupported(self.source, "unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Num(n) => Ok(Expr::Num(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let inner = self.ternary()?;
                if !self.eat(&Token::RParen) {
                    return Err(unsupported(self.source, "missing `)`"));
                }
                Ok(inner)
            },
            other => Err(unsupported(self.source, format!("unexpected token {:?}", other))),
        }
    }
}
