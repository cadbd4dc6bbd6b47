//! Expression evaluation over live channel state.
//!
//! Two primitives back guards and port mappings:
//!
//! - [`eval_value`] resolves a default-value expression to a scalar: quoted
//!   strings unquote, numbers parse, anything else is a channel key looked
//!   up in state (null when absent).
//! - [`eval_condition`] evaluates a small boolean/arithmetic sub-grammar
//!   (`==`, `!=`, `<`, `<=`, `>`, `>=`, `&&`/`and`, `||`/`or`, `!`/`not`,
//!   parentheses) against state. Expressions are parsed to an AST and
//!   interpreted; nothing is ever handed to a host-language eval.
//!
//! Failure policy: an ill-formed condition evaluates to `false`, an
//! ill-formed value to null. Unknown identifiers read as `false`, which
//! keeps guards conservative while dependencies are still arriving.
//!
//! Legacy truthiness is retained: any non-empty string (the original's
//! `"GOOD"` convention) is truthy; empty strings, nulls and unknown
//! identifiers are falsy.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Channel state visible to expressions: channel key → value.
pub type State = Map<String, Value>;

/// Resolve a default-value expression against `state`.
pub fn eval_value(expr: &str, state: &State) -> Value {
    let expr = expr.trim();
    if expr.is_empty() {
        return Value::Null;
    }
    if expr.len() >= 2 && expr.starts_with('"') && expr.ends_with('"') {
        return Value::String(expr[1..expr.len() - 1].replace("\\\"", "\""));
    }
    if let Ok(n) = expr.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = expr.parse::<f64>() {
        return Value::from(f);
    }
    state.get(expr).cloned().unwrap_or(Value::Null)
}

/// Evaluate a guard expression against `state`. Ill-formed input is `false`.
pub fn eval_condition(expr: &str, state: &State) -> bool {
    match parse_expr(expr) {
        Some(ast) => truthy(&interpret(&ast, state)),
        None => {
            tracing::debug!(expr, "ill-formed condition expression, treating as false");
            false
        }
    }
}

/// Qualified `Producer.port` references appearing in a free-form
/// expression. Used by the compiler to wire guard dependencies.
pub fn qualified_refs(expr: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*\.[A-Za-z_][A-Za-z0-9_]*").expect("static regex")
    });
    let mut refs: Vec<String> = re.find_iter(expr).map(|m| m.as_str().to_string()).collect();
    refs.dedup();
    refs
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Ident(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Ident(String),
    Number(f64),
    Str(String),
    Bool(bool),
    Op(CmpOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Option<Vec<ExprToken>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(ExprToken::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(ExprToken::RParen);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(ExprToken::Op(CmpOp::Eq));
                    i += 2;
                } else {
                    return None;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(ExprToken::Op(CmpOp::Ne));
                    i += 2;
                } else {
                    tokens.push(ExprToken::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(ExprToken::Op(CmpOp::Le));
                    i += 2;
                } else {
                    tokens.push(ExprToken::Op(CmpOp::Lt));
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(ExprToken::Op(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(ExprToken::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(ExprToken::And);
                    i += 2;
                } else {
                    return None;
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(ExprToken::Or);
                    i += 2;
                } else {
                    return None;
                }
            }
            '"' => {
                let mut out = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return None,
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') if chars.get(i + 1) == Some(&'"') => {
                            out.push('"');
                            i += 2;
                        }
                        Some(c) => {
                            out.push(*c);
                            i += 1;
                        }
                    }
                }
                tokens.push(ExprToken::Str(out));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(ExprToken::Number(text.parse().ok()?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    // Python-style spellings appear in guards written
                    // against the original runner; accept both.
                    "true" | "True" => tokens.push(ExprToken::Bool(true)),
                    "false" | "False" => tokens.push(ExprToken::Bool(false)),
                    "and" => tokens.push(ExprToken::And),
                    "or" => tokens.push(ExprToken::Or),
                    "not" => tokens.push(ExprToken::Not),
                    _ => tokens.push(ExprToken::Ident(word)),
                }
            }
            _ => return None,
        }
    }
    Some(tokens)
}

struct ExprParser {
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<ExprToken> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn or_expr(&mut self) -> Option<Expr> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&ExprToken::Or) {
            self.next();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Some(left)
    }

    fn and_expr(&mut self) -> Option<Expr> {
        let mut left = self.unary_expr()?;
        while self.peek() == Some(&ExprToken::And) {
            self.next();
            let right = self.unary_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Some(left)
    }

    fn unary_expr(&mut self) -> Option<Expr> {
        if self.peek() == Some(&ExprToken::Not) {
            self.next();
            let inner = self.unary_expr()?;
            return Some(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Option<Expr> {
        let left = self.primary()?;
        if let Some(ExprToken::Op(op)) = self.peek().cloned() {
            self.next();
            let right = self.primary()?;
            return Some(Expr::Cmp(op, Box::new(left), Box::new(right)));
        }
        Some(left)
    }

    fn primary(&mut self) -> Option<Expr> {
        match self.next()? {
            ExprToken::Number(n) => Some(Expr::Literal(Value::from(n))),
            ExprToken::Str(s) => Some(Expr::Literal(Value::String(s))),
            ExprToken::Bool(b) => Some(Expr::Literal(Value::Bool(b))),
            ExprToken::Ident(name) => Some(Expr::Ident(name)),
            ExprToken::LParen => {
                let inner = self.or_expr()?;
                if self.next()? != ExprToken::RParen {
                    return None;
                }
                Some(inner)
            }
            _ => None,
        }
    }
}

fn parse_expr(expr: &str) -> Option<Expr> {
    let tokens = tokenize(expr.trim())?;
    if tokens.is_empty() {
        return None;
    }
    let mut parser = ExprParser { tokens, pos: 0 };
    let ast = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return None;
    }
    Some(ast)
}

fn interpret(expr: &Expr, state: &State) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        // Unknown identifiers read as `false`, matching the original
        // runner's substitution of unbound names.
        Expr::Ident(name) => state.get(name).cloned().unwrap_or(Value::Bool(false)),
        Expr::Not(inner) => Value::Bool(!truthy(&interpret(inner, state))),
        Expr::And(a, b) => {
            Value::Bool(truthy(&interpret(a, state)) && truthy(&interpret(b, state)))
        }
        Expr::Or(a, b) => {
            Value::Bool(truthy(&interpret(a, state)) || truthy(&interpret(b, state)))
        }
        Expr::Cmp(op, a, b) => {
            let left = interpret(a, state);
            let right = interpret(b, state);
            Value::Bool(compare(*op, &left, &right))
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    match op {
        CmpOp::Eq => loose_eq(left, right),
        CmpOp::Ne => !loose_eq(left, right),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    match (a.as_f64(), b.as_f64()) {
                        (Some(a), Some(b)) => a.partial_cmp(&b),
                        _ => None,
                    }
                }
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            match ordering {
                Some(ord) => match op {
                    CmpOp::Lt => ord.is_lt(),
                    CmpOp::Le => ord.is_le(),
                    CmpOp::Gt => ord.is_gt(),
                    CmpOp::Ge => ord.is_ge(),
                    _ => unreachable!(),
                },
                None => false,
            }
        }
    }
}

/// Equality with numeric coercion so `1 == 1.0` holds.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (a, b) => a == b,
    }
}

/// Truthiness used for guards and bare expressions.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(entries: &[(&str, Value)]) -> State {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_eval_value_literals() {
        let empty = State::new();
        assert_eq!(eval_value("\"hello\"", &empty), json!("hello"));
        assert_eq!(eval_value("42", &empty), json!(42));
        assert_eq!(eval_value("2.5", &empty), json!(2.5));
    }

    #[test]
    fn test_eval_value_lookup() {
        let st = state(&[("Retrieve.chunks", json!(["a", "b"]))]);
        assert_eq!(eval_value("Retrieve.chunks", &st), json!(["a", "b"]));
        assert_eq!(eval_value("missing", &st), Value::Null);
        assert_eq!(eval_value("", &st), Value::Null);
    }

    #[test]
    fn test_condition_comparisons() {
        let st = state(&[("n", json!(3)), ("s", json!("abc"))]);
        assert!(eval_condition("n == 3", &st));
        assert!(eval_condition("n != 4", &st));
        assert!(eval_condition("n < 4", &st));
        assert!(eval_condition("n <= 3", &st));
        assert!(eval_condition("n > 2", &st));
        assert!(eval_condition("n >= 3", &st));
        assert!(eval_condition("s == \"abc\"", &st));
        assert!(!eval_condition("s == \"xyz\"", &st));
    }

    #[test]
    fn test_condition_boolean_operators() {
        let st = state(&[("a", json!(true)), ("b", json!(false))]);
        assert!(eval_condition("a && !b", &st));
        assert!(eval_condition("a and not b", &st));
        assert!(eval_condition("b || a", &st));
        assert!(eval_condition("b or a", &st));
        assert!(!eval_condition("a && b", &st));
        assert!(eval_condition("(a || b) && a", &st));
    }

    #[test]
    fn test_condition_qualified_identifiers() {
        let st = state(&[("Check.is_enough", json!(true))]);
        assert!(eval_condition("Check.is_enough == True", &st));
        assert!(eval_condition("Check.is_enough", &st));
    }

    #[test]
    fn test_unknown_identifiers_read_false() {
        let empty = State::new();
        assert!(!eval_condition("Missing.port", &empty));
        // Unknown == False holds, matching the substitution convention.
        assert!(eval_condition("Missing.port == False", &empty));
    }

    #[test]
    fn test_ill_formed_condition_is_false() {
        let empty = State::new();
        assert!(!eval_condition("a ==", &empty));
        assert!(!eval_condition("((", &empty));
        assert!(!eval_condition("", &empty));
        assert!(!eval_condition("a ? b", &empty));
    }

    #[test]
    fn test_string_truthiness_convention() {
        let st = state(&[("status", json!("GOOD")), ("empty", json!(""))]);
        assert!(eval_condition("status", &st));
        assert!(!eval_condition("empty", &st));
        assert!(eval_condition("\"GOOD\"", &st));
    }

    #[test]
    fn test_numeric_coercion_eq() {
        let st = state(&[("x", json!(1))]);
        assert!(eval_condition("x == 1.0", &st));
    }

    #[test]
    fn test_null_is_falsy() {
        let st = state(&[("x", Value::Null)]);
        assert!(!eval_condition("x", &st));
        assert!(!eval_condition("x == 0", &st));
    }

    #[test]
    fn test_qualified_refs_extraction() {
        let refs = qualified_refs("Check.is_enough == True && Retrieve.chunks != \"\"");
        assert_eq!(refs, vec!["Check.is_enough", "Retrieve.chunks"]);
        assert!(qualified_refs("a == b").is_empty());
    }
}
