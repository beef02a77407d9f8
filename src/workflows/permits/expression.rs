//! Pure expression evaluator for template calc fields.
//!
//! Supports dotted path lookups into the context snapshot, numeric and string
//! literals, unary minus, `+ - * /`, comparisons, and parentheses. A lookup of
//! a non-existent path yields `null` silently; malformed expressions and
//! runtime type errors are reported as structured issues with a `null` value.
//! The evaluator performs no I/O and never mutates the context, so identical
//! inputs always produce identical output.

use serde::Serialize;
use serde_json::{Number, Value};

/// Result of evaluating one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub value: Value,
    pub errors: Vec<EvalIssue>,
}

impl EvalOutcome {
    fn ok(value: Value) -> Self {
        Self {
            value,
            errors: Vec::new(),
        }
    }

    fn failed(issue: EvalIssue) -> Self {
        Self {
            value: Value::Null,
            errors: vec![issue],
        }
    }
}

/// Structured evaluation problem surfaced to the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalIssue {
    pub kind: EvalIssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalIssueKind {
    Syntax,
    Type,
}

impl EvalIssue {
    fn syntax(message: impl Into<String>) -> Self {
        Self {
            kind: EvalIssueKind::Syntax,
            message: message.into(),
        }
    }

    fn type_error(message: impl Into<String>) -> Self {
        Self {
            kind: EvalIssueKind::Type,
            message: message.into(),
        }
    }
}

/// Evaluate `expression` against the JSON context snapshot.
pub fn evaluate(expression: &str, context: &Value) -> EvalOutcome {
    let tokens = match tokenize(expression) {
        Ok(tokens) => tokens,
        Err(issue) => return EvalOutcome::failed(issue),
    };

    let mut parser = Parser::new(tokens);
    let ast = match parser.parse() {
        Ok(ast) => ast,
        Err(issue) => return EvalOutcome::failed(issue),
    };

    match eval_node(&ast, context) {
        Ok(value) => EvalOutcome::ok(value),
        Err(issue) => EvalOutcome::failed(issue),
    }
}

/// Walk a dotted path into the context. A missing segment resolves to `null`
/// rather than an error so templates can reference optional sources freely.
pub fn lookup_path(context: &Value, path: &str) -> Value {
    let mut current = context;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => current = next,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    current.clone()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Path(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, EvalIssue> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expression.chars().collect();
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];
        match ch {
            c if c.is_whitespace() => pos += 1,
            '+' => {
                tokens.push(Token::Plus);
                pos += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                pos += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                pos += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            '=' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    pos += 2;
                } else {
                    return Err(EvalIssue::syntax("expected '==' but found single '='"));
                }
            }
            '!' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    pos += 2;
                } else {
                    return Err(EvalIssue::syntax("unexpected '!'"));
                }
            }
            '<' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    pos += 2;
                } else {
                    tokens.push(Token::Lt);
                    pos += 1;
                }
            }
            '>' => {
                if chars.get(pos + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    pos += 2;
                } else {
                    tokens.push(Token::Gt);
                    pos += 1;
                }
            }
            '\'' | '"' => {
                let quote = ch;
                let mut literal = String::new();
                pos += 1;
                let mut closed = false;
                while pos < chars.len() {
                    let c = chars[pos];
                    if c == '\\' && pos + 1 < chars.len() {
                        literal.push(chars[pos + 1]);
                        pos += 2;
                        continue;
                    }
                    if c == quote {
                        closed = true;
                        pos += 1;
                        break;
                    }
                    literal.push(c);
                    pos += 1;
                }
                if !closed {
                    return Err(EvalIssue::syntax("unterminated string literal"));
                }
                tokens.push(Token::Text(literal));
            }
            c if c.is_ascii_digit() => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                    pos += 1;
                }
                let raw: String = chars[start..pos].iter().collect();
                let number = raw
                    .parse::<f64>()
                    .map_err(|_| EvalIssue::syntax(format!("invalid number literal '{raw}'")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len()
                    && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_' || chars[pos] == '.')
                {
                    pos += 1;
                }
                let raw: String = chars[start..pos].iter().collect();
                match raw.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Path(raw)),
                }
            }
            other => {
                return Err(EvalIssue::syntax(format!("unexpected character '{other}'")));
            }
        }
    }

    if tokens.is_empty() {
        return Err(EvalIssue::syntax("empty expression"));
    }

    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Lookup(String),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(&mut self) -> Result<Node, EvalIssue> {
        let node = self.comparison()?;
        if self.pos < self.tokens.len() {
            return Err(EvalIssue::syntax("trailing tokens after expression"));
        }
        Ok(node)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn comparison(&mut self) -> Result<Node, EvalIssue> {
        let mut node = self.additive()?;
        while let Some(op) = match self.peek() {
            Some(Token::EqEq) => Some(BinaryOp::Eq),
            Some(Token::NotEq) => Some(BinaryOp::NotEq),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            _ => None,
        } {
            self.advance();
            let right = self.additive()?;
            node = Node::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    fn additive(&mut self) -> Result<Node, EvalIssue> {
        let mut node = self.multiplicative()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Subtract),
            _ => None,
        } {
            self.advance();
            let right = self.multiplicative()?;
            node = Node::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    fn multiplicative(&mut self) -> Result<Node, EvalIssue> {
        let mut node = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Multiply),
            Some(Token::Slash) => Some(BinaryOp::Divide),
            _ => None,
        } {
            self.advance();
            let right = self.unary()?;
            node = Node::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node, EvalIssue> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            let operand = self.unary()?;
            return Ok(Node::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node, EvalIssue> {
        match self.advance() {
            Some(Token::Number(number)) => Ok(Node::Literal(number_value(number)?)),
            Some(Token::Text(text)) => Ok(Node::Literal(Value::String(text))),
            Some(Token::True) => Ok(Node::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Node::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Node::Literal(Value::Null)),
            Some(Token::Path(path)) => Ok(Node::Lookup(path)),
            Some(Token::LParen) => {
                let node = self.comparison()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(node),
                    _ => Err(EvalIssue::syntax("expected closing ')'")),
                }
            }
            other => Err(EvalIssue::syntax(format!(
                "expected a value but found {other:?}"
            ))),
        }
    }
}

fn eval_node(node: &Node, context: &Value) -> Result<Value, EvalIssue> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Lookup(path) => Ok(lookup_path(context, path)),
        Node::Unary { op, operand } => {
            let value = eval_node(operand, context)?;
            match op {
                UnaryOp::Negate => match as_number(&value) {
                    Some(number) => number_value(-number),
                    None => Err(EvalIssue::type_error(format!(
                        "cannot negate {}",
                        type_name(&value)
                    ))),
                },
            }
        }
        Node::Binary { op, left, right } => {
            let lhs = eval_node(left, context)?;
            let rhs = eval_node(right, context)?;
            eval_binary(*op, &lhs, &rhs)
        }
    }
}

fn eval_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalIssue> {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => arithmetic(op, lhs, rhs),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => arithmetic(op, lhs, rhs),
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(lhs, rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(lhs, rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => ordering(op, lhs, rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalIssue> {
    let (a, b) = match (as_number(lhs), as_number(rhs)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(EvalIssue::type_error(format!(
                "arithmetic requires numbers, found {} and {}",
                type_name(lhs),
                type_name(rhs)
            )))
        }
    };

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => {
            if b == 0.0 {
                return Err(EvalIssue::type_error("division by zero"));
            }
            a / b
        }
        _ => unreachable!("arithmetic called with non-arithmetic operator"),
    };

    number_value(result)
}

fn ordering(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalIssue> {
    if let (Some(a), Some(b)) = (as_number(lhs), as_number(rhs)) {
        return Ok(Value::Bool(apply_ordering(
            op,
            a.partial_cmp(&b)
                .ok_or_else(|| EvalIssue::type_error("numbers are not comparable"))?,
        )));
    }

    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        return Ok(Value::Bool(apply_ordering(op, a.cmp(b))));
    }

    Err(EvalIssue::type_error(format!(
        "cannot order {} against {}",
        type_name(lhs),
        type_name(rhs)
    )))
}

fn apply_ordering(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Ge => ordering != Less,
        _ => false,
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(lhs), as_number(rhs)) {
        return a == b;
    }
    lhs == rhs
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Integral results keep an integer representation so template fields render
/// without a spurious fractional part.
fn number_value(number: f64) -> Result<Value, EvalIssue> {
    if !number.is_finite() {
        return Err(EvalIssue::type_error("arithmetic overflow"));
    }
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        return Ok(Value::Number(Number::from(number as i64)));
    }
    Number::from_f64(number)
        .map(Value::Number)
        .ok_or_else(|| EvalIssue::type_error("arithmetic produced a non-representable number"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
