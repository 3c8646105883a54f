use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Deepest nesting of parentheses, signs and powers the parser accepts.
pub const MAX_DEPTH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unexpected '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("formula ended unexpectedly")]
    UnexpectedEnd,

    #[error("unknown function {name} at position {position}")]
    UnknownFunction { name: String, position: usize },

    #[error("invalid number '{text}' at position {position}")]
    InvalidNumber { text: String, position: usize },

    #[error("formula nests deeper than {} levels at position {position}", MAX_DEPTH)]
    TooDeep { position: usize },

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: FunctionName,
        expected: &'static str,
        found: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0} produced a non-finite result")]
    NonFinite(String),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionName {
    Min,
    Max,
    Sum,
    Avg,
    Abs,
    Round,
    Sqrt,
}

impl FunctionName {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "MIN" => Some(FunctionName::Min),
            "MAX" => Some(FunctionName::Max),
            "SUM" => Some(FunctionName::Sum),
            "AVG" | "AVERAGE" => Some(FunctionName::Avg),
            "ABS" => Some(FunctionName::Abs),
            "ROUND" => Some(FunctionName::Round),
            "SQRT" => Some(FunctionName::Sqrt),
            _ => None,
        }
    }

    fn check_arity(self, found: usize) -> Result<(), FormulaError> {
        let (ok, expected) = match self {
            FunctionName::Abs | FunctionName::Sqrt => (found == 1, "1"),
            FunctionName::Round => (found == 1 || found == 2, "1 or 2"),
            FunctionName::Min | FunctionName::Max | FunctionName::Sum | FunctionName::Avg => {
                (found >= 1, "at least 1")
            }
        };
        if ok {
            Ok(())
        } else {
            Err(FormulaError::Arity {
                function: self,
                expected,
                found,
            })
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            FunctionName::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            FunctionName::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            FunctionName::Sum => args.iter().sum(),
            FunctionName::Avg => args.iter().sum::<f64>() / args.len() as f64,
            FunctionName::Abs => args[0].abs(),
            FunctionName::Sqrt => args[0].sqrt(),
            FunctionName::Round => {
                let digits = args.get(1).copied().unwrap_or(0.0).trunc() as i32;
                let factor = 10f64.powi(digits);
                (args[0] * factor).round() / factor
            }
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionName::Min => "MIN",
            FunctionName::Max => "MAX",
            FunctionName::Sum => "SUM",
            FunctionName::Avg => "AVG",
            FunctionName::Abs => "ABS",
            FunctionName::Round => "ROUND",
            FunctionName::Sqrt => "SQRT",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// Parsed formula.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: FunctionName,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Identifiers the formula reads, in first-seen order.
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                if !vars.contains(name) {
                    vars.push(name.clone());
                }
            }
            Expr::Unary { operand, .. } => operand.collect_variables(vars),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_variables(vars)),
        }
    }

    pub fn evaluate<F>(&self, lookup: &F) -> Result<f64, EvalError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Variable(name) => {
                lookup(name).ok_or_else(|| EvalError::UndefinedVariable(name.clone()))
            }
            Expr::Unary { op, operand } => {
                let value = operand.evaluate(lookup)?;
                Ok(match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Minus => -value,
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate(lookup)?;
                let rhs = rhs.evaluate(lookup)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Subtract => Ok(lhs - rhs),
                    BinaryOp::Multiply => Ok(lhs * rhs),
                    BinaryOp::Divide if rhs == 0.0 => Err(EvalError::DivisionByZero),
                    BinaryOp::Divide => Ok(lhs / rhs),
                    BinaryOp::Power => Ok(lhs.powf(rhs)),
                }
            }
            Expr::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(lookup))
                    .collect::<Result<Vec<f64>, EvalError>>()?;
                Ok(function.apply(&values))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(name) => f.write_str(name),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let bytes: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let (pos, c) = bytes[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                while i < bytes.len() && (bytes[i].1.is_ascii_digit() || bytes[i].1 == '.') {
                    i += 1;
                }
                // Exponent part: 1e3, 2.5E-4
                if i < bytes.len() && matches!(bytes[i].1, 'e' | 'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && matches!(bytes[j].1, '+' | '-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].1.is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].1.is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let end = bytes.get(i).map(|&(p, _)| p).unwrap_or(input.len());
                let text = &input[pos..end];
                let value = text.parse::<f64>().map_err(|_| FormulaError::InvalidNumber {
                    text: text.to_string(),
                    position: pos,
                })?;
                tokens.push((Token::Number(value), pos));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i;
                while end < bytes.len() && (bytes[end].1.is_alphanumeric() || bytes[end].1 == '_')
                {
                    end += 1;
                }
                let stop = bytes.get(end).map(|&(p, _)| p).unwrap_or(input.len());
                tokens.push((Token::Ident(input[pos..stop].to_string()), pos));
                i = end;
            }
            '*' if bytes.get(i + 1).map(|&(_, c)| c) == Some('*') => {
                tokens.push((Token::Op('^'), pos));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push((Token::Op(c), pos));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, pos));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, pos));
                i += 1;
            }
            other => {
                return Err(FormulaError::UnexpectedToken {
                    found: other.to_string(),
                    position: pos,
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(token: Token, position: usize) -> FormulaError {
        FormulaError::UnexpectedToken {
            found: token.to_string(),
            position,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, position)) => Err(Self::unexpected(token, position)),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek() {
            let op = if *c == '+' {
                BinaryOp::Add
            } else {
                BinaryOp::Subtract
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek() {
            let op = if *c == '*' {
                BinaryOp::Multiply
            } else {
                BinaryOp::Divide
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // Every nested construct recurses through here, so the depth limit lives here.
    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.depth == MAX_DEPTH {
            let position = self
                .tokens
                .get(self.pos)
                .or(self.tokens.last())
                .map(|&(_, p)| p)
                .unwrap_or(0);
            return Err(FormulaError::TooDeep { position });
        }
        self.depth += 1;
        let result = self.signed();
        self.depth -= 1;
        result
    }

    fn signed(&mut self) -> Result<Expr, FormulaError> {
        let op = match self.peek() {
            Some(Token::Op('+')) => UnaryOp::Plus,
            Some(Token::Op('-')) => UnaryOp::Minus,
            _ => return self.power(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    // Right-associative; the exponent may carry its own sign.
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Power,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Ident(name), position)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Variable(name));
                }
                let function = FunctionName::from_name(&name)
                    .ok_or(FormulaError::UnknownFunction { name, position })?;
                self.pos += 1;
                let args = self.arguments()?;
                function.check_arity(args.len())?;
                Ok(Expr::Call { function, args })
            }
            Some((Token::LParen, _)) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some((token, position)) => Err(Self::unexpected(token, position)),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some((Token::Comma, _)) => continue,
                Some((Token::RParen, _)) => return Ok(args),
                Some((token, position)) => return Err(Self::unexpected(token, position)),
                None => return Err(FormulaError::UnexpectedEnd),
            }
        }
    }
}

/// Parse formula text whose names are plain identifiers
///
/// # Arguments
/// * `input` - Formula such as `MAX(load, 10) * 1.5`
///
/// # Returns
/// * `Ok(Expr)` - The expression tree
/// * `Err(FormulaError)` - The first syntax error, with its byte position where known
///
/// # Examples
/// ```
/// use valuecalc::formula::parse_formula;
///
/// let expr = parse_formula("MAX(load, 10) * 1.5").unwrap();
/// assert_eq!(expr.variables(), vec!["load".to_string()]);
/// let value = expr.evaluate(&|_: &str| Some(20.0)).unwrap();
/// assert_eq!(value, 30.0);
/// ```
pub fn parse_formula(input: &str) -> Result<Expr, FormulaError> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
        depth: 0,
    };
    if parser.peek().is_none() {
        return Err(FormulaError::UnexpectedEnd);
    }
    let expr = parser.expression()?;
    match parser.next() {
        None => Ok(expr),
        Some((token, position)) => Err(Parser::unexpected(token, position)),
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    Operator,
    Number,
    Name,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DisplayToken {
    pub kind: DisplayKind,
    pub text: String,
}

/// Splits formula text for display: operators and parentheses stand alone,
/// everything between them is one trimmed token, so names may contain spaces.
pub fn display_tokens(formula: &str) -> Vec<DisplayToken> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, tokens: &mut Vec<DisplayToken>| {
        let text = current.trim();
        if !text.is_empty() {
            let kind = if text.chars().all(|c| c.is_ascii_digit() || c == '.') {
                DisplayKind::Number
            } else {
                DisplayKind::Name
            };
            tokens.push(DisplayToken {
                kind,
                text: text.to_string(),
            });
        }
        current.clear();
    };

    for c in formula.chars() {
        if matches!(c, '+' | '-' | '*' | '/' | '^' | '(' | ')' | ',') {
            flush(&mut current, &mut tokens);
            tokens.push(DisplayToken {
                kind: DisplayKind::Operator,
                text: c.to_string(),
            });
        } else {
            current.push(c);
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}
