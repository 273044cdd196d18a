//! Formula parser
//!
//! Converts a sequence of tokens into an expression tree.
//! Uses recursive descent parsing with operator precedence; `**` binds
//! tighter than unary minus and is right-associative, as in `-x ** 2 == -(x ** 2)`.

use super::tokenizer::Token;
use std::collections::BTreeSet;
use std::fmt;

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(BinOp::Add),
            "-" => Some(BinOp::Sub),
            "*" => Some(BinOp::Mul),
            "/" => Some(BinOp::Div),
            _ => None,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => 1,
            BinOp::Mul | BinOp::Div => 2,
        }
    }
}

/// Expression tree over one or more named variables
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric constant
    Number(f64),
    /// A named variable (unit symbol)
    Variable(String),
    /// Unary minus
    Negate(Box<Expr>),
    /// Binary operation: left op right
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// base ** exponent
    Power { base: Box<Expr>, exponent: Box<Expr> },
}

impl Expr {
    pub fn number(n: f64) -> Self {
        Expr::Number(n)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn power(base: Expr, exponent: Expr) -> Self {
        Expr::Power {
            base: Box::new(base),
            exponent: Box::new(exponent),
        }
    }

    pub fn negate(operand: Expr) -> Self {
        Expr::Negate(Box::new(operand))
    }

    /// Names of all variables referenced by this expression
    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                vars.insert(name.clone());
            }
            Expr::Negate(operand) => operand.collect_variables(vars),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
            Expr::Power { base, exponent } => {
                base.collect_variables(vars);
                exponent.collect_variables(vars);
            }
        }
    }

    /// Number of times `name` occurs in the tree
    pub fn occurrences(&self, name: &str) -> usize {
        match self {
            Expr::Number(_) => 0,
            Expr::Variable(v) => usize::from(v == name),
            Expr::Negate(operand) => operand.occurrences(name),
            Expr::BinaryOp { left, right, .. } => left.occurrences(name) + right.occurrences(name),
            Expr::Power { base, exponent } => base.occurrences(name) + exponent.occurrences(name),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.occurrences(name) > 0
    }

    /// Binding strength used when printing
    fn precedence(&self) -> u8 {
        match self {
            Expr::BinaryOp { op, .. } => op.precedence(),
            Expr::Negate(_) => 3,
            Expr::Number(n) if *n < 0.0 => 3,
            Expr::Power { .. } => 4,
            Expr::Number(_) | Expr::Variable(_) => 5,
        }
    }
}

/// Write `expr`, parenthesized when it binds looser than `min_precedence`
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, min_precedence: u8) -> fmt::Result {
    if expr.precedence() < min_precedence {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Variable(name) => write!(f, "{}", name),
            Expr::Negate(operand) => {
                write!(f, "-")?;
                write_operand(f, operand, 3)
            }
            Expr::BinaryOp { op, left, right } => {
                let prec = op.precedence();
                write_operand(f, left, prec)?;
                write!(f, " {} ", op.symbol())?;
                // a - (b + c) and a / (b * c) keep their parentheses
                let right_min = match op {
                    BinOp::Sub | BinOp::Div => prec + 1,
                    BinOp::Add | BinOp::Mul => prec,
                };
                write_operand(f, right, right_min)
            }
            Expr::Power { base, exponent } => {
                write_operand(f, base, 5)?;
                write!(f, " ** ")?;
                write_operand(f, exponent, 3)
            }
        }
    }
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at token {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Deepest nesting of parentheses, signs and exponents a formula may use
pub const MAX_DEPTH: usize = 256;

/// Longest formula, in tokens. Bounds the depth of operator chains.
pub const MAX_TOKENS: usize = 1024;

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    /// Create a new parser for the given tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    /// Parse the tokens into an expression tree
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        if self.tokens.len() > MAX_TOKENS {
            return Err(ParseError::new(
                format!("expression longer than {} tokens", MAX_TOKENS),
                MAX_TOKENS,
            ));
        }
        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    /// Check if we've consumed all tokens
    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Peek at the current token
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Advance to the next token
    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
        }
    }

    /// Run `rule` one nesting level deeper
    fn nested<T>(
        &mut self,
        rule: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                "expression nested too deeply",
                self.position,
            ));
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    /// Check if current token matches and consume it
    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Check if current token is an operator with given value
    fn match_operator(&mut self, op: &str) -> bool {
        if let Some(Token::Operator(s)) = self.peek() {
            if s == op {
                self.advance();
                return true;
            }
        }
        false
    }

    /// Check if current token is any of the given binary operators
    fn match_any_operator(&mut self, ops: &[&str]) -> Option<BinOp> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = BinOp::from_symbol(s);
                self.advance();
                return op;
            }
        }
        None
    }

    /// Expression: term (( "+" | "-" ) term)*
    fn expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;

        while let Some(op) = self.match_any_operator(&["+", "-"]) {
            let right = self.term()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Term: unary (( "*" | "/" ) unary)*
    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;

        while let Some(op) = self.match_any_operator(&["*", "/"]) {
            let right = self.unary()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    /// Unary: ( "-" | "+" ) unary | power
    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_operator("-") {
            let operand = self.nested(Self::unary)?;
            Ok(Expr::negate(operand))
        } else if self.match_operator("+") {
            self.nested(Self::unary)
        } else {
            self.power()
        }
    }

    /// Power: primary ( "**" unary )?   (right-associative)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;

        if self.match_operator("**") {
            let exponent = self.nested(Self::unary)?;
            Ok(Expr::power(base, exponent))
        } else {
            Ok(base)
        }
    }

    /// Primary: NUMBER | IDENTIFIER | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().cloned();

        match token {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::Identifier(name)) => {
                self.advance();
                Ok(Expr::Variable(name))
            }
            Some(Token::OpenParen) => {
                self.advance();
                let expr = self.nested(Self::expression)?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }
}

/// Convenience function to parse tokens into an expression tree
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}
