//! Formula tokenizer
//!
//! Converts the right-hand side of a conversion formula like
//! "kilometers per hour * 0.621371" into a sequence of tokens that can be
//! parsed into an expression tree.

use std::iter::Peekable;
use std::str::Chars;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, .5, 1.5e10)
    Number(f64),
    /// A unit symbol. Multi-word names are joined with `_` and lower-cased.
    Identifier(String),
    /// Arithmetic operators: + - * / **
    Operator(String),
    /// Opening parenthesis
    OpenParen,
    /// Closing parenthesis
    CloseParen,
}

/// Error during tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer for the given expression string
    pub fn new(expression: &'a str) -> Self {
        Self {
            chars: expression.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire expression into a vector of tokens
    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Get the next token, or None if at end of input
    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        self.skip_whitespace();

        match self.peek() {
            None => Ok(None),
            Some(c) => {
                let token = match c {
                    '(' => {
                        self.advance();
                        Token::OpenParen
                    }
                    ')' => {
                        self.advance();
                        Token::CloseParen
                    }

                    '+' | '-' | '/' | '÷' => {
                        self.advance();
                        let op = if c == '÷' { '/' } else { c };
                        Token::Operator(op.to_string())
                    }

                    // '*' or '**'
                    '*' => self.read_star_operator(),

                    // Aliases
                    '×' | '·' => {
                        self.advance();
                        Token::Operator("*".to_string())
                    }
                    '^' => {
                        self.advance();
                        Token::Operator("**".to_string())
                    }

                    c if c.is_ascii_digit() || c == '.' => self.read_number()?,

                    c if c.is_alphabetic() || c == '_' => self.read_identifier(),

                    c => {
                        return Err(TokenizeError::new(
                            format!("Unexpected character: '{}'", c),
                            self.position,
                        ));
                    }
                };
                Ok(Some(token))
            }
        }
    }

    /// Peek at the next character without consuming it
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    /// Skip whitespace characters
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Consume characters while the predicate holds
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.advance();
        }
        out
    }

    fn read_star_operator(&mut self) -> Token {
        self.advance(); // consume '*'
        if self.peek() == Some('*') {
            self.advance();
            Token::Operator("**".to_string())
        } else {
            Token::Operator("*".to_string())
        }
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let mut num_str = self.take_while(|c| c.is_ascii_digit());

        if self.peek() == Some('.') {
            self.advance();
            num_str.push('.');
            num_str.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }

        // Exponent part (e.g., 1.5e10, 2E-5)
        if matches!(self.peek(), Some('e') | Some('E')) {
            num_str.push('e');
            self.advance();
            if let Some(sign) = self.peek() {
                if sign == '+' || sign == '-' {
                    num_str.push(sign);
                    self.advance();
                }
            }
            num_str.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    /// Read a unit symbol. Words separated only by whitespace belong to the
    /// same symbol, so "meters per second" becomes `meters_per_second`.
    fn read_identifier(&mut self) -> Token {
        let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
        let mut ident = self.take_while(is_word_char);

        loop {
            let mut lookahead = self.chars.clone();
            let mut skipped = 0;
            while matches!(lookahead.peek(), Some(c) if c.is_whitespace()) {
                lookahead.next();
                skipped += 1;
            }

            match lookahead.peek() {
                Some(&c) if skipped > 0 && (c.is_alphabetic() || c == '_') => {
                    for _ in 0..skipped {
                        self.advance();
                    }
                    ident.push('_');
                    ident.push_str(&self.take_while(is_word_char));
                }
                _ => break,
            }
        }

        Token::Identifier(ident.to_lowercase())
    }
}

/// Convenience function to tokenize an expression string
pub fn tokenize(expression: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(expression).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Token {
        Token::Identifier(name.to_string())
    }

    fn op(symbol: &str) -> Token {
        Token::Operator(symbol.to_string())
    }

    #[test]
    fn test_tokenize_simple_number() {
        let tokens = tokenize("42").unwrap();
        assert_eq!(tokens, vec![Token::Number(42.0)]);
    }

    #[test]
    fn test_tokenize_decimal_number() {
        assert_eq!(tokenize("3.567").unwrap(), vec![Token::Number(3.567)]);
        assert_eq!(tokenize(".5").unwrap(), vec![Token::Number(0.5)]);
    }

    #[test]
    fn test_tokenize_scientific_notation() {
        let tokens = tokenize("1.5e10").unwrap();
        assert_eq!(tokens, vec![Token::Number(1.5e10)]);

        let tokens = tokenize("2E-5").unwrap();
        assert_eq!(tokens, vec![Token::Number(2e-5)]);
    }

    #[test]
    fn test_tokenize_identifier_lowercased() {
        let tokens = tokenize("Meters").unwrap();
        assert_eq!(tokens, vec![ident("meters")]);
    }

    #[test]
    fn test_tokenize_multi_word_identifier() {
        let tokens = tokenize("kilometers per  hour * 0.621371").unwrap();
        assert_eq!(
            tokens,
            vec![
                ident("kilometers_per_hour"),
                op("*"),
                Token::Number(0.621371),
            ]
        );
    }

    #[test]
    fn test_tokenize_identifier_with_digits() {
        let tokens = tokenize("m2 / 10").unwrap();
        assert_eq!(tokens, vec![ident("m2"), op("/"), Token::Number(10.0)]);
    }

    #[test]
    fn test_tokenize_all_operators() {
        let tokens = tokenize("+ - * / **").unwrap();
        assert_eq!(tokens, vec![op("+"), op("-"), op("*"), op("/"), op("**")]);
    }

    #[test]
    fn test_tokenize_operator_aliases() {
        let tokens = tokenize("a × 2 ÷ 3 ^ 2").unwrap();
        assert_eq!(
            tokens,
            vec![
                ident("a"),
                op("*"),
                Token::Number(2.0),
                op("/"),
                Token::Number(3.0),
                op("**"),
                Token::Number(2.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_parentheses() {
        let tokens = tokenize("(fahrenheit - 32) * 5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::OpenParen,
                ident("fahrenheit"),
                op("-"),
                Token::Number(32.0),
                Token::CloseParen,
                op("*"),
                Token::Number(5.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_negative_number_as_operator() {
        // Minus is always an operator - the parser handles unary minus
        let tokens = tokenize("-5").unwrap();
        assert_eq!(tokens, vec![op("-"), Token::Number(5.0)]);
    }

    #[test]
    fn test_tokenize_empty_string() {
        assert_eq!(tokenize("").unwrap(), vec![]);
        assert_eq!(tokenize("   ").unwrap(), vec![]);
    }

    #[test]
    fn test_tokenize_error_unexpected_char() {
        let result = tokenize("meters % 3");
        let err = result.unwrap_err();
        assert!(err.message.contains("Unexpected"));
        assert_eq!(err.position, 7);
    }

    #[test]
    fn test_tokenize_error_lone_dot() {
        let err = tokenize(". * 2").unwrap_err();
        assert!(err.message.contains("Invalid number"));
    }
}
