//! Arithmetic expression evaluator for custom formulas
//!
//! Deliberately minimal: numbers, + - * /, unary minus and parentheses.
//! Placeholders are substituted with literal values before the text
//! reaches this module, so any character outside that grammar is
//! rejected. No variables, no function calls, no host access.
//!
//! Grammar:
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := NUMBER | '(' expr ')' | '-' factor
//! ```

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ExprError {
    #[error("invalid character in expression: '{0}'")]
    InvalidChar(char),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            },
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            },
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            },
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            },
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            },
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            },
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            },
            '0'..='9' | '.' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = text
                    .parse()
                    .map_err(|_| ExprError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Number(value));
            },
            other => return Err(ExprError::InvalidChar(other)),
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
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.next();
                    value += self.term()?;
                },
                Token::Minus => {
                    self.next();
                    value -= self.term()?;
                },
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.next();
                    value *= self.factor()?;
                },
                Token::Slash => {
                    self.next();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    value /= divisor;
                },
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, ExprError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    Some(other) => Err(ExprError::UnexpectedToken(format!("{:?}", other))),
                    None => Err(ExprError::UnexpectedEnd),
                }
            },
            Some(other) => Err(ExprError::UnexpectedToken(format!("{:?}", other))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Evaluate a fully-substituted arithmetic expression
pub fn evaluate_expression(input: &str) -> Result<f64, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError::UnexpectedEnd);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ExprError::UnexpectedToken(format!("{:?}", extra)));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(evaluate_expression("1 + 2").unwrap(), 3.0);
        assert_eq!(evaluate_expression("100 - 5").unwrap(), 95.0);
        assert_eq!(evaluate_expression("4 * 2.5").unwrap(), 10.0);
        assert_eq!(evaluate_expression("9 / 2").unwrap(), 4.5);
    }

    #[test]
    fn test_precedence_and_parens() {
        assert_eq!(evaluate_expression("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate_expression("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate_expression("10 - 2 - 3").unwrap(), 5.0);
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(evaluate_expression("-5 + 10").unwrap(), 5.0);
        assert_eq!(evaluate_expression("3 * (-2)").unwrap(), -6.0);
        assert_eq!(evaluate_expression("--4").unwrap(), 4.0);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(evaluate_expression("1 / 0").unwrap_err(), ExprError::DivisionByZero);
        assert_eq!(evaluate_expression("5 / (3 - 3)").unwrap_err(), ExprError::DivisionByZero);
    }

    #[test]
    fn test_rejects_anything_but_arithmetic() {
        assert!(matches!(
            evaluate_expression("1 + {employees.total}"),
            Err(ExprError::InvalidChar('{'))
        ));
        assert!(matches!(evaluate_expression("system('ls')"), Err(ExprError::InvalidChar('s'))));
        assert!(matches!(evaluate_expression("1; 2"), Err(ExprError::InvalidChar(';'))));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(evaluate_expression("").unwrap_err(), ExprError::UnexpectedEnd);
        assert_eq!(evaluate_expression("1 +").unwrap_err(), ExprError::UnexpectedEnd);
        assert_eq!(evaluate_expression("(1 + 2").unwrap_err(), ExprError::UnexpectedEnd);
        assert!(matches!(evaluate_expression("1 2"), Err(ExprError::UnexpectedToken(_))));
        assert!(matches!(evaluate_expression("1.2.3"), Err(ExprError::InvalidNumber(_))));
    }
}
