//! Tokenizer and recursive-descent parser for textual beta-function
//! expressions such as `-41/6*g1**3 + tr(adjoint(Yu)*Yu)*g1`.
//!
//! Conjugate coupling names keep their suffix (`yt^*`, `yt^{*}`), so `^*`
//! directly after an identifier is part of the name rather than a power.

use std::str::FromStr;

use rge_core::{ErrorInfo, RgeError};

use crate::expr::{Expr, Func};

fn parse_error(message: impl Into<String>, position: usize) -> RgeError {
    RgeError::Expression(ErrorInfo::new("parse", message).with_context("position", position))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Symbol(char),
    Pow,
}

/// Parses a textual expression into an [`Expr`] over symbol names.
pub fn parse(input: &str) -> Result<Expr, RgeError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(parse_error("unexpected trailing input", parser.tokens[parser.pos].1)
            .with_context("input", input));
    }
    Ok(expr)
}

impl FromStr for Expr {
    type Err = RgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '{' | '}')
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, RgeError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        if ch.is_whitespace() {
            idx += 1;
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && chars.get(idx + 1).is_some_and(|c| c.is_ascii_digit())) {
            let start = idx;
            while idx < chars.len() && (chars[idx].is_ascii_digit() || chars[idx] == '.') {
                idx += 1;
            }
            if idx < chars.len() && matches!(chars[idx], 'e' | 'E') {
                let mut lookahead = idx + 1;
                if lookahead < chars.len() && matches!(chars[lookahead], '+' | '-') {
                    lookahead += 1;
                }
                if lookahead < chars.len() && chars[lookahead].is_ascii_digit() {
                    idx = lookahead;
                    while idx < chars.len() && chars[idx].is_ascii_digit() {
                        idx += 1;
                    }
                }
            }
            let text: String = chars[start..idx].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| parse_error(format!("invalid number '{text}'"), start))?;
            tokens.push((Token::Number(value), start));
            continue;
        }

        if is_ident_start(ch) {
            let start = idx;
            while idx < chars.len() && is_ident_char(chars[idx]) {
                idx += 1;
            }
            let mut name: String = chars[start..idx].iter().collect();
            if chars.get(idx) == Some(&'^') {
                if chars.get(idx + 1) == Some(&'*') {
                    name.push_str("^*");
                    idx += 2;
                } else if chars[idx..].starts_with(&['^', '{', '*', '}']) {
                    name.push_str("^{*}");
                    idx += 4;
                }
            }
            tokens.push((Token::Ident(name), start));
            continue;
        }

        if ch == '*' && chars.get(idx + 1) == Some(&'*') {
            tokens.push((Token::Pow, idx));
            idx += 2;
            continue;
        }

        if ch == '^' {
            tokens.push((Token::Pow, idx));
            idx += 1;
            continue;
        }

        if matches!(ch, '+' | '-' | '*' | '/' | '(' | ')') {
            tokens.push((Token::Symbol(ch), idx));
            idx += 1;
            continue;
        }

        return Err(parse_error(format!("unexpected character '{ch}'"), idx));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, at)| *at)
            .unwrap_or(0)
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), RgeError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(parse_error(format!("expected '{symbol}'"), self.position()))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, RgeError> {
        let mut lhs = self.parse_term()?;
        loop {
            if self.eat_symbol('+') {
                lhs = lhs + self.parse_term()?;
            } else if self.eat_symbol('-') {
                lhs = lhs - self.parse_term()?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_term(&mut self) -> Result<Expr, RgeError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.eat_symbol('*') {
                lhs = lhs * self.parse_unary()?;
            } else if self.eat_symbol('/') {
                lhs = lhs / self.parse_unary()?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, RgeError> {
        if self.eat_symbol('-') {
            return Ok(-self.parse_unary()?);
        }
        if self.eat_symbol('+') {
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, RgeError> {
        let base = self.parse_atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.parse_unary()?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, RgeError> {
        let at = self.position();
        let token = self
            .tokens
            .get(self.pos)
            .map(|(token, _)| token.clone())
            .ok_or_else(|| parse_error("unexpected end of input", at))?;
        self.pos += 1;
        match token {
            Token::Number(value) => Ok(Expr::Num(value)),
            Token::Symbol('(') => {
                let inner = self.parse_expr()?;
                self.expect_symbol(')')?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.eat_symbol('(') {
                    let func = Func::from_name(&name).ok_or_else(|| {
                        parse_error(format!("unknown function '{name}'"), at)
                    })?;
                    let arg = self.parse_expr()?;
                    self.expect_symbol(')')?;
                    return Ok(arg.call(func));
                }
                Ok(match name.as_str() {
                    "pi" => Expr::Pi,
                    "I" => Expr::Imag,
                    _ => Expr::Sym(name),
                })
            }
            other => Err(parse_error(format!("unexpected token {other:?}"), at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjugate_suffixes_stay_in_names() {
        let tokens = tokenize("yt^* * yt^{*} + g^2").unwrap();
        let names: Vec<_> = tokens
            .iter()
            .filter_map(|(token, _)| match token {
                Token::Ident(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["yt^*", "yt^{*}", "g"]);
        assert!(tokens.iter().any(|(token, _)| *token == Token::Pow));
    }

    #[test]
    fn scientific_numbers_tokenize() {
        let tokens = tokenize("1.5e-3*x").unwrap();
        assert_eq!(tokens[0].0, Token::Number(1.5e-3));
    }
}
