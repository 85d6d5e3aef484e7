//! Recursive-descent parser for the placement expression DSL.
//!
//! Precedence, low to high: `||`, `&&`, `+ -`, `* /`, `^` (right
//! associative). Calls and literals bind tightest.
use super::lexer::{Token, TokenKind, lex};
use crate::error::PlacementError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfixOp {
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// A parsed expression node, carrying the verbatim source text it was
/// parsed from so evaluation errors can quote the offending
/// sub-expression.
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub text: String,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Ident(String),
    Call(String, Vec<Expr>),
    Infix(InfixOp, Box<Expr>, Box<Expr>),
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

/// Parses a complete expression, erroring if trailing tokens remain.
pub fn parse(src: &str) -> Result<Expr, PlacementError> {
    let tokens = lex(src)?;
    let mut parser = Parser { src, tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if !matches!(parser.peek().kind, TokenKind::Eof) {
        return Err(PlacementError::parse(src, "unexpected trailing tokens"));
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn span_text(&self, start: usize, end: usize) -> String {
        self.src[start..end].to_string()
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, PlacementError> {
        if std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind) {
            Ok(self.advance())
        } else {
            Err(PlacementError::parse(
                self.src,
                format!("expected {kind:?}, found {:?}", self.peek().kind),
            ))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, PlacementError> {
        let start = self.peek().start;
        let mut lhs = self.parse_and()?;
        while matches!(self.peek().kind, TokenKind::OrOr) {
            self.advance();
            let rhs = self.parse_and()?;
            let end = self.tokens[self.pos - 1].end;
            lhs = Expr {
                text: self.span_text(start, end),
                kind: ExprKind::Infix(InfixOp::Or, Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, PlacementError> {
        let start = self.peek().start;
        let mut lhs = self.parse_add()?;
        while matches!(self.peek().kind, TokenKind::AndAnd) {
            self.advance();
            let rhs = self.parse_add()?;
            let end = self.tokens[self.pos - 1].end;
            lhs = Expr {
                text: self.span_text(start, end),
                kind: ExprKind::Infix(InfixOp::And, Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, PlacementError> {
        let start = self.peek().start;
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => InfixOp::Add,
                TokenKind::Minus => InfixOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            let end = self.tokens[self.pos - 1].end;
            lhs = Expr {
                text: self.span_text(start, end),
                kind: ExprKind::Infix(op, Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, PlacementError> {
        let start = self.peek().start;
        let mut lhs = self.parse_pow()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => InfixOp::Mul,
                TokenKind::Slash => InfixOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_pow()?;
            let end = self.tokens[self.pos - 1].end;
            lhs = Expr {
                text: self.span_text(start, end),
                kind: ExprKind::Infix(op, Box::new(lhs), Box::new(rhs)),
            };
        }
        Ok(lhs)
    }

    /// Right-associative: `a ^ b ^ c` parses as `a ^ (b ^ c)`.
    fn parse_pow(&mut self) -> Result<Expr, PlacementError> {
        let start = self.peek().start;
        let lhs = self.parse_primary()?;
        if matches!(self.peek().kind, TokenKind::Caret) {
            self.advance();
            let rhs = self.parse_pow()?;
            let end = self.tokens[self.pos - 1].end;
            return Ok(Expr {
                text: self.span_text(start, end),
                kind: ExprKind::Infix(InfixOp::Pow, Box::new(lhs), Box::new(rhs)),
            });
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, PlacementError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr { text: self.span_text(tok.start, tok.end), kind: ExprKind::Int(v) })
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr { text: self.span_text(tok.start, tok.end), kind: ExprKind::Float(v) })
            }
            TokenKind::Str(ref s) => {
                self.advance();
                Ok(Expr { text: self.span_text(tok.start, tok.end), kind: ExprKind::Str(s.clone()) })
            }
            TokenKind::Bytes(ref b) => {
                self.advance();
                Ok(Expr { text: self.span_text(tok.start, tok.end), kind: ExprKind::Bytes(b.clone()) })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                let close = self.expect(&TokenKind::RParen)?;
                Ok(Expr { text: self.span_text(tok.start, close.end), kind: inner.kind })
            }
            TokenKind::Ident(ref name) => {
                self.advance();
                if matches!(self.peek().kind, TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek().kind, TokenKind::RParen) {
                        loop {
                            args.push(self.parse_or()?);
                            if matches!(self.peek().kind, TokenKind::Comma) {
                                self.advance();
                                continue;
                            }
                            break;
                        }
                    }
                    let close = self.expect(&TokenKind::RParen)?;
                    Ok(Expr {
                        text: self.span_text(tok.start, close.end),
                        kind: ExprKind::Call(name.clone(), args),
                    })
                } else {
                    Ok(Expr { text: self.span_text(tok.start, tok.end), kind: ExprKind::Ident(name.clone()) })
                }
            }
            other => Err(PlacementError::parse(self.src, format!("unexpected token {other:?}"))),
        }
    }
}
