//! Tokenizer for the placement expression DSL.
use crate::error::PlacementError;

/// A lexical token, paired with the byte span it occupies in the source
/// text so [`crate::expr::parser`] can reconstruct verbatim sub-expressions
/// for error messages.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    LParen,
    RParen,
    Comma,
    AndAnd,
    OrOr,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Eof,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Splits `src` into tokens, failing on the first unrecognized character.
pub fn lex(src: &str) -> Result<Vec<Token>, PlacementError> {
    let bytes = src.as_bytes();
    let mut pos = 0usize;
    let mut tokens = Vec::new();

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let kind = match c {
            '(' => {
                pos += 1;
                TokenKind::LParen
            }
            ')' => {
                pos += 1;
                TokenKind::RParen
            }
            ',' => {
                pos += 1;
                TokenKind::Comma
            }
            '+' => {
                pos += 1;
                TokenKind::Plus
            }
            '-' => {
                pos += 1;
                TokenKind::Minus
            }
            '*' => {
                pos += 1;
                TokenKind::Star
            }
            '/' => {
                pos += 1;
                TokenKind::Slash
            }
            '^' => {
                pos += 1;
                TokenKind::Caret
            }
            '&' if bytes.get(pos + 1) == Some(&b'&') => {
                pos += 2;
                TokenKind::AndAnd
            }
            '|' if bytes.get(pos + 1) == Some(&b'|') => {
                pos += 2;
                TokenKind::OrOr
            }
            '"' => {
                let (s, next) = lex_string(src, pos + 1)?;
                pos = next;
                TokenKind::Str(s)
            }
            'b' if bytes.get(pos + 1) == Some(&b'"') => {
                let (s, next) = lex_string(src, pos + 2)?;
                pos = next;
                TokenKind::Bytes(s.into_bytes())
            }
            c if c.is_ascii_digit() => {
                let (kind, next) = lex_number(src, pos)?;
                pos = next;
                kind
            }
            c if c.is_alphabetic() || c == '_' => {
                let next = lex_ident_end(src, pos);
                let ident = src[pos..next].to_string();
                pos = next;
                TokenKind::Ident(ident)
            }
            other => {
                return Err(PlacementError::parse(
                    src,
                    format!("unexpected character {other:?} at byte {pos}"),
                ));
            }
        };
        tokens.push(Token { kind, start, end: pos });
    }
    tokens.push(Token { kind: TokenKind::Eof, start: bytes.len(), end: bytes.len() });
    Ok(tokens)
}

fn lex_ident_end(src: &str, start: usize) -> usize {
    let bytes = src.as_bytes();
    let mut pos = start;
    while pos < bytes.len() {
        let c = bytes[pos] as char;
        if c.is_alphanumeric() || c == '_' {
            pos += 1;
        } else {
            break;
        }
    }
    pos
}

fn lex_number(src: &str, start: usize) -> Result<(TokenKind, usize), PlacementError> {
    let bytes = src.as_bytes();
    let mut pos = start;
    let mut is_float = false;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'.') && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) {
        is_float = true;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    let text = &src[start..pos];
    if is_float {
        let v: f64 = text
            .parse()
            .map_err(|_| PlacementError::parse(src, format!("bad float literal {text:?}")))?;
        Ok((TokenKind::Float(v), pos))
    } else {
        let v: i64 = text
            .parse()
            .map_err(|_| PlacementError::parse(src, format!("bad integer literal {text:?}")))?;
        Ok((TokenKind::Int(v), pos))
    }
}

/// Lexes a double-quoted string body starting just after the opening
/// quote, supporting `\"`, `\\`, `\n`, `\t` escapes. Returns the decoded
/// body and the position just past the closing quote.
fn lex_string(src: &str, start: usize) -> Result<(String, usize), PlacementError> {
    let bytes = src.as_bytes();
    let mut pos = start;
    let mut out = String::new();
    loop {
        match bytes.get(pos) {
            None => return Err(PlacementError::parse(src, "unterminated string literal")),
            Some(b'"') => {
                pos += 1;
                return Ok((out, pos));
            }
            Some(b'\\') => {
                let escaped = bytes.get(pos + 1).copied().ok_or_else(|| {
                    PlacementError::parse(src, "unterminated escape sequence")
                })?;
                out.push(match escaped {
                    b'"' => '"',
                    b'\\' => '\\',
                    b'n' => '\n',
                    b't' => '\t',
                    other => {
                        return Err(PlacementError::parse(
                            src,
                            format!("unknown escape sequence \\{}", other as char),
                        ));
                    }
                });
                pos += 2;
            }
            Some(_) => {
                let rest = &src[pos..];
                let ch = rest.chars().next().unwrap_or('\u{0}');
                out.push(ch);
                pos += ch.len_utf8();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).expect("should lex").into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_call_with_string_and_int_args() {
        assert_eq!(
            kinds(r#"country("DE", 1)"#),
            vec![
                TokenKind::Ident("country".into()),
                TokenKind::LParen,
                TokenKind::Str("DE".into()),
                TokenKind::Comma,
                TokenKind::Int(1),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_infix_operators() {
        assert_eq!(
            kinds("a && b || c + d * e ^ f - g / h"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::AndAnd,
                TokenKind::Ident("b".into()),
                TokenKind::OrOr,
                TokenKind::Ident("c".into()),
                TokenKind::Plus,
                TokenKind::Ident("d".into()),
                TokenKind::Star,
                TokenKind::Ident("e".into()),
                TokenKind::Caret,
                TokenKind::Ident("f".into()),
                TokenKind::Minus,
                TokenKind::Ident("g".into()),
                TokenKind::Slash,
                TokenKind::Ident("h".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_float_and_byte_string() {
        assert_eq!(kinds("1.5"), vec![TokenKind::Float(1.5), TokenKind::Eof]);
        assert_eq!(
            kinds(r#"b"hi""#),
            vec![TokenKind::Bytes(b"hi".to_vec()), TokenKind::Eof]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(lex(r#""oops"#).is_err());
    }
}
