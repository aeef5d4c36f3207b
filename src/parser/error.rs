use thiserror::Error;

use crate::lexer::TokenKind;

/// An error produced while parsing the token stream.
#[derive(Debug, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: u32,
}
impl ParseError {
    pub fn new(kind: ParseErrorKind, line: u32) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: TokenKind },
    #[error("expected {0}, found end of input")]
    UnexpectedEnd(String),
    #[error("array dimension must be an integer literal")]
    BadArrayDimension,
}
