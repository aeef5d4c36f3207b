use thiserror::Error;

/// An error produced while scanning the source text.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: u32,
}
impl LexError {
    pub fn new(kind: LexErrorKind, line: u32) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("invalid integer literal: {0}")]
    IntegerLiteral(String),
    #[error("unterminated block comment")]
    UnterminatedComment,
}
