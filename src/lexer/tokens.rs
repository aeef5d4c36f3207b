//! Tokens, as produced by the lexer.
use std::fmt::{self, Display};

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}
impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier(String),
    Literal(i32),
    Symbol(Symbol),
}
impl Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Keyword(kw) => write!(f, "{:?}", kw),
            Self::Identifier(id) => write!(f, "identifier '{}'", id),
            Self::Literal(value) => write!(f, "literal {}", value),
            Self::Symbol(sym) => write!(f, "'{}'", sym),
        }
    }
}

/// A reserved keyword.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Int,
    Struct,
    Return,
    If,
    Else,
    While,
}

/// A symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Symbol {
    Plus,
    Minus,
    Asterisk,
    Slash,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    Assign,
    DoubleAmp,
    DoublePipe,
    Bang,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Semicolon,
    Period,
}
impl Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Assign => "=",
            Self::DoubleAmp => "&&",
            Self::DoublePipe => "||",
            Self::Bang => "!",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
            Self::OpenBracket => "[",
            Self::CloseBracket => "]",
            Self::OpenBrace => "{",
            Self::CloseBrace => "}",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Period => ".",
        };
        f.write_str(text)
    }
}
