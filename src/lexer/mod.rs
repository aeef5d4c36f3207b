//! Lexical analysis: source text to token stream.
mod error;
mod tokens;

pub use error::*;
pub use tokens::*;

use std::iter::Peekable;
use std::str::Chars;

/// Scan the source text into a token stream.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
    tokens: Vec<Token>,
}
impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            tokens: vec![],
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(&ch) = self.chars.peek() {
            match ch {
                '\n' => {
                    self.line += 1;
                    self.advance();
                }
                c if c.is_whitespace() => {
                    self.advance();
                }
                c if c.is_ascii_digit() => self.lex_number()?,
                c if c.is_ascii_alphabetic() || c == '_' => self.lex_word(),
                '/' => {
                    self.advance();
                    match self.chars.peek() {
                        Some('/') => self.skip_line_comment(),
                        Some('*') => self.skip_block_comment()?,
                        _ => self.push(TokenKind::Symbol(Symbol::Slash)),
                    }
                }
                _ => self.lex_symbol()?,
            }
        }
        Ok(self.tokens)
    }

    fn lex_number(&mut self) -> Result<(), LexError> {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            i32::from_str_radix(hex, 16)
        } else {
            text.parse()
        };
        match parsed {
            Ok(value) => {
                self.push(TokenKind::Literal(value));
                Ok(())
            }
            Err(_) => Err(LexError::new(LexErrorKind::IntegerLiteral(text), self.line)),
        }
    }

    fn lex_word(&mut self) {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = match word.as_str() {
            "int" => TokenKind::Keyword(Keyword::Int),
            "struct" => TokenKind::Keyword(Keyword::Struct),
            "return" => TokenKind::Keyword(Keyword::Return),
            "if" => TokenKind::Keyword(Keyword::If),
            "else" => TokenKind::Keyword(Keyword::Else),
            "while" => TokenKind::Keyword(Keyword::While),
            _ => TokenKind::Identifier(word),
        };
        self.push(kind);
    }

    fn lex_symbol(&mut self) -> Result<(), LexError> {
        use Symbol::*;

        let ch = self.advance().expect("symbol character was peeked");
        let symbol = match ch {
            '+' => Plus,
            '-' => Minus,
            '*' => Asterisk,
            '.' => Period,
            ',' => Comma,
            ';' => Semicolon,
            '(' => OpenParen,
            ')' => CloseParen,
            '[' => OpenBracket,
            ']' => CloseBracket,
            '{' => OpenBrace,
            '}' => CloseBrace,
            '<' => self.with_eq(Lte, Lt),
            '>' => self.with_eq(Gte, Gt),
            '=' => self.with_eq(Eq, Assign),
            '!' => self.with_eq(Neq, Bang),
            '&' if self.eat('&') => DoubleAmp,
            '|' if self.eat('|') => DoublePipe,
            other => {
                return Err(LexError::new(
                    LexErrorKind::UnexpectedCharacter(other),
                    self.line,
                ))
            }
        };
        self.push(TokenKind::Symbol(symbol));
        Ok(())
    }

    /// Select between a two-character symbol ending in `=` and its
    /// one-character prefix.
    fn with_eq(&mut self, matched: Symbol, fallback: Symbol) -> Symbol {
        if self.eat('=') {
            matched
        } else {
            fallback
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        self.advance(); // consume the '*'
        let mut prev = '\0';
        for c in self.chars.by_ref() {
            if c == '\n' {
                self.line += 1;
            }
            if prev == '*' && c == '/' {
                return Ok(());
            }
            prev = c;
        }
        Err(LexError::new(LexErrorKind::UnterminatedComment, self.line))
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers_are_distinguished() {
        assert_eq!(
            kinds("int inty"),
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Identifier("inty".to_string()),
            ]
        );
    }

    #[test]
    fn two_character_symbols_take_precedence() {
        assert_eq!(
            kinds("<= < == = !x"),
            vec![
                TokenKind::Symbol(Symbol::Lte),
                TokenKind::Symbol(Symbol::Lt),
                TokenKind::Symbol(Symbol::Eq),
                TokenKind::Symbol(Symbol::Assign),
                TokenKind::Symbol(Symbol::Bang),
                TokenKind::Identifier("x".to_string()),
            ]
        );
    }

    #[test]
    fn hex_literals_are_decoded() {
        assert_eq!(kinds("0x1F"), vec![TokenKind::Literal(31)]);
    }

    #[test]
    fn malformed_literal_is_rejected() {
        let err = lex("123abc").unwrap_err();
        assert_eq!(
            err.kind,
            LexErrorKind::IntegerLiteral("123abc".to_string())
        );
    }

    #[test]
    fn interior_whitespace_is_skipped() {
        let tokens = lex("int\ta ;\r\n  int b ;").unwrap();
        let names: Vec<_> = tokens.iter().map(|t| &t.kind).collect();
        assert_eq!(tokens.len(), 6);
        assert_eq!(*names[1], TokenKind::Identifier("a".to_string()));
        assert_eq!(tokens[3].line, 2);
    }

    #[test]
    fn comments_are_skipped_and_lines_counted() {
        let tokens = lex("// nothing\n/* multi\nline */ x").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn stray_character_is_reported_with_line() {
        let err = lex("int a;\n@").unwrap_err();
        assert_eq!(err, LexError::new(LexErrorKind::UnexpectedCharacter('@'), 2));
    }
}
