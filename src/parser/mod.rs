//! Syntactic analysis: token stream to syntax tree.
mod error;
pub mod syntax_tree;

pub use error::*;
pub use syntax_tree::*;

use crate::lexer::{Keyword, Symbol, Token, TokenKind};

/// Parse a token stream into a program.
pub fn parse(tokens: &[Token]) -> Result<Program, ParseError> {
    Parser::new(tokens).parse_program()
}

struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
}
impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut defs = vec![];
        while self.peek().is_some() {
            defs.push(self.parse_ext_def()?);
        }
        Ok(Program { defs })
    }

    fn parse_ext_def(&mut self) -> Result<ExtDef, ParseError> {
        let line = self.line();
        let spec = self.parse_specifier()?;

        if self.eat_symbol(Symbol::Semicolon) {
            return Ok(ExtDef::TypeDef { spec, line });
        }

        let name = self.expect_identifier()?;
        if self.eat_symbol(Symbol::OpenParen) {
            let params = self.parse_param_list()?;
            self.expect_symbol(Symbol::OpenBrace)?;
            let body = self.parse_block()?;
            return Ok(ExtDef::Function {
                spec,
                name,
                params,
                body,
                line,
            });
        }

        let decs = self.parse_dec_list(name, line)?;
        self.expect_symbol(Symbol::Semicolon)?;
        Ok(ExtDef::GlobalVars { spec, decs, line })
    }

    fn parse_specifier(&mut self) -> Result<TypeSpec, ParseError> {
        if self.eat_keyword(Keyword::Int) {
            return Ok(TypeSpec::Int);
        }
        self.expect_keyword(Keyword::Struct)?;

        let name = match self.peek_kind() {
            Some(TokenKind::Identifier(id)) => {
                let id = id.clone();
                self.advance();
                Some(id)
            }
            _ => None,
        };

        let fields = if self.eat_symbol(Symbol::OpenBrace) {
            let mut fields = vec![];
            while !self.eat_symbol(Symbol::CloseBrace) {
                let line = self.line();
                let spec = self.parse_specifier()?;
                let first = self.expect_identifier()?;
                let decs = self.parse_dec_list(first, line)?;
                self.expect_symbol(Symbol::Semicolon)?;
                fields.push(FieldDef { spec, decs, line });
            }
            Some(fields)
        } else {
            None
        };

        if name.is_none() && fields.is_none() {
            return Err(self.unexpected("a struct name or body".to_string()));
        }
        Ok(TypeSpec::Struct { name, fields })
    }

    fn parse_param_list(&mut self) -> Result<Vec<ParamDec>, ParseError> {
        let mut params = vec![];
        if self.eat_symbol(Symbol::CloseParen) {
            return Ok(params);
        }
        loop {
            let spec = self.parse_specifier()?;
            let dec = self.parse_var_dec()?;
            params.push(ParamDec { spec, dec });
            if !self.eat_symbol(Symbol::Comma) {
                break;
            }
        }
        self.expect_symbol(Symbol::CloseParen)?;
        Ok(params)
    }

    /// Parse the remaining declarators of a definition, the first declared
    /// name having been consumed already.
    fn parse_dec_list(&mut self, first: String, line: u32) -> Result<Vec<VarDec>, ParseError> {
        let mut decs = vec![self.parse_dec_tail(first, line)?];
        while self.eat_symbol(Symbol::Comma) {
            let line = self.line();
            let name = self.expect_identifier()?;
            decs.push(self.parse_dec_tail(name, line)?);
        }
        Ok(decs)
    }

    fn parse_var_dec(&mut self) -> Result<VarDec, ParseError> {
        let line = self.line();
        let name = self.expect_identifier()?;
        self.parse_dec_tail(name, line)
    }

    fn parse_dec_tail(&mut self, name: String, line: u32) -> Result<VarDec, ParseError> {
        let mut dims = vec![];
        while self.eat_symbol(Symbol::OpenBracket) {
            let dim = match self.next()? {
                Token {
                    kind: TokenKind::Literal(value),
                    ..
                } if *value >= 0 => *value as u32,
                token => {
                    return Err(ParseError::new(
                        ParseErrorKind::BadArrayDimension,
                        token.line,
                    ))
                }
            };
            dims.push(dim);
            self.expect_symbol(Symbol::CloseBracket)?;
        }

        let init = if self.eat_symbol(Symbol::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(VarDec {
            name,
            dims,
            init,
            line,
        })
    }

    /// Parse a compound statement; the opening brace has been consumed.
    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let mut defs = vec![];
        while matches!(
            self.peek_kind(),
            Some(TokenKind::Keyword(Keyword::Int | Keyword::Struct))
        ) {
            let line = self.line();
            let spec = self.parse_specifier()?;
            let first = self.expect_identifier()?;
            let decs = self.parse_dec_list(first, line)?;
            self.expect_symbol(Symbol::Semicolon)?;
            defs.push(Def { spec, decs, line });
        }

        let mut stmts = vec![];
        while !self.eat_symbol(Symbol::CloseBrace) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(Block { defs, stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        if self.eat_symbol(Symbol::OpenBrace) {
            return Ok(Stmt::Block(self.parse_block()?));
        }
        if self.eat_keyword(Keyword::Return) {
            let value = self.parse_expr()?;
            self.expect_symbol(Symbol::Semicolon)?;
            return Ok(Stmt::Return { value, line });
        }
        if self.eat_keyword(Keyword::If) {
            self.expect_symbol(Symbol::OpenParen)?;
            let cond = self.parse_expr()?;
            self.expect_symbol(Symbol::CloseParen)?;
            let then = Box::new(self.parse_stmt()?);
            let otherwise = if self.eat_keyword(Keyword::Else) {
                Some(Box::new(self.parse_stmt()?))
            } else {
                None
            };
            return Ok(Stmt::If {
                cond,
                then,
                otherwise,
            });
        }
        if self.eat_keyword(Keyword::While) {
            self.expect_symbol(Symbol::OpenParen)?;
            let cond = self.parse_expr()?;
            self.expect_symbol(Symbol::CloseParen)?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::While { cond, body });
        }

        let expr = self.parse_expr()?;
        self.expect_symbol(Symbol::Semicolon)?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    /// Assignment is right-associative and binds loosest.
    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_or()?;
        if self.eat_symbol(Symbol::Assign) {
            let line = lhs.line;
            let rhs = self.parse_assignment()?;
            return Ok(Expr {
                kind: ExprKind::Assign(Box::new(lhs), Box::new(rhs)),
                line,
            });
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat_symbol(Symbol::DoublePipe) {
            let line = lhs.line;
            let rhs = self.parse_and()?;
            lhs = Expr {
                kind: ExprKind::Or(Box::new(lhs), Box::new(rhs)),
                line,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_relational()?;
        while self.eat_symbol(Symbol::DoubleAmp) {
            let line = lhs.line;
            let rhs = self.parse_relational()?;
            lhs = Expr {
                kind: ExprKind::And(Box::new(lhs), Box::new(rhs)),
                line,
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        while let Some(relop) = self.peek_relop() {
            self.advance();
            let line = lhs.line;
            let rhs = self.parse_additive()?;
            lhs = Expr {
                kind: ExprKind::Compare(relop, Box::new(lhs), Box::new(rhs)),
                line,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_symbol(Symbol::Plus) {
                BinOp::Add
            } else if self.eat_symbol(Symbol::Minus) {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let line = lhs.line;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                line,
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat_symbol(Symbol::Asterisk) {
                BinOp::Mul
            } else if self.eat_symbol(Symbol::Slash) {
                BinOp::Div
            } else {
                return Ok(lhs);
            };
            let line = lhs.line;
            let rhs = self.parse_unary()?;
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                line,
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        if self.eat_symbol(Symbol::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Negate(Box::new(operand)),
                line,
            });
        }
        if self.eat_symbol(Symbol::Bang) {
            let operand = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Not(Box::new(operand)),
                line,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_symbol(Symbol::OpenBracket) {
                let index = self.parse_expr()?;
                self.expect_symbol(Symbol::CloseBracket)?;
                let line = expr.line;
                expr = Expr {
                    kind: ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                };
            } else if self.eat_symbol(Symbol::Period) {
                let field = self.expect_identifier()?;
                let line = expr.line;
                expr = Expr {
                    kind: ExprKind::Member {
                        base: Box::new(expr),
                        field,
                    },
                    line,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.next()?;
        let line = token.line;
        match &token.kind {
            TokenKind::Literal(value) => Ok(Expr {
                kind: ExprKind::Literal(*value),
                line,
            }),
            TokenKind::Identifier(name) => {
                let name = name.clone();
                if self.eat_symbol(Symbol::OpenParen) {
                    let mut args = vec![];
                    if !self.eat_symbol(Symbol::CloseParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat_symbol(Symbol::Comma) {
                                break;
                            }
                        }
                        self.expect_symbol(Symbol::CloseParen)?;
                    }
                    Ok(Expr {
                        kind: ExprKind::Call { name, args },
                        line,
                    })
                } else {
                    Ok(Expr {
                        kind: ExprKind::Identifier(name),
                        line,
                    })
                }
            }
            TokenKind::Symbol(Symbol::OpenParen) => {
                let expr = self.parse_expr()?;
                self.expect_symbol(Symbol::CloseParen)?;
                Ok(expr)
            }
            other => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    expected: "an expression".to_string(),
                    found: other.clone(),
                },
                line,
            )),
        }
    }

    fn peek_relop(&self) -> Option<Relop> {
        match self.peek_kind() {
            Some(TokenKind::Symbol(Symbol::Lt)) => Some(Relop::Lt),
            Some(TokenKind::Symbol(Symbol::Lte)) => Some(Relop::Lte),
            Some(TokenKind::Symbol(Symbol::Gt)) => Some(Relop::Gt),
            Some(TokenKind::Symbol(Symbol::Gte)) => Some(Relop::Gte),
            Some(TokenKind::Symbol(Symbol::Eq)) => Some(Relop::Eq),
            Some(TokenKind::Symbol(Symbol::Neq)) => Some(Relop::Neq),
            _ => None,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    /// The line of the next token, or of the last token at end of input.
    fn line(&self) -> u32 {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Result<&'a Token, ParseError> {
        let token = self.tokens.get(self.position).ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::UnexpectedEnd("a token".to_string()),
                self.tokens.last().map(|t| t.line).unwrap_or(1),
            )
        })?;
        self.position += 1;
        Ok(token)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn eat_symbol(&mut self, symbol: Symbol) -> bool {
        if self.peek_kind() == Some(&TokenKind::Symbol(symbol)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek_kind() == Some(&TokenKind::Keyword(keyword)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: Symbol) -> Result<(), ParseError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(format!("'{}'", symbol)))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(format!("{:?}", keyword)))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(id)) => {
                let id = id.clone();
                self.advance();
                Ok(id)
            }
            _ => Err(self.unexpected("an identifier".to_string())),
        }
    }

    fn unexpected(&self, expected: String) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    expected,
                    found: token.kind.clone(),
                },
                token.line,
            ),
            None => ParseError::new(
                ParseErrorKind::UnexpectedEnd(expected),
                self.tokens.last().map(|t| t.line).unwrap_or(1),
            ),
        }
    }
}
