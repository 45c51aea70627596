//! Recursive-descent statement parser with Pratt expression parsing.

use crate::ast::{BinaryOp, DeclKind, Expr, FunctionBody, FunctionDef, LogicalOp, Stmt, UnaryOp};
use crate::error::{SandboxError, SandboxResult};
use crate::lexer::{Token, tokenize};
use std::ops::Range;
use std::rc::Rc;

/// Deepest statement/expression nesting accepted.
const MAX_DEPTH: usize = 128;

/// Parses a formula body into statements.
pub fn parse_program(source: &str) -> SandboxResult<Vec<Stmt>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        stream: TokenStream::new(&tokens, source.len()),
        depth: 0,
    };
    let mut program = Vec::new();
    while !parser.stream.at_end() {
        program.push(parser.parse_statement()?);
    }
    Ok(program)
}

fn syntax_error(message: impl std::fmt::Display, offset: usize) -> SandboxError {
    SandboxError::runtime(format!("SyntaxError: {message} at offset {offset}"))
}

/// Token stream with lookahead and position tracking.
pub struct TokenStream<'t> {
    tokens: &'t [(Token, Range<usize>)],
    pos: usize,
    source_len: usize,
}

impl<'t> TokenStream<'t> {
    pub fn new(tokens: &'t [(Token, Range<usize>)], source_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            source_len,
        }
    }

    pub fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    pub fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check if the current token has the same kind as `expected`.
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Consumes the current token if it matches.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, expected: Token) -> SandboxResult<()> {
        if self.eat(&expected) {
            return Ok(());
        }
        Err(match self.peek() {
            Some(found) => syntax_error(format!("expected `{expected}`, found `{found}`"), self.offset()),
            None => syntax_error(format!("expected `{expected}`, found end of input"), self.offset()),
        })
    }

    pub fn expect_ident(&mut self) -> SandboxResult<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            Some(found) => Err(syntax_error(
                format!("expected identifier, found `{found}`"),
                self.offset(),
            )),
            None => Err(syntax_error("expected identifier, found end of input", self.offset())),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Byte offset of the current token, or the source length at the end.
    pub fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.source_len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Binary operator metadata: (precedence, associativity, op). Higher binds tighter.
fn binary_op_info(token: &Token) -> Option<(u8, Assoc, InfixOp)> {
    use InfixOp::{Binary, Logical};
    match token {
        Token::QuestionQuestion => Some((1, Assoc::Left, Logical(LogicalOp::Coalesce))),
        Token::OrOr => Some((2, Assoc::Left, Logical(LogicalOp::Or))),
        Token::AndAnd => Some((3, Assoc::Left, Logical(LogicalOp::And))),
        Token::EqEq => Some((4, Assoc::Left, Binary(BinaryOp::Eq))),
        Token::BangEq => Some((4, Assoc::Left, Binary(BinaryOp::Ne))),
        Token::EqEqEq => Some((4, Assoc::Left, Binary(BinaryOp::StrictEq))),
        Token::BangEqEq => Some((4, Assoc::Left, Binary(BinaryOp::StrictNe))),
        Token::Lt => Some((5, Assoc::Left, Binary(BinaryOp::Lt))),
        Token::LtEq => Some((5, Assoc::Left, Binary(BinaryOp::Le))),
        Token::Gt => Some((5, Assoc::Left, Binary(BinaryOp::Gt))),
        Token::GtEq => Some((5, Assoc::Left, Binary(BinaryOp::Ge))),
        Token::Plus => Some((6, Assoc::Left, Binary(BinaryOp::Add))),
        Token::Minus => Some((6, Assoc::Left, Binary(BinaryOp::Sub))),
        Token::Star => Some((7, Assoc::Left, Binary(BinaryOp::Mul))),
        Token::Slash => Some((7, Assoc::Left, Binary(BinaryOp::Div))),
        Token::Percent => Some((7, Assoc::Left, Binary(BinaryOp::Rem))),
        Token::StarStar => Some((8, Assoc::Right, Binary(BinaryOp::Pow))),
        _ => None,
    }
}

fn assign_op(token: &Token) -> Option<Option<BinaryOp>> {
    match token {
        Token::Eq => Some(None),
        Token::PlusEq => Some(Some(BinaryOp::Add)),
        Token::MinusEq => Some(Some(BinaryOp::Sub)),
        Token::StarEq => Some(Some(BinaryOp::Mul)),
        Token::SlashEq => Some(Some(BinaryOp::Div)),
        Token::PercentEq => Some(Some(BinaryOp::Rem)),
        _ => None,
    }
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. })
}

struct Parser<'t> {
    stream: TokenStream<'t>,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn enter(&mut self) -> SandboxResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax_error("nesting too deep", self.stream.offset()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn unexpected(&self) -> SandboxError {
        match self.stream.peek() {
            Some(found) => syntax_error(format!("unexpected token `{found}`"), self.stream.offset()),
            None => syntax_error("unexpected end of input", self.stream.offset()),
        }
    }

    // ── Statements ───────────────────────────────────────────────

    fn parse_statement(&mut self) -> SandboxResult<Stmt> {
        self.enter()?;
        let stmt = self.parse_statement_inner();
        self.leave();
        stmt
    }

    fn parse_statement_inner(&mut self) -> SandboxResult<Stmt> {
        let Some(token) = self.stream.peek() else {
            return Err(self.unexpected());
        };
        match token {
            Token::LBrace => {
                self.stream.advance();
                Ok(Stmt::Block(self.parse_block_rest()?))
            }
            Token::Let | Token::Const | Token::Var => {
                let decl = self.parse_declaration()?;
                self.stream.eat(&Token::Semi);
                Ok(decl)
            }
            Token::Function => {
                self.stream.advance();
                let name = self.stream.expect_ident()?;
                let def = self.parse_function_rest(Some(name))?;
                Ok(Stmt::Function(def))
            }
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            Token::While => {
                self.stream.advance();
                self.stream.expect(Token::LParen)?;
                let test = self.parse_expression()?;
                self.stream.expect(Token::RParen)?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { test, body })
            }
            Token::Break => {
                self.stream.advance();
                self.stream.eat(&Token::Semi);
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.stream.advance();
                self.stream.eat(&Token::Semi);
                Ok(Stmt::Continue)
            }
            Token::Return => {
                self.stream.advance();
                let value = match self.stream.peek() {
                    None | Some(Token::Semi) | Some(Token::RBrace) => None,
                    Some(_) => Some(self.parse_expression()?),
                };
                self.stream.eat(&Token::Semi);
                Ok(Stmt::Return(value))
            }
            Token::Semi => {
                self.stream.advance();
                Ok(Stmt::Empty)
            }
            _ => {
                let expr = self.parse_expression()?;
                self.stream.eat(&Token::Semi);
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// Parses statements up to and including the closing `}`.
    fn parse_block_rest(&mut self) -> SandboxResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.stream.eat(&Token::RBrace) {
            if self.stream.at_end() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn decl_kind(token: &Token) -> Option<DeclKind> {
        match token {
            Token::Let => Some(DeclKind::Let),
            Token::Const => Some(DeclKind::Const),
            Token::Var => Some(DeclKind::Var),
            _ => None,
        }
    }

    fn parse_declaration(&mut self) -> SandboxResult<Stmt> {
        let kind = self
            .stream
            .advance()
            .and_then(Self::decl_kind)
            .ok_or_else(|| self.unexpected())?;
        let mut declarators = Vec::new();
        loop {
            let name = self.stream.expect_ident()?;
            let init = if self.stream.eat(&Token::Eq) {
                Some(self.parse_assignment()?)
            } else if kind == DeclKind::Const {
                return Err(syntax_error(
                    format!("missing initializer in const declaration `{name}`"),
                    self.stream.offset(),
                ));
            } else {
                None
            };
            declarators.push((name, init));
            if !self.stream.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::Decl { kind, declarators })
    }

    fn parse_if(&mut self) -> SandboxResult<Stmt> {
        self.stream.expect(Token::If)?;
        self.stream.expect(Token::LParen)?;
        let test = self.parse_expression()?;
        self.stream.expect(Token::RParen)?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.stream.eat(&Token::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> SandboxResult<Stmt> {
        self.stream.expect(Token::For)?;
        self.stream.expect(Token::LParen)?;

        // for (const x of xs)
        if let (Some(kind), Some(Token::Ident(name)), Some(Token::Of)) = (
            self.stream.peek().and_then(Self::decl_kind),
            self.stream.peek_nth(1),
            self.stream.peek_nth(2),
        ) {
            self.stream.advance();
            self.stream.advance();
            self.stream.advance();
            let iterable = self.parse_expression()?;
            self.stream.expect(Token::RParen)?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::ForOf {
                kind,
                name: name.clone(),
                iterable,
                body,
            });
        }

        let init = if self.stream.check(&Token::Semi) {
            None
        } else if self.stream.peek().and_then(Self::decl_kind).is_some() {
            Some(Box::new(self.parse_declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expression()?)))
        };
        self.stream.expect(Token::Semi)?;
        let test = if self.stream.check(&Token::Semi) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.stream.expect(Token::Semi)?;
        let update = if self.stream.check(&Token::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.stream.expect(Token::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    /// Parses `(params) { body }` after `function [name]`.
    fn parse_function_rest(&mut self, name: Option<String>) -> SandboxResult<Rc<FunctionDef>> {
        self.stream.expect(Token::LParen)?;
        let params = self.parse_params_rest()?;
        self.stream.expect(Token::LBrace)?;
        let body = FunctionBody::Block(self.parse_block_rest()?);
        Ok(Rc::new(FunctionDef { name, params, body }))
    }

    /// Parses identifiers up to and including `)`.
    fn parse_params_rest(&mut self) -> SandboxResult<Vec<String>> {
        let mut params = Vec::new();
        while !self.stream.eat(&Token::RParen) {
            params.push(self.stream.expect_ident()?);
            if !self.stream.eat(&Token::Comma) {
                self.stream.expect(Token::RParen)?;
                break;
            }
        }
        Ok(params)
    }

    // ── Expressions ──────────────────────────────────────────────

    fn parse_expression(&mut self) -> SandboxResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> SandboxResult<Expr> {
        self.enter()?;
        let expr = self.parse_assignment_inner();
        self.leave();
        expr
    }

    fn parse_assignment_inner(&mut self) -> SandboxResult<Expr> {
        if self.arrow_ahead() {
            return self.parse_arrow();
        }
        let left = self.parse_conditional()?;
        let Some(op) = self.stream.peek().and_then(assign_op) else {
            return Ok(left);
        };
        if !is_assignable(&left) {
            return Err(syntax_error(
                "invalid left-hand side in assignment",
                self.stream.offset(),
            ));
        }
        self.stream.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            target: Box::new(left),
            op,
            value: Box::new(value),
        })
    }

    /// Whether the upcoming tokens start an arrow function.
    fn arrow_ahead(&self) -> bool {
        match self.stream.peek() {
            Some(Token::Ident(_)) => matches!(self.stream.peek_nth(1), Some(Token::Arrow)),
            Some(Token::LParen) => {
                let mut depth = 0usize;
                let mut n = 0;
                while let Some(token) = self.stream.peek_nth(n) {
                    match token {
                        Token::LParen => depth += 1,
                        Token::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(self.stream.peek_nth(n + 1), Some(Token::Arrow));
                            }
                        }
                        _ => {}
                    }
                    n += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> SandboxResult<Expr> {
        let params = if self.stream.eat(&Token::LParen) {
            self.parse_params_rest()?
        } else {
            vec![self.stream.expect_ident()?]
        };
        self.stream.expect(Token::Arrow)?;
        let body = if self.stream.eat(&Token::LBrace) {
            FunctionBody::Block(self.parse_block_rest()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
        })))
    }

    fn parse_conditional(&mut self) -> SandboxResult<Expr> {
        let test = self.parse_pratt(0)?;
        if !self.stream.eat(&Token::Question) {
            return Ok(test);
        }
        let then = self.parse_assignment()?;
        self.stream.expect(Token::Colon)?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_pratt(&mut self, min_prec: u8) -> SandboxResult<Expr> {
        let mut left = self.parse_prefix()?;

        while let Some((prec, assoc, op)) = self.stream.peek().and_then(binary_op_info) {
            if prec < min_prec {
                break;
            }
            self.stream.advance();
            let next_prec = if assoc == Assoc::Left { prec + 1 } else { prec };
            let right = Box::new(self.parse_pratt(next_prec)?);
            let lhs = Box::new(left);
            left = match op {
                InfixOp::Binary(op) => Expr::Binary {
                    op,
                    left: lhs,
                    right,
                },
                InfixOp::Logical(op) => Expr::Logical {
                    op,
                    left: lhs,
                    right,
                },
            };
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> SandboxResult<Expr> {
        let op = match self.stream.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Typeof) => UnaryOp::TypeOf,
            Some(Token::PlusPlus) | Some(Token::MinusMinus) => {
                let delta = if self.stream.check(&Token::PlusPlus) { 1.0 } else { -1.0 };
                self.stream.advance();
                let target = self.parse_prefix()?;
                if !is_assignable(&target) {
                    return Err(syntax_error(
                        "invalid operand for prefix update",
                        self.stream.offset(),
                    ));
                }
                return Ok(Expr::Update {
                    target: Box::new(target),
                    delta,
                    prefix: true,
                });
            }
            _ => return self.parse_postfix(),
        };
        self.stream.advance();
        self.enter()?;
        let operand = self.parse_prefix();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn parse_postfix(&mut self) -> SandboxResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.stream.peek() {
                Some(Token::Dot) => {
                    self.stream.advance();
                    let property = self.stream.expect_ident()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(Token::LBracket) => {
                    self.stream.advance();
                    let index = self.parse_expression()?;
                    self.stream.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => {
                    self.stream.advance();
                    let args = self.parse_list_rest(Token::RParen)?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Some(Token::PlusPlus) | Some(Token::MinusMinus) if is_assignable(&expr) => {
                    let delta = if self.stream.check(&Token::PlusPlus) { 1.0 } else { -1.0 };
                    self.stream.advance();
                    return Ok(Expr::Update {
                        target: Box::new(expr),
                        delta,
                        prefix: false,
                    });
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parses comma-separated expressions up to and including `close`.
    /// A trailing comma is allowed.
    fn parse_list_rest(&mut self, close: Token) -> SandboxResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.stream.eat(&close) {
            items.push(self.parse_assignment()?);
            if !self.stream.eat(&Token::Comma) {
                self.stream.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_atom(&mut self) -> SandboxResult<Expr> {
        let offset = self.stream.offset();
        let Some(token) = self.stream.advance() else {
            return Err(syntax_error("unexpected end of input", offset));
        };
        match token {
            Token::Number(n) => Ok(Expr::Number(*n)),
            Token::Str(s) => Ok(Expr::Str(s.clone())),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::Undefined => Ok(Expr::Undefined),
            Token::Ident(name) => Ok(Expr::Ident(name.clone())),
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.stream.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::Array(self.parse_list_rest(Token::RBracket)?)),
            Token::LBrace => self.parse_object_rest(),
            Token::Function => {
                let name = match self.stream.peek() {
                    Some(Token::Ident(name)) => {
                        self.stream.advance();
                        Some(name.clone())
                    }
                    _ => None,
                };
                Ok(Expr::Function(self.parse_function_rest(name)?))
            }
            other => Err(syntax_error(format!("unexpected token `{other}`"), offset)),
        }
    }

    fn parse_object_rest(&mut self) -> SandboxResult<Expr> {
        let mut entries = Vec::new();
        while !self.stream.eat(&Token::RBrace) {
            let offset = self.stream.offset();
            let key = match self.stream.advance() {
                Some(Token::Ident(name)) => name.clone(),
                Some(Token::Str(s)) => s.clone(),
                Some(Token::Number(n)) => crate::value::format_number(*n),
                Some(other) => {
                    return Err(syntax_error(format!("unexpected token `{other}` in object"), offset));
                }
                None => return Err(syntax_error("unterminated object literal", offset)),
            };
            let value = if self.stream.eat(&Token::Colon) {
                self.parse_assignment()?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.stream.eat(&Token::Comma) {
                self.stream.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        match parse_program(source).unwrap().remove(0) {
            Stmt::Expr(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Number(1.0)),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Number(2.0)),
                    right: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn power_is_right_associative() {
        let Expr::Binary { op, right, .. } = expr("2 ** 3 ** 2") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Pow);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn arrow_functions() {
        assert!(matches!(expr("x => x * 2"), Expr::Function(_)));
        assert!(matches!(expr("(a, b) => { return a + b; }"), Expr::Function(_)));
        assert!(matches!(expr("(a + b) * 2"), Expr::Binary { .. }));
    }

    #[test]
    fn for_of_and_classic_for() {
        let program = parse_program("for (const x of xs) {} for (let i = 0; i < 3; i++) {}").unwrap();
        assert!(matches!(program[0], Stmt::ForOf { .. }));
        assert!(matches!(program[1], Stmt::For { .. }));
    }

    #[test]
    fn object_literal_with_shorthand() {
        let Expr::Object(entries) = expr("({a: 1, 'b c': 2, d})") else {
            panic!("expected object");
        };
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b c", "d"]);
    }

    #[test]
    fn rejects_assignment_to_literal() {
        let err = parse_program("1 = 2;").unwrap_err();
        assert!(err.to_string().contains("invalid left-hand side"));
    }

    #[test]
    fn rejects_runaway_nesting() {
        let source = format!("return {}1{};", "(".repeat(500), ")".repeat(500));
        let err = parse_program(&source).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));
    }

    #[test]
    fn const_requires_initializer() {
        assert!(parse_program("const x;").is_err());
    }
}
