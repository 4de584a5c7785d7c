//! Recursive-descent parser.
//!
//! Produces the core AST directly; surface sugar (type syntax, generic
//! arrows, call-site type arguments) is lowered inline through the
//! builders in `desugar`. The parser never panics: every failure is a
//! `parse`-stage diagnostic with the offending span.

use crate::desugar;
use crate::scanner::{Keyword, Scanner, TemplateRaw, Token, TokenKind};
use dtz_ast::{
    Arg, ArrayItem, BinaryOp, Decl, DeclKind, Expr, ExprKind, FieldPattern, ImportBinding,
    Lambda, Lit, MatchCase, Param, Pattern, PatternKind, Program, RecordItem, TemplatePart,
    UnaryOp,
};
use dtz_common::diagnostics::{Diagnostic, Stage};
use dtz_common::limits::MAX_PARSER_RECURSION_DEPTH;
use dtz_common::span::Span;

type ParseResult<T> = Result<T, Diagnostic>;

/// Parse a whole source file.
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let mut parser = Parser::new(source, 0)?;
    parser.parse_program()
}

pub struct Parser<'a> {
    source: &'a str,
    /// Offset of `source` within the outer file (template interpolation
    /// sub-parsers see a snippet but report absolute spans).
    offset: u32,
    tokens: Vec<Token>,
    pos: usize,
    depth: u32,
}

impl<'a> Parser<'a> {
    /// Build a parser over `source`, offsetting every span by `offset`
    /// (used when re-parsing template interpolation ranges).
    pub fn new(source: &'a str, offset: u32) -> ParseResult<Self> {
        let mut tokens = Scanner::new(source).scan_all().map_err(|mut d| {
            if let Some(span) = &mut d.span {
                span.start += offset;
                span.end += offset;
            }
            d
        })?;
        if offset != 0 {
            for token in &mut tokens {
                token.span.start += offset;
                token.span.end += offset;
                if let TokenKind::Template(parts) = &mut token.kind {
                    for part in parts {
                        if let TemplateRaw::Interp(span) = part {
                            span.start += offset;
                            span.end += offset;
                        }
                    }
                }
            }
        }
        Ok(Self {
            source,
            offset,
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    // =========================================================================
    // Token plumbing
    // =========================================================================

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.at_keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<(String, Span)> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let token = self.bump();
                Ok((name, token.span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, what: &str) -> Diagnostic {
        let token = self.peek();
        let local = Span::new(
            token.span.start - self.offset,
            token.span.end - self.offset,
        );
        let found = local.slice(self.source);
        let found = if found.is_empty() { "end of input" } else { found };
        Diagnostic::new(
            Stage::Parse,
            format!("expected {what}, found `{found}`"),
            Some(token.span),
        )
    }

    fn enter(&mut self, span: Span) -> ParseResult<DepthGuard> {
        self.depth += 1;
        if self.depth > MAX_PARSER_RECURSION_DEPTH {
            return Err(Diagnostic::new(
                Stage::Parse,
                "expression nesting too deep",
                Some(span),
            ));
        }
        Ok(DepthGuard)
    }

    fn leave(&mut self, _guard: DepthGuard) {
        self.depth -= 1;
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut decls = Vec::new();
        while !self.at(&TokenKind::Eof) {
            decls.push(self.parse_decl(true)?);
        }
        Ok(Program { decls })
    }

    fn parse_decl(&mut self, top_level: bool) -> ParseResult<Decl> {
        let start = self.peek().span;
        if self.at_keyword(Keyword::Import) {
            if !top_level {
                return Err(Diagnostic::new(
                    Stage::Parse,
                    "imports are only allowed at the top level",
                    Some(start),
                ));
            }
            return self.parse_import();
        }
        let exported = self.eat_keyword(Keyword::Export);
        if self.at_keyword(Keyword::Type) {
            return self.parse_type_decl(exported, start);
        }
        let comptime = self.eat_keyword(Keyword::Comptime);
        if self.at_keyword(Keyword::Const) {
            return self.parse_const_decl(comptime, exported, start);
        }
        if exported || comptime {
            return Err(self.unexpected("`const` or `type` declaration"));
        }
        let expr = self.parse_expr()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        let span = start.merge(expr.span);
        Ok(Decl {
            kind: DeclKind::Expr(expr),
            span,
        })
    }

    fn parse_import(&mut self) -> ParseResult<Decl> {
        let start = self.bump().span; // `import`
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut bindings = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let (name, span) = self.expect_ident("import binding")?;
            bindings.push(ImportBinding { name, span });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        if !self.eat_keyword(Keyword::From) {
            return Err(self.unexpected("`from`"));
        }
        let module = match self.peek_kind().clone() {
            TokenKind::Str(module) => {
                self.bump();
                module
            }
            _ => return Err(self.unexpected("module name string")),
        };
        let end = self.expect(&TokenKind::Semi, "`;`")?.span;
        Ok(Decl {
            kind: DeclKind::Import { bindings, module },
            span: start.merge(end),
        })
    }

    fn parse_const_decl(
        &mut self,
        comptime: bool,
        exported: bool,
        start: Span,
    ) -> ParseResult<Decl> {
        self.bump(); // `const`
        let (name, name_span) = self.expect_ident("constant name")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::Assign, "`=`")?;
        let init = self.parse_expr()?;
        let end = self.expect(&TokenKind::Semi, "`;`")?.span;
        Ok(Decl {
            kind: DeclKind::Const {
                name,
                name_span,
                ty,
                init,
                comptime,
                exported,
            },
            span: start.merge(end),
        })
    }

    /// `type X = T;` is a comptime constant bound to the type expression.
    fn parse_type_decl(&mut self, exported: bool, start: Span) -> ParseResult<Decl> {
        self.bump(); // `type`
        let (name, name_span) = self.expect_ident("type name")?;
        self.expect(&TokenKind::Assign, "`=`")?;
        let init = self.parse_type_expr()?;
        let init = desugar::named(init, &name);
        let end = self.expect(&TokenKind::Semi, "`;`")?.span;
        Ok(Decl {
            kind: DeclKind::Const {
                name,
                name_span,
                ty: None,
                init,
                comptime: true,
                exported,
            },
            span: start.merge(end),
        })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        let guard = self.enter(self.peek().span)?;
        // Deeply nested input grows the stack until the depth guard trips.
        let result = stacker::maybe_grow(64 * 1024, 1024 * 1024, || self.parse_conditional());
        self.leave(guard);
        result
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let cond = self.parse_binary(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then_branch = self.parse_expr()?;
        self.expect(&TokenKind::Colon, "`:`")?;
        let else_branch = self.parse_expr()?;
        let span = cond.span.merge(else_branch.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    /// Binary operators by precedence-climbing. Levels, low to high:
    /// `||`, `&&`, `== !=`, `< <= > >=`, `+ -`, `* / %`.
    fn parse_binary(&mut self, min_level: u8) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((op, level)) = self.peek_binary_op() else {
                break;
            };
            if level < min_level {
                break;
            }
            self.bump();
            let right = self.parse_binary(level + 1)?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, u8)> {
        Some(match self.peek_kind() {
            TokenKind::OrOr => (BinaryOp::Or, 0),
            TokenKind::AndAnd => (BinaryOp::And, 1),
            TokenKind::EqEq => (BinaryOp::Eq, 2),
            TokenKind::NotEq => (BinaryOp::Ne, 2),
            TokenKind::Lt => (BinaryOp::Lt, 3),
            TokenKind::Lte => (BinaryOp::Lte, 3),
            TokenKind::Gt => (BinaryOp::Gt, 3),
            TokenKind::Gte => (BinaryOp::Gte, 3),
            TokenKind::Plus => (BinaryOp::Add, 4),
            TokenKind::Minus => (BinaryOp::Sub, 4),
            TokenKind::Star => (BinaryOp::Mul, 5),
            TokenKind::Slash => (BinaryOp::Div, 5),
            TokenKind::Percent => (BinaryOp::Rem, 5),
            _ => return None,
        })
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let start = self.peek().span;
        if self.eat(&TokenKind::Bang) {
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        if self.eat_keyword(Keyword::Throw) {
            let operand = self.parse_expr()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(ExprKind::Throw(Box::new(operand)), span));
        }
        if self.eat_keyword(Keyword::Await) {
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(ExprKind::Await(Box::new(operand)), span));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix_ops(primary)
    }

    fn parse_postfix_ops(&mut self, mut expr: Expr) -> ParseResult<Expr> {
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.bump();
                    let (name, name_span) = self.expect_ident("property name")?;
                    let span = expr.span.merge(name_span);
                    expr = Expr::new(
                        ExprKind::Property {
                            object: Box::new(expr),
                            name,
                            name_span,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    let end = self.expect(&TokenKind::RBracket, "`]`")?.span;
                    let span = expr.span.merge(end);
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    let (args, end) = self.parse_call_args()?;
                    let span = expr.span.merge(end);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                // `f<A, B>(x)` - speculative: on failure `<` is comparison.
                TokenKind::Lt => {
                    let saved = self.pos;
                    match self.try_parse_type_arg_call(&expr) {
                        Ok(Some(call)) => expr = call,
                        Ok(None) | Err(_) => {
                            self.pos = saved;
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn try_parse_type_arg_call(&mut self, callee: &Expr) -> ParseResult<Option<Expr>> {
        self.bump(); // `<`
        let mut type_args = vec![self.parse_type_expr()?];
        while self.eat(&TokenKind::Comma) {
            type_args.push(self.parse_type_expr()?);
        }
        if !self.eat(&TokenKind::Gt) {
            return Ok(None);
        }
        if !self.at(&TokenKind::LParen) {
            return Ok(None);
        }
        let (args, end) = self.parse_call_args()?;
        let span = callee.span.merge(end);
        Ok(Some(desugar::call_with_type_args(
            callee.clone(),
            type_args,
            args,
            span,
        )))
    }

    fn parse_call_args(&mut self) -> ParseResult<(Vec<Arg>, Span)> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut args = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let spread = self.eat(&TokenKind::DotDotDot);
            let expr = self.parse_expr()?;
            args.push(Arg { expr, spread });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RParen, "`)`")?.span;
        Ok((args, end))
    }

    // =========================================================================
    // Primary expressions
    // =========================================================================

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Int(n) => {
                self.bump();
                Ok(Expr::new(ExprKind::Literal(Lit::Int(*n)), token.span))
            }
            TokenKind::Float(n) => {
                self.bump();
                Ok(Expr::new(ExprKind::Literal(Lit::Float(*n)), token.span))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Expr::new(
                    ExprKind::Literal(Lit::Str(s.clone())),
                    token.span,
                ))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                Ok(Expr::new(ExprKind::Literal(Lit::Bool(true)), token.span))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                Ok(Expr::new(ExprKind::Literal(Lit::Bool(false)), token.span))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.bump();
                Ok(Expr::new(ExprKind::Literal(Lit::Null), token.span))
            }
            TokenKind::Keyword(Keyword::Undefined) => {
                self.bump();
                Ok(Expr::new(ExprKind::Literal(Lit::Undefined), token.span))
            }
            TokenKind::Template(parts) => {
                self.bump();
                self.parse_template(parts.clone(), token.span)
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Expr::new(ExprKind::Ident(name.clone()), token.span))
            }
            TokenKind::Keyword(Keyword::Async) => self.parse_async_arrow(token.span),
            TokenKind::Keyword(Keyword::Match) => self.parse_match(token.span),
            TokenKind::Keyword(Keyword::Do) => self.parse_block(token.span),
            TokenKind::Lt => self.parse_generic_arrow(token.span, false),
            TokenKind::LParen => self.parse_paren_or_arrow(token.span, false),
            TokenKind::LBracket => self.parse_array(token.span),
            TokenKind::LBrace => self.parse_record(token.span),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_template(&mut self, parts: Vec<TemplateRaw>, span: Span) -> ParseResult<Expr> {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplateRaw::Text(text) => out.push(TemplatePart::Text(text)),
                TemplateRaw::Interp(range) => {
                    let local = Span::new(range.start - self.offset, range.end - self.offset);
                    let snippet = local.slice(self.source);
                    let mut sub = Parser::new(snippet, range.start)?;
                    let expr = sub.parse_expr()?;
                    if !sub.at(&TokenKind::Eof) {
                        return Err(sub.unexpected("end of interpolation"));
                    }
                    out.push(TemplatePart::Interp(expr));
                }
            }
        }
        Ok(Expr::new(ExprKind::Template(out), span))
    }

    fn parse_async_arrow(&mut self, start: Span) -> ParseResult<Expr> {
        self.bump(); // `async`
        match self.peek_kind() {
            TokenKind::Lt => self.parse_generic_arrow(start, true),
            TokenKind::LParen => self.parse_paren_or_arrow(start, true),
            _ => Err(self.unexpected("`(` after `async`")),
        }
    }

    /// `(` starts either an arrow's parameter list or a parenthesized
    /// expression; try the arrow first and roll back.
    fn parse_paren_or_arrow(&mut self, start: Span, is_async: bool) -> ParseResult<Expr> {
        let saved = self.pos;
        match self.try_parse_arrow(start, is_async, vec![]) {
            Ok(Some(arrow)) => return Ok(arrow),
            Ok(None) | Err(_) => self.pos = saved,
        }
        if is_async {
            return Err(self.unexpected("arrow function after `async`"));
        }
        self.bump(); // `(`
        let inner = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(inner)
    }

    /// `<T extends Number, U>(x: T) => body` - the generic parameters
    /// become leading bounded type parameters.
    fn parse_generic_arrow(&mut self, start: Span, is_async: bool) -> ParseResult<Expr> {
        self.bump(); // `<`
        let mut type_params = Vec::new();
        loop {
            let (name, name_span) = self.expect_ident("type parameter name")?;
            let bound = if self.eat_keyword(Keyword::Extends) {
                Some(self.parse_type_expr()?)
            } else {
                None
            };
            type_params.push(desugar::type_param(name, bound, name_span));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Gt, "`>`")?;
        match self.try_parse_arrow(start, is_async, type_params)? {
            Some(arrow) => Ok(arrow),
            None => Err(self.unexpected("arrow function after type parameters")),
        }
    }

    /// Attempt `(params) => body`; `None` means "not an arrow" and the
    /// caller must roll back.
    fn try_parse_arrow(
        &mut self,
        start: Span,
        is_async: bool,
        leading_params: Vec<Param>,
    ) -> ParseResult<Option<Expr>> {
        if !self.eat(&TokenKind::LParen) {
            return Ok(None);
        }
        let mut params = leading_params;
        while !self.at(&TokenKind::RParen) {
            let (name, name_span) = match self.peek_kind().clone() {
                TokenKind::Ident(name) => {
                    let token = self.bump();
                    (name, token.span)
                }
                _ => return Ok(None),
            };
            let ty = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type_expr()?)
            } else {
                None
            };
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param {
                name,
                ty,
                default,
                span: name_span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(&TokenKind::RParen) {
            return Ok(None);
        }
        let return_type = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        if !self.eat(&TokenKind::Arrow) {
            return Ok(None);
        }
        let body = self.parse_expr()?;
        let span = start.merge(body.span);
        Ok(Some(Expr::new(
            ExprKind::Lambda(Box::new(Lambda {
                params,
                body,
                is_async,
                return_type,
            })),
            span,
        )))
    }

    fn parse_array(&mut self, start: Span) -> ParseResult<Expr> {
        self.bump(); // `[`
        let mut items = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            if self.eat(&TokenKind::DotDotDot) {
                items.push(ArrayItem::Spread(self.parse_expr()?));
            } else {
                items.push(ArrayItem::Element(self.parse_expr()?));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBracket, "`]`")?.span;
        Ok(Expr::new(ExprKind::Array(items), start.merge(end)))
    }

    fn parse_record(&mut self, start: Span) -> ParseResult<Expr> {
        self.bump(); // `{`
        let mut items = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            if self.eat(&TokenKind::DotDotDot) {
                items.push(RecordItem::Spread(self.parse_expr()?));
            } else {
                let (name, name_span) = self.expect_ident("field name")?;
                let value = if self.eat(&TokenKind::Colon) {
                    self.parse_expr()?
                } else {
                    // Shorthand `{ x }`.
                    Expr::new(ExprKind::Ident(name.clone()), name_span)
                };
                let span = name_span.merge(value.span);
                items.push(RecordItem::Field { name, value, span });
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "`}`")?.span;
        Ok(Expr::new(ExprKind::Record(items), start.merge(end)))
    }

    fn parse_match(&mut self, start: Span) -> ParseResult<Expr> {
        self.bump(); // `match`
        self.expect(&TokenKind::LParen, "`(`")?;
        let scrutinee = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut cases = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let pattern = self.parse_pattern()?;
            let guard = if self.eat_keyword(Keyword::If) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(&TokenKind::Arrow, "`=>`")?;
            let body = self.parse_expr()?;
            let span = pattern.span.merge(body.span);
            cases.push(MatchCase {
                pattern,
                guard,
                body,
                span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "`}`")?.span;
        Ok(Expr::new(
            ExprKind::Match {
                scrutinee: Box::new(scrutinee),
                cases,
            },
            start.merge(end),
        ))
    }

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Ident(name) if name == "_" => {
                self.bump();
                Ok(Pattern {
                    kind: PatternKind::Wildcard,
                    span: token.span,
                })
            }
            TokenKind::Ident(name) => {
                self.bump();
                let inner = if self.eat(&TokenKind::At) {
                    Some(Box::new(self.parse_pattern()?))
                } else {
                    None
                };
                let span = inner
                    .as_ref()
                    .map_or(token.span, |p| token.span.merge(p.span));
                Ok(Pattern {
                    kind: PatternKind::Binding {
                        name: name.clone(),
                        inner,
                    },
                    span,
                })
            }
            TokenKind::Int(n) => {
                self.bump();
                Ok(Pattern {
                    kind: PatternKind::Literal(Lit::Int(*n)),
                    span: token.span,
                })
            }
            TokenKind::Float(n) => {
                self.bump();
                Ok(Pattern {
                    kind: PatternKind::Literal(Lit::Float(*n)),
                    span: token.span,
                })
            }
            TokenKind::Minus => {
                self.bump();
                let next = self.bump();
                let lit = match next.kind {
                    TokenKind::Int(n) => Lit::Int(-n),
                    TokenKind::Float(n) => Lit::Float(-n),
                    _ => return Err(self.unexpected("numeric literal after `-`")),
                };
                Ok(Pattern {
                    kind: PatternKind::Literal(lit),
                    span: token.span.merge(next.span),
                })
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Pattern {
                    kind: PatternKind::Literal(Lit::Str(s.clone())),
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                Ok(Pattern {
                    kind: PatternKind::Literal(Lit::Bool(true)),
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                Ok(Pattern {
                    kind: PatternKind::Literal(Lit::Bool(false)),
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.bump();
                Ok(Pattern {
                    kind: PatternKind::Literal(Lit::Null),
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::Undefined) => {
                self.bump();
                Ok(Pattern {
                    kind: PatternKind::Literal(Lit::Undefined),
                    span: token.span,
                })
            }
            TokenKind::LBrace => {
                self.bump();
                let mut fields = Vec::new();
                while !self.at(&TokenKind::RBrace) {
                    let (name, name_span) = self.expect_ident("field name")?;
                    let pattern = if self.eat(&TokenKind::Colon) {
                        Some(self.parse_pattern()?)
                    } else {
                        None
                    };
                    let span = pattern
                        .as_ref()
                        .map_or(name_span, |p| name_span.merge(p.span));
                    fields.push(FieldPattern {
                        name,
                        pattern,
                        span,
                    });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(&TokenKind::RBrace, "`}`")?.span;
                Ok(Pattern {
                    kind: PatternKind::Destructure(fields),
                    span: token.span.merge(end),
                })
            }
            _ => Err(self.unexpected("pattern")),
        }
    }

    /// `do { decl* expr? }` - a block in expression position.
    fn parse_block(&mut self, start: Span) -> ParseResult<Expr> {
        self.bump(); // `do`
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut decls = Vec::new();
        let mut result = None;
        while !self.at(&TokenKind::RBrace) {
            let is_decl = self.at_keyword(Keyword::Const)
                || self.at_keyword(Keyword::Comptime)
                || self.at_keyword(Keyword::Type)
                || (self.at_keyword(Keyword::Export)
                    && matches!(self.peek_at(1), TokenKind::Keyword(_)));
            if is_decl {
                decls.push(self.parse_decl(false)?);
                continue;
            }
            let expr = self.parse_expr()?;
            if self.eat(&TokenKind::Semi) {
                let span = expr.span;
                decls.push(Decl {
                    kind: DeclKind::Expr(expr),
                    span,
                });
            } else {
                result = Some(Box::new(expr));
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace, "`}`")?.span;
        Ok(Expr::new(
            ExprKind::Block { decls, result },
            start.merge(end),
        ))
    }

    // =========================================================================
    // Type expressions
    // =========================================================================

    /// Type syntax, lowered to builtin calls while parsing:
    /// `A | B` → `Union(A, B)`, `A & B` → `Intersection(A, B)`,
    /// `{ f: T }` → `RecordType({ f: T })`, `[A, B]` → `Array(A, B)`,
    /// `T[]` → `Array(T)`, literals → `LiteralType(lit)`.
    pub fn parse_type_expr(&mut self) -> ParseResult<Expr> {
        let guard = self.enter(self.peek().span)?;
        let result = self.parse_type_union();
        self.leave(guard);
        result
    }

    fn parse_type_union(&mut self) -> ParseResult<Expr> {
        let first = self.parse_type_intersection()?;
        if !self.at(&TokenKind::Pipe) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(&TokenKind::Pipe) {
            members.push(self.parse_type_intersection()?);
        }
        Ok(desugar::union_call(members))
    }

    fn parse_type_intersection(&mut self) -> ParseResult<Expr> {
        let first = self.parse_type_postfix()?;
        if !self.at(&TokenKind::Amp) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(&TokenKind::Amp) {
            members.push(self.parse_type_postfix()?);
        }
        Ok(desugar::intersection_call(members))
    }

    fn parse_type_postfix(&mut self) -> ParseResult<Expr> {
        let mut ty = self.parse_type_atom()?;
        // `T[]` is a variadic array type.
        while self.at(&TokenKind::LBracket) && *self.peek_at(1) == TokenKind::RBracket {
            self.bump();
            let end = self.bump().span;
            ty = desugar::array_call(vec![ty], end);
        }
        Ok(ty)
    }

    fn parse_type_atom(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Keyword(
                Keyword::True | Keyword::False | Keyword::Null | Keyword::Undefined,
            ) => {
                let lit = self.parse_primary()?;
                Ok(desugar::literal_type_call(lit))
            }
            TokenKind::LBrace => {
                self.bump();
                let mut fields = Vec::new();
                while !self.at(&TokenKind::RBrace) {
                    let (name, name_span) = self.expect_ident("field name")?;
                    self.expect(&TokenKind::Colon, "`:`")?;
                    let ty = self.parse_type_expr()?;
                    let span = name_span.merge(ty.span);
                    fields.push(RecordItem::Field {
                        name,
                        value: ty,
                        span,
                    });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(&TokenKind::RBrace, "`}`")?.span;
                Ok(desugar::record_type_call(fields, token.span.merge(end)))
            }
            TokenKind::LBracket => {
                self.bump();
                let mut elements = Vec::new();
                while !self.at(&TokenKind::RBracket) {
                    elements.push(self.parse_type_expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(&TokenKind::RBracket, "`]`")?.span;
                if elements.is_empty() {
                    return Err(Diagnostic::new(
                        Stage::Desugar,
                        "tuple type needs at least one element",
                        Some(token.span.merge(end)),
                    ));
                }
                Ok(desugar::array_call(elements, token.span.merge(end)))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_type_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Ident(_) => {
                let primary = self.parse_primary()?;
                // Member access and calls keep value semantics inside a
                // type expression (`Shapes.Circle`, `Branded(String, "Id")`).
                self.parse_postfix_ops(primary)
            }
            _ => Err(self.unexpected("type expression")),
        }
    }
}

struct DepthGuard;
