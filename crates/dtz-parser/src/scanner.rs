//! Tokenizer.
//!
//! Template literals are scanned as a single token whose interpolations
//! are recorded as byte ranges into the source; the parser re-parses
//! those ranges so spans stay absolute.

use dtz_common::diagnostics::{Diagnostic, Stage};
use dtz_common::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    /// Template literal: alternating text and interpolation ranges.
    Template(Vec<TemplateRaw>),
    Ident(String),
    Keyword(Keyword),
    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Arrow,
    Assign,
    Pipe,
    Amp,
    Lt,
    Lte,
    Gt,
    Gte,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Question,
    Dot,
    DotDotDot,
    At,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateRaw {
    Text(String),
    /// Byte range of an interpolated expression (inside `${ }`).
    Interp(Span),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Import,
    From,
    Export,
    Comptime,
    Const,
    Type,
    Match,
    If,
    Throw,
    Await,
    Async,
    Do,
    True,
    False,
    Null,
    Undefined,
    Extends,
}

fn keyword_of(ident: &str) -> Option<Keyword> {
    Some(match ident {
        "import" => Keyword::Import,
        "from" => Keyword::From,
        "export" => Keyword::Export,
        "comptime" => Keyword::Comptime,
        "const" => Keyword::Const,
        "type" => Keyword::Type,
        "match" => Keyword::Match,
        "if" => Keyword::If,
        "throw" => Keyword::Throw,
        "await" => Keyword::Await,
        "async" => Keyword::Async,
        "do" => Keyword::Do,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "null" => Keyword::Null,
        "undefined" => Keyword::Undefined,
        "extends" => Keyword::Extends,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the whole source.
    pub fn scan_all(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn error(&self, message: impl Into<String>, start: usize) -> Diagnostic {
        Diagnostic::new(
            Stage::Parse,
            message,
            Some(Span::new(start as u32, self.pos.max(start + 1) as u32)),
        )
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Decode the full char whose first byte was just bumped, advancing
    /// past its continuation bytes.
    fn finish_char(&mut self, first: u8) -> char {
        if first.is_ascii() {
            return first as char;
        }
        let char_start = self.pos - 1;
        let ch = self.source[char_start..].chars().next().unwrap_or('\u{FFFD}');
        self.pos = char_start + ch.len_utf8();
        ch
    }

    fn skip_trivia(&mut self) -> Result<(), Diagnostic> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        if self.pos + 1 >= self.bytes.len() {
                            return Err(self.error("unterminated block comment", start));
                        }
                        if self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/' {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(b) = self.bump() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: Span::at(start as u32),
            });
        };

        let kind = match b {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semi,
            b':' => TokenKind::Colon,
            b'@' => TokenKind::At,
            b'+' => TokenKind::Plus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'?' => TokenKind::Question,
            b'-' => TokenKind::Minus,
            b'.' => {
                if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.pos += 2;
                    TokenKind::DotDotDot
                } else {
                    TokenKind::Dot
                }
            }
            b'=' => {
                if self.peek() == Some(b'>') {
                    self.pos += 1;
                    TokenKind::Arrow
                } else if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::Lte
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::Gte
                } else {
                    TokenKind::Gt
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.pos += 1;
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.pos += 1;
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            b'"' | b'\'' => self.scan_string(b, start)?,
            b'`' => self.scan_template(start)?,
            b'0'..=b'9' => self.scan_number(start)?,
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.scan_ident(start),
            other => {
                return Err(self.error(
                    format!("unexpected character `{}`", other as char),
                    start,
                ));
            }
        };

        Ok(Token {
            kind,
            span: Span::new(start as u32, self.pos as u32),
        })
    }

    fn scan_ident(&mut self, start: usize) -> TokenKind {
        while let Some(b) = self.peek() {
            if b == b'_' || b.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.source[start..self.pos];
        match keyword_of(text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(text.to_string()),
        }
    }

    fn scan_number(&mut self, start: usize) -> Result<TokenKind, Diagnostic> {
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !is_float && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                    is_float = true;
                    self.pos += 1;
                }
                b'e' | b'E' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit() || b == b'-') =>
                {
                    is_float = true;
                    self.pos += 2;
                }
                _ => break,
            }
        }
        let text = &self.source[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid float literal `{text}`"), start))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("integer literal `{text}` out of range"), start))
        }
    }

    fn scan_string(&mut self, quote: u8, start: usize) -> Result<TokenKind, Diagnostic> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => {
                    return Err(self.error("unterminated string literal", start));
                }
                Some(b) if b == quote => return Ok(TokenKind::Str(out)),
                Some(b'\\') => out.push(self.scan_escape(start)?),
                Some(b) => out.push(self.finish_char(b)),
            }
        }
    }

    fn scan_escape(&mut self, start: usize) -> Result<char, Diagnostic> {
        match self.bump() {
            Some(b'n') => Ok('\n'),
            Some(b't') => Ok('\t'),
            Some(b'r') => Ok('\r'),
            Some(b'0') => Ok('\0'),
            Some(b'\\') => Ok('\\'),
            Some(b'\'') => Ok('\''),
            Some(b'"') => Ok('"'),
            Some(b'`') => Ok('`'),
            Some(b'$') => Ok('$'),
            Some(other) => Err(self.error(
                format!("unknown escape `\\{}`", other as char),
                start,
            )),
            None => Err(self.error("unterminated escape", start)),
        }
    }

    /// Scan a template literal, recording interpolation byte ranges.
    /// Interpolations may nest braces (records, blocks) and nested
    /// templates; braces are counted, nested backticks skipped whole.
    fn scan_template(&mut self, start: usize) -> Result<TokenKind, Diagnostic> {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated template literal", start)),
                Some(b'`') => {
                    if !text.is_empty() {
                        parts.push(TemplateRaw::Text(text));
                    }
                    return Ok(TokenKind::Template(parts));
                }
                Some(b'\\') => text.push(self.scan_escape(start)?),
                Some(b'$') if self.peek() == Some(b'{') => {
                    self.pos += 1;
                    if !text.is_empty() {
                        parts.push(TemplateRaw::Text(std::mem::take(&mut text)));
                    }
                    let interp_start = self.pos;
                    let mut depth = 1usize;
                    loop {
                        match self.bump() {
                            None => {
                                return Err(
                                    self.error("unterminated template interpolation", start)
                                );
                            }
                            Some(b'{') => depth += 1,
                            Some(b'}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            Some(b'`') => {
                                // Skip a nested template literal wholesale.
                                self.skip_nested_template(start)?;
                            }
                            Some(b'"') => self.skip_quoted(b'"', start)?,
                            Some(b'\'') => self.skip_quoted(b'\'', start)?,
                            Some(_) => {}
                        }
                    }
                    parts.push(TemplateRaw::Interp(Span::new(
                        interp_start as u32,
                        (self.pos - 1) as u32,
                    )));
                }
                Some(b) => text.push(self.finish_char(b)),
            }
        }
    }

    fn skip_quoted(&mut self, quote: u8, start: usize) -> Result<(), Diagnostic> {
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal", start)),
                Some(b'\\') => {
                    self.pos += 1;
                }
                Some(b) if b == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn skip_nested_template(&mut self, start: usize) -> Result<(), Diagnostic> {
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated template literal", start)),
                Some(b'\\') => {
                    self.pos += 1;
                }
                Some(b'`') => return Ok(()),
                Some(b'$') if self.peek() == Some(b'{') => {
                    self.pos += 1;
                    let mut depth = 1usize;
                    loop {
                        match self.bump() {
                            None => {
                                return Err(
                                    self.error("unterminated template interpolation", start)
                                );
                            }
                            Some(b'{') => depth += 1,
                            Some(b'}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            Some(b'`') => self.skip_nested_template(start)?,
                            Some(_) => {}
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }
}
