//! Tokens and the hand-written AWSL lexer.
//!
//! The lexer produces tokens on demand so the parser can drop back to raw
//! text for free-form expressions (`when` / `guard` clauses), which are
//! bounded by statement terminators and evaluated lazily by the expression
//! interpreter rather than tokenized here.
//!
//! Token grammar (see the external-interface contract):
//! identifiers `[A-Za-z_][A-Za-z0-9_]*`, integers, floats, booleans
//! `true|false`, strings `"…"` (the only escape is `\"`), durations
//! `NNN(s|m|h|d)`. Comments run from `#` to end of line. Newlines are
//! significant (statement terminators) and surface as tokens.

use crate::error::{ParseError, Result};

/// A source position: byte offset plus 1-based line/column.
///
/// The offset lets the parser rewind the lexer to a peeked token before
/// switching to raw-expression mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(offset: usize, line: u32, column: u32) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

/// Atomic syntactic unit of AWSL source.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or contextual keyword (`workflow`, `node`, `call`, ...).
    Ident(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// String literal with quotes stripped and `\"` unescaped.
    Str(String),
    /// Duration literal, kept verbatim (e.g. `24h`, `30s`).
    Duration(String),
    LBrace,
    RBrace,
    Colon,
    Eq,
    Dot,
    Comma,
    Semi,
    Newline,
    Eof,
}

impl TokenKind {
    /// Short description used in syntax-error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier `{s}`"),
            TokenKind::Int(n) => format!("integer `{n}`"),
            TokenKind::Float(f) => format!("float `{f}`"),
            TokenKind::Bool(b) => format!("boolean `{b}`"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::Duration(d) => format!("duration `{d}`"),
            TokenKind::LBrace => "`{`".to_string(),
            TokenKind::RBrace => "`}`".to_string(),
            TokenKind::Colon => "`:`".to_string(),
            TokenKind::Eq => "`=`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Semi => "`;`".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// On-demand lexer over AWSL source text.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Current position as a span (used for EOF errors).
    pub fn here(&self) -> Span {
        Span::new(self.pos, self.line, self.column)
    }

    /// Rewind to a previously returned token's start. Used by the parser
    /// to un-peek before reading a raw expression.
    pub fn rewind_to(&mut self, span: Span) {
        self.pos = span.offset;
        self.line = span.line;
        self.column = span.column;
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_char2(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Skip spaces, tabs, carriage returns and `#` comments. Newlines are
    /// not skipped: they are tokens.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();
        let span = self.here();
        let ch = match self.peek_char() {
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    span,
                })
            }
            Some(ch) => ch,
        };

        let kind = match ch {
            '\n' => {
                self.bump();
                TokenKind::Newline
            }
            '{' => {
                self.bump();
                TokenKind::LBrace
            }
            '}' => {
                self.bump();
                TokenKind::RBrace
            }
            ':' => {
                self.bump();
                TokenKind::Colon
            }
            '=' => {
                self.bump();
                TokenKind::Eq
            }
            '.' => {
                self.bump();
                TokenKind::Dot
            }
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            ';' => {
                self.bump();
                TokenKind::Semi
            }
            '"' => self.lex_string(span)?,
            ch if ch.is_ascii_digit() => self.lex_number(span)?,
            ch if ch.is_ascii_alphabetic() || ch == '_' => self.lex_ident(),
            other => {
                return Err(ParseError::syntax(
                    span.line,
                    span.column,
                    format!("character `{other}`"),
                    &["identifier", "literal", "punctuation"],
                ))
            }
        };

        Ok(Token { kind, span })
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        match text {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => TokenKind::Ident(text.to_string()),
        }
    }

    fn lex_number(&mut self, span: Span) -> Result<TokenKind> {
        let start = self.pos;
        while matches!(self.peek_char(), Some(ch) if ch.is_ascii_digit()) {
            self.bump();
        }

        // Duration literal: digits directly followed by a unit letter that
        // does not continue into an identifier (`24h`, not `24hx`).
        if let Some(unit) = self.peek_char() {
            if matches!(unit, 's' | 'm' | 'h' | 'd')
                && !matches!(self.peek_char2(), Some(next) if next.is_ascii_alphanumeric() || next == '_')
            {
                self.bump();
                return Ok(TokenKind::Duration(self.src[start..self.pos].to_string()));
            }
        }

        // Float: digits '.' digits.
        if self.peek_char() == Some('.')
            && matches!(self.peek_char2(), Some(next) if next.is_ascii_digit())
        {
            self.bump();
            while matches!(self.peek_char(), Some(ch) if ch.is_ascii_digit()) {
                self.bump();
            }
            let text = &self.src[start..self.pos];
            return text
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| ParseError::MalformedNumber {
                    line: span.line,
                    column: span.column,
                    text: text.to_string(),
                });
        }

        let text = &self.src[start..self.pos];
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| ParseError::MalformedNumber {
                line: span.line,
                column: span.column,
                text: text.to_string(),
            })
    }

    fn lex_string(&mut self, span: Span) -> Result<TokenKind> {
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(ParseError::UnterminatedString {
                        line: span.line,
                        column: span.column,
                    })
                }
                Some('"') => {
                    self.bump();
                    return Ok(TokenKind::Str(out));
                }
                Some('\\') if self.peek_char2() == Some('"') => {
                    self.bump();
                    self.bump();
                    out.push('"');
                }
                Some(ch) => {
                    self.bump();
                    out.push(ch);
                }
            }
        }
    }

    /// Consume raw text up to (but not including) the next statement
    /// terminator (`;`, newline or `}`). A `#` cuts the expression short.
    /// Returns the trimmed text.
    pub fn raw_expression(&mut self) -> String {
        let start = self.pos;
        let mut end = self.pos;
        let mut in_string = false;
        while let Some(ch) = self.peek_char() {
            match ch {
                '"' => in_string = !in_string,
                ';' | '\n' | '}' if !in_string => break,
                '#' if !in_string => break,
                _ => {}
            }
            self.bump();
            end = self.pos;
        }
        // Leave the terminator for the parser; drop any trailing comment.
        if self.peek_char() == Some('#') {
            while let Some(ch) = self.peek_char() {
                if ch == '\n' {
                    break;
                }
                self.bump();
            }
        }
        self.src[start..end].trim().to_string()
    }
}
