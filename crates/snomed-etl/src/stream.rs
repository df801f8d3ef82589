//! Cursor over a lexed token slice.
//!
//! The parser never touches source text directly; every rule reads through a
//! [`TokenStream`]. Marks are plain positions, so a speculative parse is
//! rewound in constant time no matter how far it ran.

use crate::error::{EtlError, EtlResult};
use crate::token::{Span, Token, TokenKind};

/// A saved stream position, handed back to [`TokenStream::rewind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position(usize);

/// A read cursor over a borrowed token slice.
#[derive(Debug, Clone)]
pub struct TokenStream<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenStream<'a> {
    /// Creates a stream positioned at the first token.
    pub fn new(tokens: &'a [Token]) -> Self {
        TokenStream { tokens, pos: 0 }
    }

    /// Returns the kind of the token `offset` positions ahead without
    /// consuming anything. Past the end this returns [`TokenKind::Eof`].
    pub fn peek(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    /// True if the next token has the given kind.
    pub fn at(&self, kind: TokenKind) -> bool {
        self.peek(0) == kind
    }

    /// True once every token has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Span of the next token, or an empty span just past the last one.
    pub fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(token) => token.span,
            None => {
                let end = self.tokens.last().map_or(0, |t| t.span.end);
                Span::new(end, end)
            }
        }
    }

    /// End offset of the most recently consumed token.
    pub fn previous_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    /// True if the next token starts exactly where the previous one ended.
    /// Number rules use this to reject interior whitespace between digits.
    pub fn contiguous(&self) -> bool {
        match (self.pos.checked_sub(1), self.tokens.get(self.pos)) {
            (Some(prev), Some(next)) => self.tokens[prev].span.end == next.span.start,
            _ => false,
        }
    }

    /// Consumes and returns the next token.
    pub fn consume(&mut self) -> EtlResult<&'a Token> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or(EtlError::UnexpectedEndOfInput)?;
        self.pos += 1;
        Ok(token)
    }

    /// Consumes the next token, requiring it to have the given kind.
    pub fn expect(&mut self, kind: TokenKind) -> EtlResult<&'a Token> {
        match self.tokens.get(self.pos) {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(token)
            }
            Some(token) => Err(EtlError::UnexpectedToken {
                expected: vec![kind],
                found: token.kind,
                span: token.span,
            }),
            None => Err(EtlError::UnexpectedEndOfInput),
        }
    }

    /// Consumes the next token if it has the given kind.
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Saves the current position.
    pub fn mark(&self) -> Position {
        Position(self.pos)
    }

    /// Restores a previously saved position.
    pub fn rewind(&mut self, mark: Position) {
        self.pos = mark.0;
    }
}
