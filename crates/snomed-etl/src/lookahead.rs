//! Lookahead decisions for the ambiguous points of the grammar.
//!
//! Most choices resolve with a fixed-depth peek: every replacement slot
//! announces its kind within three tokens (`[[`, `+`, marker). The rest
//! genuinely need a trial parse, and all of those go through
//! [`Parser::speculate`], which runs a rule against a marked stream and
//! rewinds unconditionally; a range violation found during the trial is a
//! hard error, not a failed alternative. The trial-parse points are the
//! overloaded comma
//! (attribute separator, group separator, ECL conjunction) and the `[` / `(`
//! heads inside ECL refinements.

use crate::ast::SlotToken;
use crate::error::{EtlError, EtlResult};
use crate::parser::Parser;
use crate::token::TokenKind;

/// Which typed replacement slot a `[[+` opener introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    ConceptId,
    Expression,
    Token,
    String,
    Integer,
    Decimal,
}

/// Marker token after `[[+` for each typed slot kind.
static SLOT_KIND_MARKERS: &[(TokenKind, SlotKind)] = &[
    (TokenKind::IdMarker, SlotKind::ConceptId),
    (TokenKind::ScgMarker, SlotKind::Expression),
    (TokenKind::TokMarker, SlotKind::Token),
    (TokenKind::StrMarker, SlotKind::String),
    (TokenKind::IntMarker, SlotKind::Integer),
    (TokenKind::DecMarker, SlotKind::Decimal),
];

/// The closed set of operators allowed inside a token replacement slot.
pub(crate) static SLOT_TOKEN_KINDS: &[(TokenKind, SlotToken)] = &[
    (TokenKind::EquivalentTo, SlotToken::EquivalentTo),
    (TokenKind::SubtypeOf, SlotToken::SubtypeOf),
    (TokenKind::Comma, SlotToken::Comma),
    (TokenKind::Conjunction, SlotToken::Conjunction),
    (TokenKind::Disjunction, SlotToken::Disjunction),
    (TokenKind::Exclusion, SlotToken::Exclusion),
    (TokenKind::Reversed, SlotToken::Reversed),
    (TokenKind::Caret, SlotToken::Caret),
    (TokenKind::Lt, SlotToken::Lt),
    (TokenKind::Lte, SlotToken::Lte),
    (TokenKind::DblLt, SlotToken::DblLt),
    (TokenKind::LtEm, SlotToken::LtEm),
    (TokenKind::Gt, SlotToken::Gt),
    (TokenKind::Gte, SlotToken::Gte),
    (TokenKind::DblGt, SlotToken::DblGt),
    (TokenKind::GtEm, SlotToken::GtEm),
    (TokenKind::Equal, SlotToken::Equal),
    (TokenKind::NotEqual, SlotToken::NotEqual),
];

impl<'a> Parser<'a> {
    /// Runs a rule speculatively: the stream position is restored whether or
    /// not the rule succeeds, and only success or failure is reported.
    ///
    /// A range violation is not a failed alternative. Every alternative at a
    /// trial point reads the offending range the same way, so rewinding would
    /// only trade a precise error for a vague one. It aborts the trial and
    /// propagates instead.
    pub(crate) fn speculate<T>(
        &mut self,
        rule: impl FnOnce(&mut Self) -> EtlResult<T>,
    ) -> EtlResult<bool> {
        let mark = self.stream.mark();
        let result = rule(self);
        self.stream.rewind(mark);
        match result {
            Ok(_) => Ok(true),
            Err(err @ EtlError::SemanticRangeViolation { .. }) => Err(err),
            Err(_) => Ok(false),
        }
    }

    /// Identifies the typed slot opened by `[[+`, or `None` if the next
    /// tokens do not open one. A `[[+` followed directly by a constraint,
    /// name or closer is an expression slot without the `scg` marker.
    pub(crate) fn typed_slot_kind(&self) -> Option<SlotKind> {
        if self.stream.peek(0) != TokenKind::DoubleSquareOpen
            || self.stream.peek(1) != TokenKind::Plus
        {
            return None;
        }
        let marker = self.stream.peek(2);
        for (kind, slot) in SLOT_KIND_MARKERS {
            if *kind == marker {
                return Some(*slot);
            }
        }
        match marker {
            TokenKind::RoundOpen | TokenKind::SlotName | TokenKind::DoubleSquareClose => {
                Some(SlotKind::Expression)
            }
            _ => None,
        }
    }

    /// True if the next tokens open an information slot (`[[` without `+`).
    pub(crate) fn at_template_information_slot(&self) -> bool {
        self.stream.peek(0) == TokenKind::DoubleSquareOpen
            && self.stream.peek(1) != TokenKind::Plus
    }

    /// True if the next tokens open a token replacement slot.
    pub(crate) fn at_token_replacement_slot(&self) -> bool {
        self.stream.peek(0) == TokenKind::DoubleSquareOpen
            && self.stream.peek(1) == TokenKind::Plus
            && self.stream.peek(2) == TokenKind::TokMarker
    }

    /// True if the next tokens open an attribute group, with or without a
    /// leading information slot.
    pub(crate) fn at_attribute_group(&self) -> bool {
        self.stream.at(TokenKind::CurlyOpen) || self.at_template_information_slot()
    }

    /// Decides whether a refinement opens with an ungrouped attribute or an
    /// attribute group. Only an information slot prefix is ambiguous (it may
    /// annotate either); that case is settled by trial-parsing an attribute.
    pub(crate) fn refinement_starts_with_attribute(&mut self) -> EtlResult<bool> {
        match self.stream.peek(0) {
            TokenKind::CurlyOpen => Ok(false),
            TokenKind::DoubleSquareOpen => {
                if self.stream.peek(1) == TokenKind::Plus {
                    Ok(true)
                } else {
                    self.speculate(Parser::attribute)
                }
            }
            _ => Ok(true),
        }
    }

    /// Decides whether a comma after an ungrouped attribute introduces
    /// another attribute or the first attribute group.
    pub(crate) fn comma_continues_attribute_list(&mut self) -> EtlResult<bool> {
        self.speculate(|p| {
            p.stream.expect(TokenKind::Comma)?;
            p.attribute()
        })
    }

    /// Decides whether a `#` literal ahead is a decimal. The scan walks the
    /// digit run after the optional sign and looks for a dot; the number
    /// rules themselves enforce adjacency when they consume it.
    pub(crate) fn hash_value_is_decimal(&self) -> bool {
        let mut k = 1;
        if matches!(self.stream.peek(k), TokenKind::Plus | TokenKind::Dash) {
            k += 1;
        }
        while matches!(
            self.stream.peek(k),
            TokenKind::Zero | TokenKind::DigitNonZero
        ) {
            k += 1;
        }
        self.stream.peek(k) == TokenKind::Dot
    }
}
