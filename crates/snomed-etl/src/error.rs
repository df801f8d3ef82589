//! Error types for ETL parsing.

use crate::token::{Span, TokenKind};
use thiserror::Error;

/// Errors that can occur while tokenizing or parsing an expression template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EtlError {
    /// A rule required a specific token kind and the stream yielded another.
    #[error("syntax error at {span}: expected {}, found {found}", expected_one_of(.expected))]
    UnexpectedToken {
        /// The token kinds that would have been accepted at this position.
        expected: Vec<TokenKind>,
        /// The token kind actually found.
        found: TokenKind,
        /// Location of the offending token.
        span: Span,
    },

    /// A required token was absent because the stream was exhausted.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,

    /// No grammar alternative trial-parsed successfully at this position.
    #[error("no viable alternative at {span}")]
    NoViableAlternative {
        /// Location where disambiguation failed.
        span: Span,
    },

    /// Tokens remained after a complete, valid parse of the requested rule.
    #[error("trailing input at {span}")]
    TrailingInput {
        /// Location of the first unconsumed token.
        span: Span,
    },

    /// A cardinality or slot range was well-formed but its lower bound
    /// exceeds its upper bound.
    #[error("range lower bound {min} exceeds upper bound {max} at {span}")]
    SemanticRangeViolation {
        /// The lower bound, as written.
        min: String,
        /// The upper bound, as written.
        max: String,
        /// Location of the range.
        span: Span,
    },

    /// The tokenizer found a character sequence outside the ETL alphabet.
    #[error("invalid token at {span}")]
    InvalidToken {
        /// Location of the unrecognized input.
        span: Span,
    },

    /// A numeric literal does not fit the value type that carries it.
    #[error("numeric literal out of range at {span}")]
    NumericOverflow {
        /// Location of the literal.
        span: Span,
    },
}

/// Result type for ETL operations.
pub type EtlResult<T> = std::result::Result<T, EtlError>;

fn expected_one_of(expected: &[TokenKind]) -> String {
    match expected {
        [single] => single.to_string(),
        _ => format!(
            "one of {}",
            expected
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_token_message_single() {
        let err = EtlError::UnexpectedToken {
            expected: vec![TokenKind::Equal],
            found: TokenKind::Comma,
            span: Span::new(4, 5),
        };
        assert_eq!(err.to_string(), "syntax error at 4..5: expected '=', found ','");
    }

    #[test]
    fn test_unexpected_token_message_set() {
        let err = EtlError::UnexpectedToken {
            expected: vec![TokenKind::Zero, TokenKind::DigitNonZero],
            found: TokenKind::Colon,
            span: Span::new(0, 1),
        };
        assert_eq!(
            err.to_string(),
            "syntax error at 0..1: expected one of digit '0', digit '1'..'9', found ':'"
        );
    }

    #[test]
    fn test_range_violation_message() {
        let err = EtlError::SemanticRangeViolation {
            min: "5".to_string(),
            max: "2".to_string(),
            span: Span::new(2, 6),
        };
        assert_eq!(err.to_string(), "range lower bound 5 exceeds upper bound 2 at 2..6");
    }
}
