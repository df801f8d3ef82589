//! Tokenizer for the Expression Template Language.
//!
//! ETL has a closed terminal alphabet: punctuation, single digits, a handful
//! of keywords, pipe-delimited terms, quoted strings and `@`-prefixed slot
//! names. Whitespace and comments (`/* */`, `//`) are trivia and never reach
//! the parser. Digits are deliberately emitted one per token so that number
//! rules can reject interior whitespace by checking span adjacency.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, satisfy},
    combinator::{map, value},
    sequence::{delimited, preceded},
    IResult,
};

use crate::error::{EtlError, EtlResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Spans
// ============================================================================

/// A half-open byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ============================================================================
// Token kinds
// ============================================================================

/// The kind of a lexed token.
///
/// Multi-character punctuation always wins over its prefixes (`===` over `=`,
/// `<<` over `<`, `[[` over `[`, `..` over `.`), matching longest-match
/// lexing. Keyword connectives `AND`/`OR`/`MINUS` are case insensitive; the
/// slot type markers (`id`, `scg`, `tok`, `str`, `int`, `dec`), `true`,
/// `false` and the reversal flag `R` are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TokenKind {
    /// `[[`
    DoubleSquareOpen,
    /// `]]`
    DoubleSquareClose,
    /// `[`
    SquareOpen,
    /// `]`
    SquareClose,
    /// `{`
    CurlyOpen,
    /// `}`
    CurlyClose,
    /// `(`
    RoundOpen,
    /// `)`
    RoundClose,
    /// `+`
    Plus,
    /// `-`
    Dash,
    /// `^`
    Caret,
    /// `.`
    Dot,
    /// `..`
    To,
    /// `*`
    Wildcard,
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<<`
    DblLt,
    /// `>>`
    DblGt,
    /// `<!`
    LtEm,
    /// `>!`
    GtEm,
    /// `<=`
    Lte,
    /// `>=`
    Gte,
    /// `<<<`
    SubtypeOf,
    /// `===`
    EquivalentTo,
    /// `#`
    Hash,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `~`
    Tilde,
    /// `AND` (case insensitive)
    Conjunction,
    /// `OR` (case insensitive)
    Disjunction,
    /// `MINUS` (case insensitive)
    Exclusion,
    /// `R`
    Reversed,
    /// `id`
    IdMarker,
    /// `scg`
    ScgMarker,
    /// `tok`
    TokMarker,
    /// `str`
    StrMarker,
    /// `int`
    IntMarker,
    /// `dec`
    DecMarker,
    /// `true`
    True,
    /// `false`
    False,
    /// `0`
    Zero,
    /// A single digit `1`-`9`
    DigitNonZero,
    /// `|...|` term text
    TermString,
    /// `"..."` or `'...'` with backslash escapes
    QuotedString,
    /// `@name` or `@"name"`
    SlotName,
    /// End of the token stream
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::DoubleSquareOpen => "'[['",
            TokenKind::DoubleSquareClose => "']]'",
            TokenKind::SquareOpen => "'['",
            TokenKind::SquareClose => "']'",
            TokenKind::CurlyOpen => "'{'",
            TokenKind::CurlyClose => "'}'",
            TokenKind::RoundOpen => "'('",
            TokenKind::RoundClose => "')'",
            TokenKind::Plus => "'+'",
            TokenKind::Dash => "'-'",
            TokenKind::Caret => "'^'",
            TokenKind::Dot => "'.'",
            TokenKind::To => "'..'",
            TokenKind::Wildcard => "'*'",
            TokenKind::Equal => "'='",
            TokenKind::NotEqual => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::DblLt => "'<<'",
            TokenKind::DblGt => "'>>'",
            TokenKind::LtEm => "'<!'",
            TokenKind::GtEm => "'>!'",
            TokenKind::Lte => "'<='",
            TokenKind::Gte => "'>='",
            TokenKind::SubtypeOf => "'<<<'",
            TokenKind::EquivalentTo => "'==='",
            TokenKind::Hash => "'#'",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "','",
            TokenKind::Tilde => "'~'",
            TokenKind::Conjunction => "'AND'",
            TokenKind::Disjunction => "'OR'",
            TokenKind::Exclusion => "'MINUS'",
            TokenKind::Reversed => "'R'",
            TokenKind::IdMarker => "'id'",
            TokenKind::ScgMarker => "'scg'",
            TokenKind::TokMarker => "'tok'",
            TokenKind::StrMarker => "'str'",
            TokenKind::IntMarker => "'int'",
            TokenKind::DecMarker => "'dec'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Zero => "digit '0'",
            TokenKind::DigitNonZero => "digit '1'..'9'",
            TokenKind::TermString => "term",
            TokenKind::QuotedString => "string",
            TokenKind::SlotName => "slot name",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// A lexed token: kind, payload text and source location.
///
/// For delimited terminals the payload is the content without its delimiters
/// (the term between pipes, the string between quotes with escapes resolved,
/// the slot name without `@`); for everything else it is the matched text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Token {
    /// The token kind.
    pub kind: TokenKind,
    /// The payload text.
    pub text: String,
    /// Source location of the matched text, delimiters included.
    pub span: Span,
}

// ============================================================================
// Tokenizer
// ============================================================================

/// Tokenizes ETL source text.
///
/// Returns [`EtlError::InvalidToken`] on any input outside the ETL alphabet,
/// including a block comment that is never closed. An empty (or all-trivia)
/// input yields an empty token vector.
pub fn tokenize(input: &str) -> EtlResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = skip_trivia(input).map_err(|at| unterminated_comment(input, at))?;
    while !rest.is_empty() {
        let start = input.len() - rest.len();
        let (next, (kind, text)) = lex_token(rest).map_err(|_| {
            let width = rest.chars().next().map_or(1, char::len_utf8);
            EtlError::InvalidToken {
                span: Span::new(start, start + width),
            }
        })?;
        let end = input.len() - next.len();
        tokens.push(Token {
            kind,
            text,
            span: Span::new(start, end),
        });
        rest = skip_trivia(next).map_err(|at| unterminated_comment(input, at))?;
    }
    Ok(tokens)
}

/// Consumes leading whitespace and comments. A block comment with no closing
/// `*/` is an error; `Err` carries the remainder starting at its opener.
fn skip_trivia(mut input: &str) -> Result<&str, &str> {
    loop {
        let trimmed = input.trim_start();
        if let Some(rest) = trimmed.strip_prefix("//") {
            input = rest.find('\n').map_or("", |i| &rest[i + 1..]);
        } else if let Some(rest) = trimmed.strip_prefix("/*") {
            match rest.find("*/") {
                Some(i) => input = &rest[i + 2..],
                None => return Err(trimmed),
            }
        } else {
            return Ok(trimmed);
        }
    }
}

fn unterminated_comment(input: &str, at: &str) -> EtlError {
    let start = input.len() - at.len();
    EtlError::InvalidToken {
        span: Span::new(start, input.len()),
    }
}

fn lex_token(input: &str) -> IResult<&str, (TokenKind, String)> {
    alt((
        punctuation,
        digit,
        term_string,
        map(quoted_string, |s| (TokenKind::QuotedString, s)),
        slot_name,
        word,
    ))(input)
}

fn punctuation(input: &str) -> IResult<&str, (TokenKind, String)> {
    let (rest, kind) = alt((
        // Multi-character operators first so prefixes never shadow them.
        alt((
            value(TokenKind::EquivalentTo, tag("===")),
            value(TokenKind::SubtypeOf, tag("<<<")),
            value(TokenKind::DoubleSquareOpen, tag("[[")),
            value(TokenKind::DoubleSquareClose, tag("]]")),
            value(TokenKind::DblLt, tag("<<")),
            value(TokenKind::DblGt, tag(">>")),
            value(TokenKind::Lte, tag("<=")),
            value(TokenKind::Gte, tag(">=")),
            value(TokenKind::LtEm, tag("<!")),
            value(TokenKind::GtEm, tag(">!")),
            value(TokenKind::NotEqual, tag("!=")),
            value(TokenKind::To, tag("..")),
        )),
        alt((
            value(TokenKind::SquareOpen, char('[')),
            value(TokenKind::SquareClose, char(']')),
            value(TokenKind::CurlyOpen, char('{')),
            value(TokenKind::CurlyClose, char('}')),
            value(TokenKind::RoundOpen, char('(')),
            value(TokenKind::RoundClose, char(')')),
            value(TokenKind::Plus, char('+')),
            value(TokenKind::Dash, char('-')),
            value(TokenKind::Caret, char('^')),
            value(TokenKind::Dot, char('.')),
            value(TokenKind::Wildcard, char('*')),
            value(TokenKind::Equal, char('=')),
            value(TokenKind::Lt, char('<')),
            value(TokenKind::Gt, char('>')),
            value(TokenKind::Hash, char('#')),
            value(TokenKind::Colon, char(':')),
            value(TokenKind::Comma, char(',')),
            value(TokenKind::Tilde, char('~')),
        )),
    ))(input)?;
    let matched = &input[..input.len() - rest.len()];
    Ok((rest, (kind, matched.to_string())))
}

fn digit(input: &str) -> IResult<&str, (TokenKind, String)> {
    let (rest, c) = satisfy(|c| c.is_ascii_digit())(input)?;
    let kind = if c == '0' {
        TokenKind::Zero
    } else {
        TokenKind::DigitNonZero
    };
    Ok((rest, (kind, c.to_string())))
}

fn term_string(input: &str) -> IResult<&str, (TokenKind, String)> {
    let (rest, term) = delimited(char('|'), take_while(|c| c != '|'), char('|'))(input)?;
    Ok((rest, (TokenKind::TermString, term.to_string())))
}

/// `"..."` or `'...'`; a backslash escapes the following character.
fn quoted_string(input: &str) -> IResult<&str, String> {
    let (rest, quote) = alt((char('"'), char('\'')))(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => break,
            }
        } else if c == quote {
            return Ok((&rest[i + c.len_utf8()..], out));
        } else {
            out.push(c);
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Bare slot names run until whitespace or a character that would open or
/// close surrounding syntax. The name may be empty.
pub(crate) fn is_bare_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '\\' | '"' | '\'' | '@' | '[' | ']')
}

fn slot_name(input: &str) -> IResult<&str, (TokenKind, String)> {
    let (rest, name) = preceded(
        char('@'),
        alt((
            quoted_string,
            map(take_while(is_bare_name_char), |s: &str| s.to_string()),
        )),
    )(input)?;
    Ok((rest, (TokenKind::SlotName, name)))
}

fn word(input: &str) -> IResult<&str, (TokenKind, String)> {
    let (rest, w) = take_while1(|c: char| c.is_ascii_alphabetic())(input)?;
    let kind = match w {
        "id" => TokenKind::IdMarker,
        "scg" => TokenKind::ScgMarker,
        "tok" => TokenKind::TokMarker,
        "str" => TokenKind::StrMarker,
        "int" => TokenKind::IntMarker,
        "dec" => TokenKind::DecMarker,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "R" => TokenKind::Reversed,
        _ if w.eq_ignore_ascii_case("AND") => TokenKind::Conjunction,
        _ if w.eq_ignore_ascii_case("OR") => TokenKind::Disjunction,
        _ if w.eq_ignore_ascii_case("MINUS") => TokenKind::Exclusion,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    };
    Ok((rest, (kind, w.to_string())))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    mod punctuation {
        use super::*;

        #[test]
        fn test_longest_match_wins() {
            assert_eq!(kinds("==="), vec![TokenKind::EquivalentTo]);
            assert_eq!(kinds("<<<"), vec![TokenKind::SubtypeOf]);
            assert_eq!(kinds("<<"), vec![TokenKind::DblLt]);
            assert_eq!(kinds("<="), vec![TokenKind::Lte]);
            assert_eq!(kinds("<!"), vec![TokenKind::LtEm]);
            assert_eq!(kinds("[["), vec![TokenKind::DoubleSquareOpen]);
            assert_eq!(kinds(".."), vec![TokenKind::To]);
        }

        #[test]
        fn test_prefix_splits() {
            assert_eq!(kinds("< <"), vec![TokenKind::Lt, TokenKind::Lt]);
            assert_eq!(kinds("[ ["), vec![TokenKind::SquareOpen, TokenKind::SquareOpen]);
            assert_eq!(kinds(". ."), vec![TokenKind::Dot, TokenKind::Dot]);
        }

        #[test]
        fn test_four_angle_brackets() {
            // Greedy from the left: '<<<' then '<'.
            assert_eq!(kinds("<<<<"), vec![TokenKind::SubtypeOf, TokenKind::Lt]);
        }
    }

    mod digits {
        use super::*;

        #[test]
        fn test_one_token_per_digit() {
            let tokens = tokenize("1024").unwrap();
            assert_eq!(tokens.len(), 4);
            assert_eq!(tokens[0].kind, TokenKind::DigitNonZero);
            assert_eq!(tokens[1].kind, TokenKind::Zero);
            assert_eq!(tokens[2].kind, TokenKind::DigitNonZero);
            assert_eq!(tokens[3].kind, TokenKind::DigitNonZero);
        }

        #[test]
        fn test_adjacent_digits_have_touching_spans() {
            let tokens = tokenize("42").unwrap();
            assert_eq!(tokens[0].span.end, tokens[1].span.start);
            let spaced = tokenize("4 2").unwrap();
            assert_ne!(spaced[0].span.end, spaced[1].span.start);
        }
    }

    mod keywords {
        use super::*;

        #[test]
        fn test_connectives_case_insensitive() {
            assert_eq!(kinds("AND and And"), vec![TokenKind::Conjunction; 3]);
            assert_eq!(kinds("OR or"), vec![TokenKind::Disjunction; 2]);
            assert_eq!(kinds("MINUS minus"), vec![TokenKind::Exclusion; 2]);
        }

        #[test]
        fn test_markers_exact_case() {
            assert_eq!(
                kinds("id scg tok str int dec"),
                vec![
                    TokenKind::IdMarker,
                    TokenKind::ScgMarker,
                    TokenKind::TokMarker,
                    TokenKind::StrMarker,
                    TokenKind::IntMarker,
                    TokenKind::DecMarker,
                ]
            );
            assert!(tokenize("ID").is_err());
            assert!(tokenize("Scg").is_err());
        }

        #[test]
        fn test_reversed_flag_exact_case() {
            assert_eq!(kinds("R"), vec![TokenKind::Reversed]);
            assert!(tokenize("r").is_err());
        }

        #[test]
        fn test_unknown_word_rejected() {
            let err = tokenize("descendant").unwrap_err();
            assert!(matches!(err, EtlError::InvalidToken { .. }));
        }
    }

    mod strings {
        use super::*;

        #[test]
        fn test_term_string_payload() {
            let tokens = tokenize("|Clinical finding|").unwrap();
            assert_eq!(tokens[0].kind, TokenKind::TermString);
            assert_eq!(tokens[0].text, "Clinical finding");
        }

        #[test]
        fn test_empty_term() {
            let tokens = tokenize("||").unwrap();
            assert_eq!(tokens[0].text, "");
        }

        #[test]
        fn test_double_and_single_quotes() {
            let tokens = tokenize(r#""five" 'six'"#).unwrap();
            assert_eq!(tokens[0].text, "five");
            assert_eq!(tokens[1].text, "six");
        }

        #[test]
        fn test_escapes_resolved() {
            let tokens = tokenize(r#""a\"b\\c""#).unwrap();
            assert_eq!(tokens[0].text, "a\"b\\c");
        }

        #[test]
        fn test_unterminated_string_rejected() {
            assert!(tokenize("\"open").is_err());
        }
    }

    mod slot_names {
        use super::*;

        #[test]
        fn test_bare_name() {
            let tokens = tokenize("@procedure").unwrap();
            assert_eq!(tokens[0].kind, TokenKind::SlotName);
            assert_eq!(tokens[0].text, "procedure");
        }

        #[test]
        fn test_quoted_name() {
            let tokens = tokenize("@\"my slot\"").unwrap();
            assert_eq!(tokens[0].text, "my slot");
        }

        #[test]
        fn test_bare_name_stops_at_bracket() {
            let tokens = tokenize("@name]]").unwrap();
            assert_eq!(tokens[0].text, "name");
            assert_eq!(tokens[1].kind, TokenKind::DoubleSquareClose);
        }

        #[test]
        fn test_empty_name() {
            let tokens = tokenize("@]]").unwrap();
            assert_eq!(tokens[0].kind, TokenKind::SlotName);
            assert_eq!(tokens[0].text, "");
        }
    }

    mod trivia {
        use super::*;

        #[test]
        fn test_comments_skipped() {
            assert_eq!(
                kinds("= /* block */ = // line\n="),
                vec![TokenKind::Equal; 3]
            );
        }

        #[test]
        fn test_all_trivia_is_empty_stream() {
            assert!(tokenize("  /* nothing */ // here").unwrap().is_empty());
            assert!(tokenize("").unwrap().is_empty());
        }

        #[test]
        fn test_unterminated_block_comment_rejected() {
            let err = tokenize("73211009 /* junk").unwrap_err();
            assert!(matches!(err, EtlError::InvalidToken { span } if span == Span::new(9, 16)));
            assert!(tokenize("/*").is_err());
        }

        #[test]
        fn test_spans_are_byte_offsets() {
            let tokens = tokenize("  ==  #").unwrap();
            assert_eq!(tokens[0].span, Span::new(2, 3));
            assert_eq!(tokens[1].span, Span::new(3, 4));
            assert_eq!(tokens[2].span, Span::new(6, 7));
        }
    }
}
