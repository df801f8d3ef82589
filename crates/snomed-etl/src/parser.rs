//! Recursive descent parser for the Expression Template Language.
//!
//! Each grammar rule is one method on [`Parser`]; rules read tokens through
//! the [`TokenStream`] and never touch source text. Binary ECL operators are
//! parsed with left-associative loops, one precedence level per method. The
//! public entry points tokenize, parse a single rule and then require the
//! stream to be exhausted.

use crate::ast::*;
use crate::error::{EtlError, EtlResult};
use crate::lookahead::{SlotKind, SLOT_TOKEN_KINDS};
use crate::stream::TokenStream;
use crate::token::{tokenize, Span, Token, TokenKind};

// ============================================================================
// Entry points
// ============================================================================

/// Parses a complete expression template. Shorthand for
/// [`parse_expression_template`].
pub fn parse(input: &str) -> EtlResult<ExpressionTemplate> {
    parse_expression_template(input)
}

/// Parses a complete expression template from source text.
pub fn parse_expression_template(input: &str) -> EtlResult<ExpressionTemplate> {
    let tokens = tokenize(input)?;
    parse_expression_template_tokens(&tokens)
}

/// Parses a complete expression template from an already lexed token slice.
pub fn parse_expression_template_tokens(tokens: &[Token]) -> EtlResult<ExpressionTemplate> {
    let mut parser = Parser::new(tokens);
    let template = parser.expression_template()?;
    parser.finish()?;
    Ok(template)
}

/// Parses a standalone expression constraint, as written inside the
/// parentheses of a concept or expression replacement slot.
pub fn parse_expression_constraint(input: &str) -> EtlResult<ExpressionConstraint> {
    let tokens = tokenize(input)?;
    parse_expression_constraint_tokens(&tokens)
}

/// Parses a standalone expression constraint from a token slice.
pub fn parse_expression_constraint_tokens(tokens: &[Token]) -> EtlResult<ExpressionConstraint> {
    let mut parser = Parser::new(tokens);
    let constraint = parser.expression_constraint()?;
    parser.finish()?;
    Ok(constraint)
}

/// Parses a standalone refinement, as written after the `:` of a
/// subexpression.
pub fn parse_refinement(input: &str) -> EtlResult<Refinement> {
    let tokens = tokenize(input)?;
    parse_refinement_tokens(&tokens)
}

/// Parses a standalone refinement from a token slice.
pub fn parse_refinement_tokens(tokens: &[Token]) -> EtlResult<Refinement> {
    let mut parser = Parser::new(tokens);
    let refinement = parser.refinement()?;
    parser.finish()?;
    Ok(refinement)
}

/// Parses a standalone concept reference, literal or slotted.
pub fn parse_concept_reference(input: &str) -> EtlResult<ConceptReference> {
    let tokens = tokenize(input)?;
    parse_concept_reference_tokens(&tokens)
}

/// Parses a standalone concept reference from a token slice.
pub fn parse_concept_reference_tokens(tokens: &[Token]) -> EtlResult<ConceptReference> {
    let mut parser = Parser::new(tokens);
    let reference = parser.concept_reference()?;
    parser.finish()?;
    Ok(reference)
}

// ============================================================================
// Parser
// ============================================================================

pub(crate) struct Parser<'a> {
    pub(crate) stream: TokenStream<'a>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Parser {
            stream: TokenStream::new(tokens),
        }
    }

    /// Fails with [`EtlError::TrailingInput`] unless the stream is exhausted.
    fn finish(&mut self) -> EtlResult<()> {
        if self.stream.is_at_end() {
            Ok(())
        } else {
            Err(EtlError::TrailingInput {
                span: self.stream.current_span(),
            })
        }
    }

    fn start(&self) -> usize {
        self.stream.current_span().start
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.stream.previous_end().max(start))
    }

    /// Builds the error for a position where none of `expected` matched.
    fn unexpected(&self, expected: Vec<TokenKind>) -> EtlError {
        if self.stream.is_at_end() {
            EtlError::UnexpectedEndOfInput
        } else {
            EtlError::UnexpectedToken {
                expected,
                found: self.stream.peek(0),
                span: self.stream.current_span(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Template structure
    // ------------------------------------------------------------------

    /// `(('<<<' | '===' | TokenReplacementSlot)? SubExpression)?`
    fn expression_template(&mut self) -> EtlResult<ExpressionTemplate> {
        if self.stream.is_at_end() {
            return Ok(ExpressionTemplate::empty());
        }
        let start = self.start();
        let mut primitive = false;
        let mut equivalent = false;
        let mut slot = None;
        if self.stream.eat(TokenKind::SubtypeOf) {
            primitive = true;
        } else if self.stream.eat(TokenKind::EquivalentTo) {
            equivalent = true;
        } else if self.at_token_replacement_slot() {
            slot = Some(self.token_replacement_slot()?);
        }
        let expression = self.sub_expression()?;
        Ok(ExpressionTemplate {
            primitive,
            equivalent,
            slot,
            expression: Some(expression),
            span: self.span_from(start),
        })
    }

    /// `FocusConcept ('+' FocusConcept)* (':' Refinement)?`
    fn sub_expression(&mut self) -> EtlResult<SubExpression> {
        let start = self.start();
        let mut focus_concepts = vec![self.focus_concept()?];
        while self.stream.eat(TokenKind::Plus) {
            focus_concepts.push(self.focus_concept()?);
        }
        let refinement = if self.stream.eat(TokenKind::Colon) {
            Some(self.refinement()?)
        } else {
            None
        };
        Ok(SubExpression {
            focus_concepts,
            refinement,
            span: self.span_from(start),
        })
    }

    /// `TemplateInformationSlot? ConceptReference`
    fn focus_concept(&mut self) -> EtlResult<FocusConcept> {
        let start = self.start();
        let slot = if self.at_template_information_slot() {
            Some(self.template_information_slot()?)
        } else {
            None
        };
        let concept = self.concept_reference()?;
        Ok(FocusConcept {
            slot,
            concept,
            span: self.span_from(start),
        })
    }

    /// A literal identifier with optional term, or a concept reference slot.
    pub(crate) fn concept_reference(&mut self) -> EtlResult<ConceptReference> {
        if self.stream.at(TokenKind::DoubleSquareOpen) {
            return Ok(ConceptReference::Slot(self.concept_reference_slot()?));
        }
        let start = self.start();
        let id = self.snomed_identifier()?;
        let term = self.optional_term();
        Ok(ConceptReference::Literal {
            id,
            term,
            span: self.span_from(start),
        })
    }

    fn concept_reference_slot(&mut self) -> EtlResult<ConceptReferenceSlot> {
        match self.typed_slot_kind() {
            Some(SlotKind::ConceptId) => Ok(ConceptReferenceSlot::Concept(
                self.concept_replacement_slot()?,
            )),
            Some(SlotKind::Expression) => Ok(ConceptReferenceSlot::Expression(
                self.expression_replacement_slot()?,
            )),
            _ => Err(EtlError::NoViableAlternative {
                span: self.stream.current_span(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Replacement slots
    // ------------------------------------------------------------------

    /// `'[[' '+' 'id' ('(' ExpressionConstraint ')')? SLOTNAME? ']]'`
    fn concept_replacement_slot(&mut self) -> EtlResult<ConceptReplacementSlot> {
        let start = self.start();
        self.stream.expect(TokenKind::DoubleSquareOpen)?;
        self.stream.expect(TokenKind::Plus)?;
        self.stream.expect(TokenKind::IdMarker)?;
        let constraint = self.optional_slot_constraint()?;
        let name = self.optional_slot_name()?;
        self.stream.expect(TokenKind::DoubleSquareClose)?;
        Ok(ConceptReplacementSlot {
            constraint,
            name,
            span: self.span_from(start),
        })
    }

    /// `'[[' '+' 'scg'? ('(' ExpressionConstraint ')')? SLOTNAME? ']]'`
    fn expression_replacement_slot(&mut self) -> EtlResult<ExpressionReplacementSlot> {
        let start = self.start();
        self.stream.expect(TokenKind::DoubleSquareOpen)?;
        self.stream.expect(TokenKind::Plus)?;
        let scg = self.stream.eat(TokenKind::ScgMarker);
        let constraint = self.optional_slot_constraint()?;
        let name = self.optional_slot_name()?;
        self.stream.expect(TokenKind::DoubleSquareClose)?;
        Ok(ExpressionReplacementSlot {
            scg,
            constraint,
            name,
            span: self.span_from(start),
        })
    }

    /// `'[[' '+' 'tok' ('(' SlotToken+ ')')? SLOTNAME? ']]'`
    fn token_replacement_slot(&mut self) -> EtlResult<TokenReplacementSlot> {
        let start = self.start();
        self.stream.expect(TokenKind::DoubleSquareOpen)?;
        self.stream.expect(TokenKind::Plus)?;
        self.stream.expect(TokenKind::TokMarker)?;
        let mut tokens = Vec::new();
        if self.stream.eat(TokenKind::RoundOpen) {
            tokens.push(self.slot_token()?);
            while !self.stream.at(TokenKind::RoundClose) {
                tokens.push(self.slot_token()?);
            }
            self.stream.expect(TokenKind::RoundClose)?;
        }
        let name = self.optional_slot_name()?;
        self.stream.expect(TokenKind::DoubleSquareClose)?;
        Ok(TokenReplacementSlot {
            tokens,
            name,
            span: self.span_from(start),
        })
    }

    fn slot_token(&mut self) -> EtlResult<SlotToken> {
        let found = self.stream.peek(0);
        for (kind, token) in SLOT_TOKEN_KINDS {
            if *kind == found {
                self.stream.consume()?;
                return Ok(*token);
            }
        }
        Err(self.unexpected(SLOT_TOKEN_KINDS.iter().map(|(kind, _)| *kind).collect()))
    }

    /// `'[[' EtlCardinality? SLOTNAME? ']]'`
    fn template_information_slot(&mut self) -> EtlResult<TemplateInformationSlot> {
        let start = self.start();
        self.stream.expect(TokenKind::DoubleSquareOpen)?;
        let cardinality = if matches!(
            self.stream.peek(0),
            TokenKind::Tilde | TokenKind::Zero | TokenKind::DigitNonZero
        ) {
            Some(self.etl_cardinality()?)
        } else {
            None
        };
        let name = self.optional_slot_name()?;
        self.stream.expect(TokenKind::DoubleSquareClose)?;
        Ok(TemplateInformationSlot {
            cardinality,
            name,
            span: self.span_from(start),
        })
    }

    /// `'[[' '+' 'str' ('(' STRING+ ')')? SLOTNAME? ']]'`
    fn string_replacement_slot(&mut self) -> EtlResult<StringReplacementSlot> {
        let start = self.start();
        self.stream.expect(TokenKind::DoubleSquareOpen)?;
        self.stream.expect(TokenKind::Plus)?;
        self.stream.expect(TokenKind::StrMarker)?;
        let mut values = Vec::new();
        if self.stream.eat(TokenKind::RoundOpen) {
            values.push(self.stream.expect(TokenKind::QuotedString)?.text.clone());
            while !self.stream.at(TokenKind::RoundClose) {
                values.push(self.stream.expect(TokenKind::QuotedString)?.text.clone());
            }
            self.stream.expect(TokenKind::RoundClose)?;
        }
        let name = self.optional_slot_name()?;
        self.stream.expect(TokenKind::DoubleSquareClose)?;
        Ok(StringReplacementSlot {
            values,
            name,
            span: self.span_from(start),
        })
    }

    /// `'[[' '+' 'int' ('(' SlotInteger+ ')')? SLOTNAME? ']]'`
    fn integer_replacement_slot(&mut self) -> EtlResult<IntegerReplacementSlot> {
        let start = self.start();
        self.stream.expect(TokenKind::DoubleSquareOpen)?;
        self.stream.expect(TokenKind::Plus)?;
        self.stream.expect(TokenKind::IntMarker)?;
        let mut values = Vec::new();
        if self.stream.eat(TokenKind::RoundOpen) {
            values.push(self.slot_integer()?);
            while !self.stream.at(TokenKind::RoundClose) {
                values.push(self.slot_integer()?);
            }
            self.stream.expect(TokenKind::RoundClose)?;
        }
        let name = self.optional_slot_name()?;
        self.stream.expect(TokenKind::DoubleSquareClose)?;
        Ok(IntegerReplacementSlot {
            values,
            name,
            span: self.span_from(start),
        })
    }

    /// `'[[' '+' 'dec' ('(' SlotDecimal+ ')')? SLOTNAME? ']]'`
    fn decimal_replacement_slot(&mut self) -> EtlResult<DecimalReplacementSlot> {
        let start = self.start();
        self.stream.expect(TokenKind::DoubleSquareOpen)?;
        self.stream.expect(TokenKind::Plus)?;
        self.stream.expect(TokenKind::DecMarker)?;
        let mut values = Vec::new();
        if self.stream.eat(TokenKind::RoundOpen) {
            values.push(self.slot_decimal()?);
            while !self.stream.at(TokenKind::RoundClose) {
                values.push(self.slot_decimal()?);
            }
            self.stream.expect(TokenKind::RoundClose)?;
        }
        let name = self.optional_slot_name()?;
        self.stream.expect(TokenKind::DoubleSquareClose)?;
        Ok(DecimalReplacementSlot {
            values,
            name,
            span: self.span_from(start),
        })
    }

    fn optional_slot_constraint(&mut self) -> EtlResult<Option<ExpressionConstraint>> {
        if self.stream.eat(TokenKind::RoundOpen) {
            let constraint = self.expression_constraint()?;
            self.stream.expect(TokenKind::RoundClose)?;
            Ok(Some(constraint))
        } else {
            Ok(None)
        }
    }

    fn optional_slot_name(&mut self) -> EtlResult<Option<String>> {
        if self.stream.at(TokenKind::SlotName) {
            Ok(Some(self.stream.consume()?.text.clone()))
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------
    // Slot value ranges
    // ------------------------------------------------------------------

    /// `'#' value | ('>'? '#' min)? '..' ('<'? '#' max)?` with at least one
    /// bound in the range form.
    fn slot_integer(&mut self) -> EtlResult<SlotInteger> {
        let start = self.start();
        if self.stream.eat(TokenKind::To) {
            let maximum = Some(self.slot_integer_maximum()?);
            return Ok(SlotInteger::Range(IntegerRange {
                minimum: None,
                maximum,
                span: self.span_from(start),
            }));
        }
        if self.stream.eat(TokenKind::Gt) {
            self.stream.expect(TokenKind::Hash)?;
            let value = self.non_negative_integer()?;
            self.stream.expect(TokenKind::To)?;
            let maximum = self.optional_slot_integer_maximum()?;
            return Ok(SlotInteger::Range(IntegerRange {
                minimum: Some(RangeBound::exclusive(value)),
                maximum,
                span: self.span_from(start),
            }));
        }
        self.stream.expect(TokenKind::Hash)?;
        let value = self.non_negative_integer()?;
        if self.stream.eat(TokenKind::To) {
            let maximum = self.optional_slot_integer_maximum()?;
            let span = self.span_from(start);
            let minimum = Some(RangeBound::inclusive(value));
            self.check_integer_range(&minimum, &maximum, span)?;
            return Ok(SlotInteger::Range(IntegerRange {
                minimum,
                maximum,
                span,
            }));
        }
        Ok(SlotInteger::Value {
            value,
            span: self.span_from(start),
        })
    }

    fn optional_slot_integer_maximum(&mut self) -> EtlResult<Option<RangeBound<u64>>> {
        if matches!(self.stream.peek(0), TokenKind::Lt | TokenKind::Hash) {
            Ok(Some(self.slot_integer_maximum()?))
        } else {
            Ok(None)
        }
    }

    fn slot_integer_maximum(&mut self) -> EtlResult<RangeBound<u64>> {
        let exclusive = self.stream.eat(TokenKind::Lt);
        self.stream.expect(TokenKind::Hash)?;
        let value = self.non_negative_integer()?;
        Ok(RangeBound {
            exclusive,
            value,
        })
    }

    fn check_integer_range(
        &self,
        minimum: &Option<RangeBound<u64>>,
        maximum: &Option<RangeBound<u64>>,
        span: Span,
    ) -> EtlResult<()> {
        if let (Some(min), Some(max)) = (minimum, maximum) {
            if !min.exclusive && !max.exclusive && min.value > max.value {
                return Err(EtlError::SemanticRangeViolation {
                    min: min.value.to_string(),
                    max: max.value.to_string(),
                    span,
                });
            }
        }
        Ok(())
    }

    /// Decimal counterpart of [`Parser::slot_integer`].
    fn slot_decimal(&mut self) -> EtlResult<SlotDecimal> {
        let start = self.start();
        if self.stream.eat(TokenKind::To) {
            let maximum = Some(self.slot_decimal_maximum()?);
            return Ok(SlotDecimal::Range(DecimalRange {
                minimum: None,
                maximum,
                span: self.span_from(start),
            }));
        }
        if self.stream.eat(TokenKind::Gt) {
            self.stream.expect(TokenKind::Hash)?;
            let value = self.non_negative_decimal()?;
            self.stream.expect(TokenKind::To)?;
            let maximum = self.optional_slot_decimal_maximum()?;
            return Ok(SlotDecimal::Range(DecimalRange {
                minimum: Some(RangeBound::exclusive(value)),
                maximum,
                span: self.span_from(start),
            }));
        }
        self.stream.expect(TokenKind::Hash)?;
        let value = self.non_negative_decimal()?;
        if self.stream.eat(TokenKind::To) {
            let maximum = self.optional_slot_decimal_maximum()?;
            let span = self.span_from(start);
            if let Some(max) = &maximum {
                if !max.exclusive && value > max.value {
                    return Err(EtlError::SemanticRangeViolation {
                        min: value.to_string(),
                        max: max.value.to_string(),
                        span,
                    });
                }
            }
            return Ok(SlotDecimal::Range(DecimalRange {
                minimum: Some(RangeBound::inclusive(value)),
                maximum,
                span,
            }));
        }
        Ok(SlotDecimal::Value {
            value,
            span: self.span_from(start),
        })
    }

    fn optional_slot_decimal_maximum(&mut self) -> EtlResult<Option<RangeBound<f64>>> {
        if matches!(self.stream.peek(0), TokenKind::Lt | TokenKind::Hash) {
            Ok(Some(self.slot_decimal_maximum()?))
        } else {
            Ok(None)
        }
    }

    fn slot_decimal_maximum(&mut self) -> EtlResult<RangeBound<f64>> {
        let exclusive = self.stream.eat(TokenKind::Lt);
        self.stream.expect(TokenKind::Hash)?;
        let value = self.non_negative_decimal()?;
        Ok(RangeBound {
            exclusive,
            value,
        })
    }

    // ------------------------------------------------------------------
    // Cardinality
    // ------------------------------------------------------------------

    /// `'~'? NonNegativeInteger '..' MaxValue` (bracket-free, information
    /// slots only).
    fn etl_cardinality(&mut self) -> EtlResult<Cardinality> {
        let start = self.start();
        let exclusive_min = self.stream.eat(TokenKind::Tilde);
        let (min, max) = self.cardinality_bounds()?;
        let span = self.span_from(start);
        self.check_cardinality(min, max, span)?;
        Ok(Cardinality {
            min,
            max,
            exclusive_min,
            span,
        })
    }

    /// `'[' NonNegativeInteger '..' MaxValue ']'` (ECL form).
    fn ecl_cardinality(&mut self) -> EtlResult<Cardinality> {
        let start = self.start();
        self.stream.expect(TokenKind::SquareOpen)?;
        let (min, max) = self.cardinality_bounds()?;
        self.stream.expect(TokenKind::SquareClose)?;
        let span = self.span_from(start);
        self.check_cardinality(min, max, span)?;
        Ok(Cardinality {
            min,
            max,
            exclusive_min: false,
            span,
        })
    }

    fn cardinality_bounds(&mut self) -> EtlResult<(u32, MaxValue)> {
        let span = self.stream.current_span();
        let min = self.non_negative_integer()?;
        let min = u32::try_from(min).map_err(|_| EtlError::NumericOverflow { span })?;
        self.stream.expect(TokenKind::To)?;
        let max = if self.stream.eat(TokenKind::Wildcard) {
            MaxValue::Unbounded
        } else {
            let span = self.stream.current_span();
            let max = self.non_negative_integer()?;
            MaxValue::Concrete(
                u32::try_from(max).map_err(|_| EtlError::NumericOverflow { span })?,
            )
        };
        Ok((min, max))
    }

    fn check_cardinality(&self, min: u32, max: MaxValue, span: Span) -> EtlResult<()> {
        if let MaxValue::Concrete(max) = max {
            if min > max {
                return Err(EtlError::SemanticRangeViolation {
                    min: min.to_string(),
                    max: max.to_string(),
                    span,
                });
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Refinements
    // ------------------------------------------------------------------

    /// `(Attribute (',' Attribute)* | AttributeGroup) (','? AttributeGroup)*`
    ///
    /// The comma after the attribute list is overloaded: it may introduce
    /// another attribute or the first group, so each one is settled by a
    /// trial parse before it is consumed.
    pub(crate) fn refinement(&mut self) -> EtlResult<Refinement> {
        let start = self.start();
        let mut attributes = Vec::new();
        let mut groups = Vec::new();
        if self.refinement_starts_with_attribute()? {
            attributes.push(self.attribute()?);
            while self.stream.at(TokenKind::Comma) && self.comma_continues_attribute_list()? {
                self.stream.expect(TokenKind::Comma)?;
                attributes.push(self.attribute()?);
            }
        } else {
            groups.push(self.attribute_group()?);
        }
        loop {
            if self.stream.eat(TokenKind::Comma) {
                groups.push(self.attribute_group()?);
            } else if self.at_attribute_group() {
                groups.push(self.attribute_group()?);
            } else {
                break;
            }
        }
        Ok(Refinement {
            attributes,
            groups,
            span: self.span_from(start),
        })
    }

    /// `TemplateInformationSlot? '{' Attribute (',' Attribute)* '}'`
    fn attribute_group(&mut self) -> EtlResult<AttributeGroup> {
        let start = self.start();
        let slot = if self.at_template_information_slot() {
            Some(self.template_information_slot()?)
        } else {
            None
        };
        self.stream.expect(TokenKind::CurlyOpen)?;
        let mut attributes = vec![self.attribute()?];
        while self.stream.eat(TokenKind::Comma) {
            attributes.push(self.attribute()?);
        }
        self.stream.expect(TokenKind::CurlyClose)?;
        Ok(AttributeGroup {
            slot,
            attributes,
            span: self.span_from(start),
        })
    }

    /// `TemplateInformationSlot? ConceptReference '=' AttributeValue`
    pub(crate) fn attribute(&mut self) -> EtlResult<Attribute> {
        let start = self.start();
        let slot = if self.at_template_information_slot() {
            Some(self.template_information_slot()?)
        } else {
            None
        };
        let name = self.concept_reference()?;
        self.stream.expect(TokenKind::Equal)?;
        let value = self.attribute_value()?;
        Ok(Attribute {
            slot,
            name,
            value,
            span: self.span_from(start),
        })
    }

    fn attribute_value(&mut self) -> EtlResult<AttributeValue> {
        match self.stream.peek(0) {
            TokenKind::RoundOpen => {
                self.stream.consume()?;
                let nested = self.sub_expression()?;
                self.stream.expect(TokenKind::RoundClose)?;
                Ok(AttributeValue::Nested(Box::new(nested)))
            }
            TokenKind::QuotedString => {
                let token = self.stream.consume()?;
                Ok(AttributeValue::String(StringValue {
                    value: token.text.clone(),
                    span: token.span,
                }))
            }
            TokenKind::Hash => {
                if self.hash_value_is_decimal() {
                    Ok(AttributeValue::Decimal(self.decimal_value()?))
                } else {
                    Ok(AttributeValue::Integer(self.integer_value()?))
                }
            }
            TokenKind::DoubleSquareOpen => match self.typed_slot_kind() {
                Some(SlotKind::String) => Ok(AttributeValue::Slot(
                    ConcreteValueReplacementSlot::String(self.string_replacement_slot()?),
                )),
                Some(SlotKind::Integer) => Ok(AttributeValue::Slot(
                    ConcreteValueReplacementSlot::Integer(self.integer_replacement_slot()?),
                )),
                Some(SlotKind::Decimal) => Ok(AttributeValue::Slot(
                    ConcreteValueReplacementSlot::Decimal(self.decimal_replacement_slot()?),
                )),
                Some(SlotKind::ConceptId) | Some(SlotKind::Expression) => {
                    Ok(AttributeValue::Concept(self.concept_reference()?))
                }
                _ => Err(EtlError::NoViableAlternative {
                    span: self.stream.current_span(),
                }),
            },
            TokenKind::DigitNonZero => Ok(AttributeValue::Concept(self.concept_reference()?)),
            _ => Err(self.unexpected(vec![
                TokenKind::RoundOpen,
                TokenKind::QuotedString,
                TokenKind::Hash,
                TokenKind::DoubleSquareOpen,
                TokenKind::DigitNonZero,
            ])),
        }
    }

    fn integer_value(&mut self) -> EtlResult<IntegerValue> {
        let start = self.start();
        self.stream.expect(TokenKind::Hash)?;
        let value = self.integer()?;
        Ok(IntegerValue {
            value,
            span: self.span_from(start),
        })
    }

    fn decimal_value(&mut self) -> EtlResult<DecimalValue> {
        let start = self.start();
        self.stream.expect(TokenKind::Hash)?;
        let value = self.decimal()?;
        Ok(DecimalValue {
            value,
            span: self.span_from(start),
        })
    }

    // ------------------------------------------------------------------
    // Expression constraints (embedded ECL)
    // ------------------------------------------------------------------

    pub(crate) fn expression_constraint(&mut self) -> EtlResult<ExpressionConstraint> {
        self.or_expression_constraint()
    }

    fn or_expression_constraint(&mut self) -> EtlResult<ExpressionConstraint> {
        let start = self.start();
        let mut left = self.and_expression_constraint()?;
        while self.stream.eat(TokenKind::Disjunction) {
            let right = self.and_expression_constraint()?;
            left = ExpressionConstraint::Or {
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    /// The conjunction connective is spelled `AND` or a bare comma.
    fn and_expression_constraint(&mut self) -> EtlResult<ExpressionConstraint> {
        let start = self.start();
        let mut left = self.exclusion_expression_constraint()?;
        while matches!(
            self.stream.peek(0),
            TokenKind::Conjunction | TokenKind::Comma
        ) {
            self.stream.consume()?;
            let right = self.exclusion_expression_constraint()?;
            left = ExpressionConstraint::And {
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn exclusion_expression_constraint(&mut self) -> EtlResult<ExpressionConstraint> {
        let start = self.start();
        let mut left = self.refined_expression_constraint()?;
        while self.stream.eat(TokenKind::Exclusion) {
            let right = self.refined_expression_constraint()?;
            left = ExpressionConstraint::Exclusion {
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn refined_expression_constraint(&mut self) -> EtlResult<ExpressionConstraint> {
        let start = self.start();
        let constraint = self.dotted_expression_constraint()?;
        if self.stream.eat(TokenKind::Colon) {
            let refinement = self.ecl_refinement()?;
            return Ok(ExpressionConstraint::Refined {
                constraint: Box::new(constraint),
                refinement,
                span: self.span_from(start),
            });
        }
        Ok(constraint)
    }

    fn dotted_expression_constraint(&mut self) -> EtlResult<ExpressionConstraint> {
        let start = self.start();
        let mut constraint = self.sub_expression_constraint()?;
        while self.stream.eat(TokenKind::Dot) {
            let attribute = self.sub_expression_constraint()?;
            constraint = ExpressionConstraint::Dotted {
                constraint: Box::new(constraint),
                attribute: Box::new(attribute),
                span: self.span_from(start),
            };
        }
        Ok(constraint)
    }

    fn sub_expression_constraint(&mut self) -> EtlResult<ExpressionConstraint> {
        let start = self.start();
        let operator = match self.stream.peek(0) {
            kind @ (TokenKind::LtEm
            | TokenKind::Lt
            | TokenKind::DblLt
            | TokenKind::GtEm
            | TokenKind::Gt
            | TokenKind::DblGt) => {
                self.stream.consume()?;
                Some(kind)
            }
            _ => None,
        };
        let focus = self.ecl_focus_concept()?;
        let span = self.span_from(start);
        Ok(match operator {
            Some(TokenKind::LtEm) => ExpressionConstraint::ChildOf { focus, span },
            Some(TokenKind::Lt) => ExpressionConstraint::DescendantOf { focus, span },
            Some(TokenKind::DblLt) => ExpressionConstraint::DescendantOrSelfOf { focus, span },
            Some(TokenKind::GtEm) => ExpressionConstraint::ParentOf { focus, span },
            Some(TokenKind::Gt) => ExpressionConstraint::AncestorOf { focus, span },
            Some(TokenKind::DblGt) => ExpressionConstraint::AncestorOrSelfOf { focus, span },
            _ => ExpressionConstraint::Focus(focus),
        })
    }

    fn ecl_focus_concept(&mut self) -> EtlResult<EclFocusConcept> {
        let start = self.start();
        match self.stream.peek(0) {
            TokenKind::Caret => {
                self.stream.consume()?;
                let inner = self.member_of_target()?;
                Ok(EclFocusConcept::MemberOf {
                    inner: Box::new(inner),
                    span: self.span_from(start),
                })
            }
            _ => self.member_of_target(),
        }
    }

    /// A focus concept without the member-of prefix.
    fn member_of_target(&mut self) -> EtlResult<EclFocusConcept> {
        let start = self.start();
        match self.stream.peek(0) {
            TokenKind::Wildcard => {
                self.stream.consume()?;
                Ok(EclFocusConcept::Any {
                    span: self.span_from(start),
                })
            }
            TokenKind::RoundOpen => {
                self.stream.consume()?;
                let constraint = self.or_expression_constraint()?;
                self.stream.expect(TokenKind::RoundClose)?;
                Ok(EclFocusConcept::Nested {
                    constraint: Box::new(constraint),
                    span: self.span_from(start),
                })
            }
            TokenKind::DigitNonZero => {
                let id = self.snomed_identifier()?;
                let term = self.optional_term();
                Ok(EclFocusConcept::ConceptRef {
                    id,
                    term,
                    span: self.span_from(start),
                })
            }
            _ => Err(self.unexpected(vec![
                TokenKind::Caret,
                TokenKind::Wildcard,
                TokenKind::RoundOpen,
                TokenKind::DigitNonZero,
            ])),
        }
    }

    // ------------------------------------------------------------------
    // ECL refinements
    // ------------------------------------------------------------------

    fn ecl_refinement(&mut self) -> EtlResult<EclRefinement> {
        self.or_refinement()
    }

    /// A connective is taken at this level only when the whole right-hand
    /// side also parses as a refinement item; otherwise it is left for the
    /// enclosing expression constraint.
    fn or_refinement(&mut self) -> EtlResult<EclRefinement> {
        let start = self.start();
        let mut left = self.and_refinement()?;
        while self.stream.at(TokenKind::Disjunction)
            && self.speculate(|p| {
                p.stream.expect(TokenKind::Disjunction)?;
                p.and_refinement()
            })?
        {
            self.stream.expect(TokenKind::Disjunction)?;
            let right = self.and_refinement()?;
            left = EclRefinement::Or {
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn and_refinement(&mut self) -> EtlResult<EclRefinement> {
        let start = self.start();
        let mut left = EclRefinement::Sub(self.sub_refinement()?);
        while matches!(
            self.stream.peek(0),
            TokenKind::Conjunction | TokenKind::Comma
        ) && self.speculate(|p| {
            p.stream.consume()?;
            p.sub_refinement()
        })? {
            self.stream.consume()?;
            let right = EclRefinement::Sub(self.sub_refinement()?);
            left = EclRefinement::And {
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    /// `AttributeConstraint | EclAttributeGroup | '(' EclRefinement ')'`
    ///
    /// Both `[` (cardinality) and `(` (nested name or nested refinement) can
    /// open more than one alternative; an attribute constraint wins whenever
    /// its trial parse succeeds.
    fn sub_refinement(&mut self) -> EtlResult<SubRefinement> {
        match self.stream.peek(0) {
            TokenKind::CurlyOpen => Ok(SubRefinement::Group(self.ecl_attribute_group()?)),
            TokenKind::SquareOpen => {
                if self.speculate(Parser::attribute_constraint)? {
                    Ok(SubRefinement::Attribute(self.attribute_constraint()?))
                } else if self.speculate(Parser::ecl_attribute_group)? {
                    Ok(SubRefinement::Group(self.ecl_attribute_group()?))
                } else {
                    Err(EtlError::NoViableAlternative {
                        span: self.stream.current_span(),
                    })
                }
            }
            TokenKind::RoundOpen => {
                if self.speculate(Parser::attribute_constraint)? {
                    Ok(SubRefinement::Attribute(self.attribute_constraint()?))
                } else if self.speculate(Parser::nested_refinement)? {
                    self.nested_refinement()
                } else {
                    Err(EtlError::NoViableAlternative {
                        span: self.stream.current_span(),
                    })
                }
            }
            _ => Ok(SubRefinement::Attribute(self.attribute_constraint()?)),
        }
    }

    fn nested_refinement(&mut self) -> EtlResult<SubRefinement> {
        let start = self.start();
        self.stream.expect(TokenKind::RoundOpen)?;
        let refinement = self.ecl_refinement()?;
        self.stream.expect(TokenKind::RoundClose)?;
        Ok(SubRefinement::Nested {
            refinement: Box::new(refinement),
            span: self.span_from(start),
        })
    }

    /// `EclCardinality? '{' EclAttributeSet '}'`
    fn ecl_attribute_group(&mut self) -> EtlResult<EclAttributeGroup> {
        let start = self.start();
        let cardinality = if self.stream.at(TokenKind::SquareOpen) {
            Some(self.ecl_cardinality()?)
        } else {
            None
        };
        self.stream.expect(TokenKind::CurlyOpen)?;
        let refinement = self.ecl_attribute_set()?;
        self.stream.expect(TokenKind::CurlyClose)?;
        Ok(EclAttributeGroup {
            cardinality,
            refinement: Box::new(refinement),
            span: self.span_from(start),
        })
    }

    /// Attribute sets inside group braces: the same connective structure as
    /// a refinement, but group items are not allowed to nest further groups.
    fn ecl_attribute_set(&mut self) -> EtlResult<EclRefinement> {
        let start = self.start();
        let mut left = self.and_attribute_set()?;
        while self.stream.at(TokenKind::Disjunction)
            && self.speculate(|p| {
                p.stream.expect(TokenKind::Disjunction)?;
                p.and_attribute_set()
            })?
        {
            self.stream.expect(TokenKind::Disjunction)?;
            let right = self.and_attribute_set()?;
            left = EclRefinement::Or {
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn and_attribute_set(&mut self) -> EtlResult<EclRefinement> {
        let start = self.start();
        let mut left = EclRefinement::Sub(self.sub_attribute_set()?);
        while matches!(
            self.stream.peek(0),
            TokenKind::Conjunction | TokenKind::Comma
        ) && self.speculate(|p| {
            p.stream.consume()?;
            p.sub_attribute_set()
        })? {
            self.stream.consume()?;
            let right = EclRefinement::Sub(self.sub_attribute_set()?);
            left = EclRefinement::And {
                left: Box::new(left),
                right: Box::new(right),
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn sub_attribute_set(&mut self) -> EtlResult<SubRefinement> {
        if self.stream.at(TokenKind::RoundOpen) {
            if self.speculate(Parser::attribute_constraint)? {
                return Ok(SubRefinement::Attribute(self.attribute_constraint()?));
            }
            let start = self.start();
            self.stream.expect(TokenKind::RoundOpen)?;
            let refinement = self.ecl_attribute_set()?;
            self.stream.expect(TokenKind::RoundClose)?;
            return Ok(SubRefinement::Nested {
                refinement: Box::new(refinement),
                span: self.span_from(start),
            });
        }
        Ok(SubRefinement::Attribute(self.attribute_constraint()?))
    }

    /// `EclCardinality? 'R'? SubExpressionConstraint Comparison`
    fn attribute_constraint(&mut self) -> EtlResult<AttributeConstraint> {
        let start = self.start();
        let cardinality = if self.stream.at(TokenKind::SquareOpen) {
            Some(self.ecl_cardinality()?)
        } else {
            None
        };
        let reversed = self.stream.eat(TokenKind::Reversed);
        let attribute = self.sub_expression_constraint()?;
        let comparison = self.comparison()?;
        Ok(AttributeConstraint {
            cardinality,
            reversed,
            attribute: Box::new(attribute),
            comparison,
            span: self.span_from(start),
        })
    }

    fn comparison(&mut self) -> EtlResult<Comparison> {
        match self.stream.peek(0) {
            TokenKind::Equal | TokenKind::NotEqual => {
                let negated = self.stream.consume()?.kind == TokenKind::NotEqual;
                match self.stream.peek(0) {
                    TokenKind::True | TokenKind::False => {
                        let value = self.stream.consume()?.kind == TokenKind::True;
                        Ok(if negated {
                            Comparison::BooleanNotEquals(value)
                        } else {
                            Comparison::BooleanEquals(value)
                        })
                    }
                    TokenKind::QuotedString => {
                        let value = self.stream.consume()?.text.clone();
                        Ok(if negated {
                            Comparison::StringNotEquals(value)
                        } else {
                            Comparison::StringEquals(value)
                        })
                    }
                    TokenKind::Hash => {
                        if self.hash_value_is_decimal() {
                            let value = self.hash_decimal()?;
                            Ok(if negated {
                                Comparison::DecimalNotEquals(value)
                            } else {
                                Comparison::DecimalEquals(value)
                            })
                        } else {
                            let value = self.hash_integer()?;
                            Ok(if negated {
                                Comparison::IntegerNotEquals(value)
                            } else {
                                Comparison::IntegerEquals(value)
                            })
                        }
                    }
                    _ => {
                        let constraint = Box::new(self.sub_expression_constraint()?);
                        Ok(if negated {
                            Comparison::AttributeNotEquals(constraint)
                        } else {
                            Comparison::AttributeEquals(constraint)
                        })
                    }
                }
            }
            kind @ (TokenKind::Gt | TokenKind::Gte | TokenKind::Lt | TokenKind::Lte) => {
                self.stream.consume()?;
                if self.hash_value_is_decimal() {
                    let value = self.hash_decimal()?;
                    Ok(match kind {
                        TokenKind::Gt => Comparison::DecimalGreaterThan(value),
                        TokenKind::Gte => Comparison::DecimalGreaterThanEquals(value),
                        TokenKind::Lt => Comparison::DecimalLessThan(value),
                        _ => Comparison::DecimalLessThanEquals(value),
                    })
                } else {
                    let value = self.hash_integer()?;
                    Ok(match kind {
                        TokenKind::Gt => Comparison::IntegerGreaterThan(value),
                        TokenKind::Gte => Comparison::IntegerGreaterThanEquals(value),
                        TokenKind::Lt => Comparison::IntegerLessThan(value),
                        _ => Comparison::IntegerLessThanEquals(value),
                    })
                }
            }
            _ => Err(self.unexpected(vec![
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::Gt,
                TokenKind::Gte,
                TokenKind::Lt,
                TokenKind::Lte,
            ])),
        }
    }

    fn hash_integer(&mut self) -> EtlResult<i64> {
        self.stream.expect(TokenKind::Hash)?;
        self.integer()
    }

    fn hash_decimal(&mut self) -> EtlResult<f64> {
        self.stream.expect(TokenKind::Hash)?;
        self.decimal()
    }

    // ------------------------------------------------------------------
    // Terminals and numbers
    // ------------------------------------------------------------------

    fn optional_term(&mut self) -> Option<String> {
        if self.stream.at(TokenKind::TermString) {
            self.stream.consume().ok().map(|t| t.text.clone())
        } else {
            None
        }
    }

    /// A concept identifier: a nonzero digit followed by at least five more
    /// digits, all adjacent in the source.
    fn snomed_identifier(&mut self) -> EtlResult<SctId> {
        let span = self.stream.current_span();
        let first = self.stream.expect(TokenKind::DigitNonZero)?;
        let mut text = first.text.clone();
        while matches!(
            self.stream.peek(0),
            TokenKind::Zero | TokenKind::DigitNonZero
        ) && self.stream.contiguous()
        {
            text.push_str(&self.stream.consume()?.text);
        }
        if text.len() < 6 {
            return Err(self.unexpected(vec![TokenKind::Zero, TokenKind::DigitNonZero]));
        }
        text.parse()
            .map_err(|_| EtlError::NumericOverflow { span })
    }

    /// The digits of a non-negative integer: `0`, or a nonzero digit
    /// followed by adjacent digits.
    fn non_negative_integer_text(&mut self) -> EtlResult<String> {
        match self.stream.peek(0) {
            TokenKind::Zero => {
                self.stream.consume()?;
                Ok("0".to_string())
            }
            TokenKind::DigitNonZero => {
                let mut text = self.stream.consume()?.text.clone();
                while matches!(
                    self.stream.peek(0),
                    TokenKind::Zero | TokenKind::DigitNonZero
                ) && self.stream.contiguous()
                {
                    text.push_str(&self.stream.consume()?.text);
                }
                Ok(text)
            }
            _ => Err(self.unexpected(vec![TokenKind::Zero, TokenKind::DigitNonZero])),
        }
    }

    fn non_negative_integer(&mut self) -> EtlResult<u64> {
        let span = self.stream.current_span();
        let text = self.non_negative_integer_text()?;
        text.parse()
            .map_err(|_| EtlError::NumericOverflow { span })
    }

    /// Integer part, an adjacent dot, and an optionally empty fraction.
    fn non_negative_decimal(&mut self) -> EtlResult<f64> {
        let span = self.stream.current_span();
        let mut text = self.non_negative_integer_text()?;
        if !(self.stream.at(TokenKind::Dot) && self.stream.contiguous()) {
            return Err(self.unexpected(vec![TokenKind::Dot]));
        }
        self.stream.consume()?;
        text.push('.');
        while matches!(
            self.stream.peek(0),
            TokenKind::Zero | TokenKind::DigitNonZero
        ) && self.stream.contiguous()
        {
            text.push_str(&self.stream.consume()?.text);
        }
        text.parse()
            .map_err(|_| EtlError::NumericOverflow { span })
    }

    /// `('+' | '-')? NonNegativeInteger`, sign adjacent to the digits.
    fn integer(&mut self) -> EtlResult<i64> {
        let span = self.stream.current_span();
        let negative = self.signed_prefix()?;
        let value = self.non_negative_integer()?;
        let magnitude = i64::try_from(value).map_err(|_| EtlError::NumericOverflow { span })?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// `('+' | '-')? NonNegativeDecimal`, sign adjacent to the digits.
    fn decimal(&mut self) -> EtlResult<f64> {
        let negative = self.signed_prefix()?;
        let value = self.non_negative_decimal()?;
        Ok(if negative { -value } else { value })
    }

    fn signed_prefix(&mut self) -> EtlResult<bool> {
        let negative = match self.stream.peek(0) {
            TokenKind::Dash => {
                self.stream.consume()?;
                true
            }
            TokenKind::Plus => {
                self.stream.consume()?;
                false
            }
            _ => return Ok(false),
        };
        if !self.stream.contiguous() {
            return Err(self.unexpected(vec![TokenKind::Zero, TokenKind::DigitNonZero]));
        }
        Ok(negative)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod identifiers {
        use super::*;

        #[test]
        fn test_minimum_length() {
            assert!(parse_concept_reference("100001").is_ok());
            assert!(parse_concept_reference("10001").is_err());
        }

        #[test]
        fn test_leading_zero_rejected() {
            assert!(parse_concept_reference("012345").is_err());
        }

        #[test]
        fn test_interior_whitespace_rejected() {
            // "404 684003" is two runs, neither a valid identifier.
            assert!(parse_concept_reference("404 684003").is_err());
        }

        #[test]
        fn test_term_attaches() {
            let reference = parse_concept_reference("404684003 |Clinical finding|").unwrap();
            match reference {
                ConceptReference::Literal { id, term, .. } => {
                    assert_eq!(id, 404684003);
                    assert_eq!(term.as_deref(), Some("Clinical finding"));
                }
                other => panic!("expected literal, got {other:?}"),
            }
        }

        #[test]
        fn test_oversized_identifier_overflows() {
            // Twenty nines exceeds the 64-bit identifier range.
            let err = parse_concept_reference("99999999999999999999").unwrap_err();
            assert!(matches!(err, EtlError::NumericOverflow { .. }));
        }
    }

    mod templates {
        use super::*;

        #[test]
        fn test_empty_input_is_empty_template() {
            let template = parse("").unwrap();
            assert!(template.is_empty());
            let trivia = parse("  /* nothing */ ").unwrap();
            assert!(trivia.is_empty());
        }

        #[test]
        fn test_definition_status_prefixes() {
            let primitive = parse("<<< 73211009").unwrap();
            assert!(primitive.primitive);
            assert!(!primitive.equivalent);
            let equivalent = parse("=== 73211009").unwrap();
            assert!(equivalent.equivalent);
            let plain = parse("73211009").unwrap();
            assert!(!plain.primitive && !plain.equivalent && plain.slot.is_none());
        }

        #[test]
        fn test_token_slot_header() {
            let template = parse("[[+tok (=== <<<) @status]] 73211009").unwrap();
            let slot = template.slot.unwrap();
            assert_eq!(
                slot.tokens,
                vec![SlotToken::EquivalentTo, SlotToken::SubtypeOf]
            );
            assert_eq!(slot.name.as_deref(), Some("status"));
        }

        #[test]
        fn test_header_without_expression_rejected() {
            assert!(parse("<<<").is_err());
            assert!(parse("[[+tok]]").is_err());
        }

        #[test]
        fn test_multiple_focus_concepts() {
            let template = parse("421720008 + 7946007").unwrap();
            let expression = template.expression.unwrap();
            assert_eq!(expression.focus_concepts.len(), 2);
        }

        #[test]
        fn test_trailing_input_rejected() {
            let err = parse("73211009 )").unwrap_err();
            assert!(matches!(err, EtlError::TrailingInput { .. }));
        }
    }

    mod slots {
        use super::*;

        fn focus_slot(input: &str) -> ConceptReferenceSlot {
            let template = parse(input).unwrap();
            let expression = template.expression.unwrap();
            match expression.focus_concepts[0].concept.clone() {
                ConceptReference::Slot(slot) => slot,
                other => panic!("expected slot, got {other:?}"),
            }
        }

        #[test]
        fn test_concept_slot_with_constraint() {
            let slot = focus_slot("[[+id (<< 404684003 |Clinical finding|) @finding]]");
            match slot {
                ConceptReferenceSlot::Concept(slot) => {
                    assert!(matches!(
                        slot.constraint,
                        Some(ExpressionConstraint::DescendantOrSelfOf { .. })
                    ));
                    assert_eq!(slot.name.as_deref(), Some("finding"));
                }
                other => panic!("expected concept slot, got {other:?}"),
            }
        }

        #[test]
        fn test_bare_expression_slot() {
            let slot = focus_slot("[[+]]");
            assert!(matches!(
                slot,
                ConceptReferenceSlot::Expression(ExpressionReplacementSlot {
                    scg: false,
                    constraint: None,
                    name: None,
                    ..
                })
            ));
        }

        #[test]
        fn test_scg_marker_sets_flag() {
            let slot = focus_slot("[[+scg (< 71388002)]]");
            match slot {
                ConceptReferenceSlot::Expression(slot) => assert!(slot.scg),
                other => panic!("expected expression slot, got {other:?}"),
            }
        }

        #[test]
        fn test_information_slot_on_focus_concept() {
            let template = parse("[[~0..1 @extra]] 73211009").unwrap();
            let expression = template.expression.unwrap();
            let slot = expression.focus_concepts[0].slot.clone().unwrap();
            let cardinality = slot.cardinality.unwrap();
            assert!(cardinality.exclusive_min);
            assert_eq!(cardinality.min, 0);
            assert_eq!(cardinality.max, MaxValue::Concrete(1));
            assert_eq!(slot.name.as_deref(), Some("extra"));
        }

        #[test]
        fn test_empty_information_slot() {
            let template = parse("[[]] 73211009").unwrap();
            let expression = template.expression.unwrap();
            let slot = expression.focus_concepts[0].slot.clone().unwrap();
            assert!(slot.cardinality.is_none());
            assert!(slot.name.is_none());
        }

        #[test]
        fn test_cardinality_bounds_checked() {
            let err = parse("[[5..2]] 73211009").unwrap_err();
            assert!(matches!(err, EtlError::SemanticRangeViolation { .. }));
        }

        #[test]
        fn test_cardinality_bound_overflow() {
            // One past u32::MAX.
            let err = parse("[[4294967296..*]] 73211009").unwrap_err();
            assert!(matches!(err, EtlError::NumericOverflow { .. }));
        }
    }

    mod numeric_slots {
        use super::*;

        fn int_slot(input: &str) -> IntegerReplacementSlot {
            let refinement = parse_refinement(input).unwrap();
            match refinement.attributes[0].value.clone() {
                AttributeValue::Slot(ConcreteValueReplacementSlot::Integer(slot)) => slot,
                other => panic!("expected integer slot, got {other:?}"),
            }
        }

        #[test]
        fn test_integer_values_and_ranges() {
            let slot = int_slot("3311482005 = [[+int (#1 #5..#10 >#0.. ..<#100)]]");
            assert_eq!(slot.values.len(), 4);
            assert!(matches!(slot.values[0], SlotInteger::Value { value: 1, .. }));
            match slot.values[1] {
                SlotInteger::Range(range) => {
                    assert_eq!(range.minimum, Some(RangeBound::inclusive(5)));
                    assert_eq!(range.maximum, Some(RangeBound::inclusive(10)));
                }
                other => panic!("expected range, got {other:?}"),
            }
            match slot.values[2] {
                SlotInteger::Range(range) => {
                    assert_eq!(range.minimum, Some(RangeBound::exclusive(0)));
                    assert_eq!(range.maximum, None);
                }
                other => panic!("expected range, got {other:?}"),
            }
            match slot.values[3] {
                SlotInteger::Range(range) => {
                    assert_eq!(range.minimum, None);
                    assert_eq!(range.maximum, Some(RangeBound::exclusive(100)));
                }
                other => panic!("expected range, got {other:?}"),
            }
        }

        #[test]
        fn test_inverted_slot_range_rejected() {
            assert!(parse_refinement("3311482005 = [[+int (#9..#2)]]").is_err());
        }

        #[test]
        fn test_decimal_slot() {
            let refinement = parse_refinement("3311481003 = [[+dec (#0.5..#1.5) @strength]]").unwrap();
            match refinement.attributes[0].value.clone() {
                AttributeValue::Slot(ConcreteValueReplacementSlot::Decimal(slot)) => {
                    assert_eq!(slot.values.len(), 1);
                    assert_eq!(slot.name.as_deref(), Some("strength"));
                }
                other => panic!("expected decimal slot, got {other:?}"),
            }
        }

        #[test]
        fn test_string_slot() {
            let refinement =
                parse_refinement("3311483000 = [[+str (\"mg\" \"mL\") @unit]]").unwrap();
            match refinement.attributes[0].value.clone() {
                AttributeValue::Slot(ConcreteValueReplacementSlot::String(slot)) => {
                    assert_eq!(slot.values, vec!["mg".to_string(), "mL".to_string()]);
                }
                other => panic!("expected string slot, got {other:?}"),
            }
        }
    }

    mod values {
        use super::*;

        #[test]
        fn test_hash_integer_vs_decimal() {
            let refinement = parse_refinement("1142135004 = #2").unwrap();
            assert!(matches!(
                refinement.attributes[0].value,
                AttributeValue::Integer(IntegerValue { value: 2, .. })
            ));
            let refinement = parse_refinement("1142135004 = #2.5").unwrap();
            match refinement.attributes[0].value {
                AttributeValue::Decimal(DecimalValue { value, .. }) => {
                    assert!((value - 2.5).abs() < f64::EPSILON)
                }
                ref other => panic!("expected decimal, got {other:?}"),
            }
        }

        #[test]
        fn test_negative_integer_value() {
            let refinement = parse_refinement("1142135004 = #-5").unwrap();
            assert!(matches!(
                refinement.attributes[0].value,
                AttributeValue::Integer(IntegerValue { value: -5, .. })
            ));
        }

        #[test]
        fn test_string_attribute_value() {
            let refinement = parse_refinement("3311483000 = \"mg\"").unwrap();
            match &refinement.attributes[0].value {
                AttributeValue::String(value) => assert_eq!(value.value, "mg"),
                other => panic!("expected string, got {other:?}"),
            }
        }

        #[test]
        fn test_nested_subexpression_value() {
            let refinement =
                parse_refinement("363702006 = (254837009 : 272741003 = 24028007)").unwrap();
            match &refinement.attributes[0].value {
                AttributeValue::Nested(nested) => assert!(nested.refinement.is_some()),
                other => panic!("expected nested expression, got {other:?}"),
            }
        }
    }

    mod refinements {
        use super::*;

        #[test]
        fn test_comma_before_group_after_attributes() {
            let refinement = parse_refinement(
                "26643006 = 26643006, { 363702006 = 387517004 }",
            )
            .unwrap();
            assert_eq!(refinement.attributes.len(), 1);
            assert_eq!(refinement.groups.len(), 1);
        }

        #[test]
        fn test_comma_separated_attributes() {
            let refinement =
                parse_refinement("26643006 = 26643006, 363702006 = 387517004").unwrap();
            assert_eq!(refinement.attributes.len(), 2);
            assert!(refinement.groups.is_empty());
        }

        #[test]
        fn test_groups_without_comma() {
            let refinement = parse_refinement(
                "{ 26643006 = 26643006 } { 363702006 = 387517004 }",
            )
            .unwrap();
            assert!(refinement.attributes.is_empty());
            assert_eq!(refinement.groups.len(), 2);
        }

        #[test]
        fn test_information_slot_prefix_disambiguated() {
            // The slot annotates a group here, not an attribute.
            let refinement =
                parse_refinement("[[1..1 @grp]] { 26643006 = 26643006 }").unwrap();
            assert!(refinement.attributes.is_empty());
            assert_eq!(
                refinement.groups[0].slot.as_ref().unwrap().name.as_deref(),
                Some("grp")
            );

            // And an attribute here.
            let refinement =
                parse_refinement("[[1..1 @attr]] 26643006 = 26643006").unwrap();
            assert_eq!(
                refinement.attributes[0].slot.as_ref().unwrap().name.as_deref(),
                Some("attr")
            );
            assert!(refinement.groups.is_empty());
        }
    }

    mod ecl {
        use super::*;

        #[test]
        fn test_hierarchy_operators() {
            assert!(matches!(
                parse_expression_constraint("<! 404684003").unwrap(),
                ExpressionConstraint::ChildOf { .. }
            ));
            assert!(matches!(
                parse_expression_constraint("< 404684003").unwrap(),
                ExpressionConstraint::DescendantOf { .. }
            ));
            assert!(matches!(
                parse_expression_constraint("<< 404684003").unwrap(),
                ExpressionConstraint::DescendantOrSelfOf { .. }
            ));
            assert!(matches!(
                parse_expression_constraint(">! 404684003").unwrap(),
                ExpressionConstraint::ParentOf { .. }
            ));
            assert!(matches!(
                parse_expression_constraint("> 404684003").unwrap(),
                ExpressionConstraint::AncestorOf { .. }
            ));
            assert!(matches!(
                parse_expression_constraint(">> 404684003").unwrap(),
                ExpressionConstraint::AncestorOrSelfOf { .. }
            ));
        }

        #[test]
        fn test_member_of_and_any() {
            let constraint = parse_expression_constraint("^ 700043003").unwrap();
            assert!(matches!(
                constraint,
                ExpressionConstraint::Focus(EclFocusConcept::MemberOf { .. })
            ));
            let any = parse_expression_constraint("< *").unwrap();
            assert!(matches!(
                any,
                ExpressionConstraint::DescendantOf {
                    focus: EclFocusConcept::Any { .. },
                    ..
                }
            ));
        }

        #[test]
        fn test_binary_precedence() {
            // MINUS binds tighter than AND, AND tighter than OR.
            let constraint =
                parse_expression_constraint("100001001 OR 100002008 AND 100003003 MINUS 100004009")
                    .unwrap();
            match constraint {
                ExpressionConstraint::Or { right, .. } => match *right {
                    ExpressionConstraint::And { right, .. } => {
                        assert!(matches!(*right, ExpressionConstraint::Exclusion { .. }))
                    }
                    other => panic!("expected AND, got {other:?}"),
                },
                other => panic!("expected OR, got {other:?}"),
            }
        }

        #[test]
        fn test_left_associativity() {
            let constraint =
                parse_expression_constraint("100001001 MINUS 100002008 MINUS 100003003").unwrap();
            match constraint {
                ExpressionConstraint::Exclusion { left, right, .. } => {
                    assert!(matches!(*left, ExpressionConstraint::Exclusion { .. }));
                    assert!(matches!(*right, ExpressionConstraint::Focus(_)));
                }
                other => panic!("expected MINUS chain, got {other:?}"),
            }
        }

        #[test]
        fn test_comma_is_conjunction() {
            let comma = parse_expression_constraint("100001001 , 100002008").unwrap();
            assert!(matches!(comma, ExpressionConstraint::And { .. }));
        }

        #[test]
        fn test_refined_constraint() {
            let constraint =
                parse_expression_constraint("< 19829001 : 116676008 = 79654002").unwrap();
            match constraint {
                ExpressionConstraint::Refined { refinement, .. } => {
                    assert!(matches!(refinement, EclRefinement::Sub(_)))
                }
                other => panic!("expected refined, got {other:?}"),
            }
        }

        #[test]
        fn test_dotted_attribute() {
            let constraint =
                parse_expression_constraint("< 125605004 . 363698007").unwrap();
            assert!(matches!(constraint, ExpressionConstraint::Dotted { .. }));
        }

        #[test]
        fn test_attribute_group_with_cardinality() {
            let constraint = parse_expression_constraint(
                "< 404684003 : [1..3] { 116676008 = << 79654002 }",
            )
            .unwrap();
            match constraint {
                ExpressionConstraint::Refined { refinement, .. } => match refinement {
                    EclRefinement::Sub(SubRefinement::Group(group)) => {
                        let cardinality = group.cardinality.unwrap();
                        assert_eq!(cardinality.min, 1);
                        assert_eq!(cardinality.max, MaxValue::Concrete(3));
                    }
                    other => panic!("expected group, got {other:?}"),
                },
                other => panic!("expected refined, got {other:?}"),
            }
        }

        #[test]
        fn test_reversed_attribute_and_cardinality() {
            let constraint = parse_expression_constraint(
                "< 91723000 : [0..1] R 363698007 = << 125605004",
            )
            .unwrap();
            match constraint {
                ExpressionConstraint::Refined { refinement, .. } => match refinement {
                    EclRefinement::Sub(SubRefinement::Attribute(attribute)) => {
                        assert!(attribute.reversed);
                        assert!(attribute.cardinality.is_some());
                    }
                    other => panic!("expected attribute, got {other:?}"),
                },
                other => panic!("expected refined, got {other:?}"),
            }
        }

        #[test]
        fn test_comparison_operands() {
            let boolean = parse_expression_constraint("* : 272741003 = true").unwrap();
            let string = parse_expression_constraint("* : 272741003 = \"mg\"").unwrap();
            let integer = parse_expression_constraint("* : 272741003 >= #5").unwrap();
            let decimal = parse_expression_constraint("* : 272741003 < #2.5").unwrap();
            for constraint in [&boolean, &string, &integer, &decimal] {
                assert!(matches!(constraint, ExpressionConstraint::Refined { .. }));
            }
            match decimal {
                ExpressionConstraint::Refined {
                    refinement: EclRefinement::Sub(SubRefinement::Attribute(attribute)),
                    ..
                } => assert!(matches!(
                    attribute.comparison,
                    Comparison::DecimalLessThan(_)
                )),
                other => panic!("expected attribute, got {other:?}"),
            }
        }

        #[test]
        fn test_connective_stays_at_expression_level() {
            // The OR joins two refined constraints; the right-hand side does
            // not parse as a refinement item, so the refinement must not
            // consume the connective.
            let constraint = parse_expression_constraint(
                "< 404684003 : 116676008 = 79654002 OR < 71388002",
            )
            .unwrap();
            match constraint {
                ExpressionConstraint::Or { left, right, .. } => {
                    assert!(matches!(*left, ExpressionConstraint::Refined { .. }));
                    assert!(matches!(
                        *right,
                        ExpressionConstraint::DescendantOf { .. }
                    ));
                }
                other => panic!("expected OR, got {other:?}"),
            }
        }

        #[test]
        fn test_connective_taken_at_refinement_level() {
            let constraint = parse_expression_constraint(
                "< 404684003 : 116676008 = 79654002 AND 363698007 = 113331007",
            )
            .unwrap();
            match constraint {
                ExpressionConstraint::Refined { refinement, .. } => {
                    assert!(matches!(refinement, EclRefinement::And { .. }))
                }
                other => panic!("expected refined, got {other:?}"),
            }
        }

        #[test]
        fn test_ecl_cardinality_bounds_checked() {
            let err =
                parse_expression_constraint("< 404684003 : [3..1] { 116676008 = * }").unwrap_err();
            assert!(matches!(err, EtlError::SemanticRangeViolation { .. }));
        }

        #[test]
        fn test_inverted_ecl_cardinality_on_ungrouped_attribute() {
            let err =
                parse_expression_constraint("< 404684003 : [3..1] 116676008 = *").unwrap_err();
            assert!(matches!(err, EtlError::SemanticRangeViolation { .. }));
        }

        #[test]
        fn test_inverted_slot_cardinality_after_comma() {
            let err = parse_refinement("26643006 = 26643006, [[5..2]] 363702006 = 387517004")
                .unwrap_err();
            assert!(matches!(
                err,
                EtlError::SemanticRangeViolation { ref min, ref max, .. }
                    if min == "5" && max == "2"
            ));
        }
    }
}
