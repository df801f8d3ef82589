//! Abstract syntax tree for SNOMED CT Expression Templates.
//!
//! An expression template is a close-to-normal-form clinical expression in
//! which selected positions are replaced by typed slots:
//!
//! | Slot | Syntax | Replaces |
//! |------|--------|----------|
//! | Concept | `[[+id (<< 404684003) @finding]]` | a concept identifier |
//! | Expression | `[[+scg (< 71388002) @proc]]` | a whole (sub)expression |
//! | Token | `[[+tok (<< <<<) @op]]` | the definition status operator |
//! | Information | `[[1..1 @group]]` | template metadata on a node |
//! | String | `[[+str ("a" "b") @s]]` | a concrete string value |
//! | Integer / Decimal | `[[+int (#1..#10) @n]]` | a concrete numeric value |
//!
//! Every node records its [`Span`] in the source text and implements
//! [`Display`](fmt::Display) so that a parsed template can be printed back to
//! an equivalent canonical form.

use std::fmt;

use crate::token::{is_bare_name_char, Span};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A SNOMED CT concept identifier (6 to 18 digits, no leading zero).
pub type SctId = u64;

// ============================================================================
// Template structure
// ============================================================================

/// A complete expression template.
///
/// The definition status prefix is either literal (`===` or `<<<`), a token
/// replacement slot, or absent. An entirely empty template is valid and has
/// no expression body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExpressionTemplate {
    /// True for an explicit `<<<` (primitive) prefix.
    pub primitive: bool,
    /// True for an explicit `===` (fully defined) prefix.
    pub equivalent: bool,
    /// A token slot standing in for the definition status, if present.
    pub slot: Option<TokenReplacementSlot>,
    /// The expression body; `None` only for the empty template.
    pub expression: Option<SubExpression>,
    /// Source location.
    pub span: Span,
}

impl ExpressionTemplate {
    /// The empty template.
    pub fn empty() -> Self {
        ExpressionTemplate {
            primitive: false,
            equivalent: false,
            slot: None,
            expression: None,
            span: Span::default(),
        }
    }

    /// True if the template has no expression body.
    pub fn is_empty(&self) -> bool {
        self.expression.is_none()
    }
}

impl fmt::Display for ExpressionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(expression) = &self.expression else {
            return Ok(());
        };
        if self.primitive {
            write!(f, "<<< ")?;
        } else if self.equivalent {
            write!(f, "=== ")?;
        } else if let Some(slot) = &self.slot {
            write!(f, "{slot} ")?;
        }
        write!(f, "{expression}")
    }
}

/// One expression: focus concepts joined by `+`, optionally refined.
///
/// Syntax: `71388002 |Procedure| : 260686004 = 129304002`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubExpression {
    /// The focus concepts; at least one.
    pub focus_concepts: Vec<FocusConcept>,
    /// The refinement after `:`, if any.
    pub refinement: Option<Refinement>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for SubExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, focus) in self.focus_concepts.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{focus}")?;
        }
        if let Some(refinement) = &self.refinement {
            write!(f, " : {refinement}")?;
        }
        Ok(())
    }
}

/// A focus concept, optionally annotated with an information slot.
///
/// Syntax: `[[1..1]] 404684003 |Clinical finding|`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FocusConcept {
    /// Template metadata attached to this focus position.
    pub slot: Option<TemplateInformationSlot>,
    /// The concept itself, literal or slotted.
    pub concept: ConceptReference,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for FocusConcept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(slot) = &self.slot {
            write!(f, "{slot} ")?;
        }
        write!(f, "{}", self.concept)
    }
}

/// A concept position: a literal identifier or a replacement slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConceptReference {
    /// A concept or expression replacement slot.
    Slot(ConceptReferenceSlot),
    /// A literal concept identifier with an optional pipe-delimited term.
    Literal {
        /// The concept identifier.
        id: SctId,
        /// The human-readable term, if written.
        term: Option<String>,
        /// Source location.
        span: Span,
    },
}

impl ConceptReference {
    /// A literal reference without a term.
    pub fn literal(id: SctId) -> Self {
        ConceptReference::Literal {
            id,
            term: None,
            span: Span::default(),
        }
    }

    /// The literal identifier, if this is not a slot.
    pub fn id(&self) -> Option<SctId> {
        match self {
            ConceptReference::Literal { id, .. } => Some(*id),
            ConceptReference::Slot(_) => None,
        }
    }

    /// Source location.
    pub fn span(&self) -> Span {
        match self {
            ConceptReference::Slot(slot) => slot.span(),
            ConceptReference::Literal { span, .. } => *span,
        }
    }
}

impl fmt::Display for ConceptReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConceptReference::Slot(slot) => write!(f, "{slot}"),
            ConceptReference::Literal { id, term, span: _ } => {
                write!(f, "{id}")?;
                if let Some(term) = term {
                    write!(f, " |{term}|")?;
                }
                Ok(())
            }
        }
    }
}

/// The two slot kinds that may stand in for a concept reference.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConceptReferenceSlot {
    /// `[[+id ...]]` replaces a single concept identifier.
    Concept(ConceptReplacementSlot),
    /// `[[+scg ...]]` or `[[+ ...]]` replaces a whole subexpression.
    Expression(ExpressionReplacementSlot),
}

impl ConceptReferenceSlot {
    /// Source location.
    pub fn span(&self) -> Span {
        match self {
            ConceptReferenceSlot::Concept(slot) => slot.span,
            ConceptReferenceSlot::Expression(slot) => slot.span,
        }
    }
}

impl fmt::Display for ConceptReferenceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConceptReferenceSlot::Concept(slot) => write!(f, "{slot}"),
            ConceptReferenceSlot::Expression(slot) => write!(f, "{slot}"),
        }
    }
}

// ============================================================================
// Replacement slots
// ============================================================================

/// `[[+id (constraint)? @name?]]` — fills in a concept identifier.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConceptReplacementSlot {
    /// Expression constraint restricting the allowed concepts.
    pub constraint: Option<ExpressionConstraint>,
    /// Slot name, without the `@`.
    pub name: Option<String>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for ConceptReplacementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[+id")?;
        if let Some(constraint) = &self.constraint {
            write!(f, " ({constraint})")?;
        }
        if let Some(name) = &self.name {
            write!(f, " ")?;
            write_slot_name(f, name)?;
        }
        write!(f, "]]")
    }
}

/// `[[+scg? (constraint)? @name?]]` — fills in a whole subexpression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExpressionReplacementSlot {
    /// True if the `scg` marker was written.
    pub scg: bool,
    /// Expression constraint restricting the allowed expressions.
    pub constraint: Option<ExpressionConstraint>,
    /// Slot name, without the `@`.
    pub name: Option<String>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for ExpressionReplacementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[+")?;
        if self.scg {
            write!(f, "scg")?;
        }
        if let Some(constraint) = &self.constraint {
            write!(f, " ({constraint})")?;
        }
        if let Some(name) = &self.name {
            write!(f, " ")?;
            write_slot_name(f, name)?;
        }
        write!(f, "]]")
    }
}

/// `[[+tok (tokens)? @name?]]` — fills in the definition status operator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TokenReplacementSlot {
    /// The operators this slot may be filled with; empty means any.
    pub tokens: Vec<SlotToken>,
    /// Slot name, without the `@`.
    pub name: Option<String>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for TokenReplacementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[+tok")?;
        if !self.tokens.is_empty() {
            write!(f, " (")?;
            for (i, token) in self.tokens.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{token}")?;
            }
            write!(f, ")")?;
        }
        if let Some(name) = &self.name {
            write!(f, " ")?;
            write_slot_name(f, name)?;
        }
        write!(f, "]]")
    }
}

/// `[[cardinality? @name?]]` — attaches template metadata without replacing
/// anything. Appears before focus concepts, attributes and attribute groups.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemplateInformationSlot {
    /// How many times the annotated node may repeat.
    pub cardinality: Option<Cardinality>,
    /// Slot name, without the `@`.
    pub name: Option<String>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for TemplateInformationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[")?;
        if let Some(cardinality) = &self.cardinality {
            write!(f, "{cardinality}")?;
        }
        if let Some(name) = &self.name {
            if self.cardinality.is_some() {
                write!(f, " ")?;
            }
            write_slot_name(f, name)?;
        }
        write!(f, "]]")
    }
}

/// `[[+str ("a" "b") @name?]]` — fills in a concrete string value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StringReplacementSlot {
    /// Allowed values; empty means any string.
    pub values: Vec<String>,
    /// Slot name, without the `@`.
    pub name: Option<String>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for StringReplacementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[+str")?;
        if !self.values.is_empty() {
            write!(f, " (")?;
            for (i, value) in self.values.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write_quoted(f, value)?;
            }
            write!(f, ")")?;
        }
        if let Some(name) = &self.name {
            write!(f, " ")?;
            write_slot_name(f, name)?;
        }
        write!(f, "]]")
    }
}

/// `[[+int (#1 #2..#9) @name?]]` — fills in a concrete integer value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegerReplacementSlot {
    /// Allowed values and ranges; empty means any integer.
    pub values: Vec<SlotInteger>,
    /// Slot name, without the `@`.
    pub name: Option<String>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for IntegerReplacementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[+int")?;
        if !self.values.is_empty() {
            write!(f, " (")?;
            for (i, value) in self.values.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{value}")?;
            }
            write!(f, ")")?;
        }
        if let Some(name) = &self.name {
            write!(f, " ")?;
            write_slot_name(f, name)?;
        }
        write!(f, "]]")
    }
}

/// `[[+dec (#0.5..#1.5) @name?]]` — fills in a concrete decimal value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecimalReplacementSlot {
    /// Allowed values and ranges; empty means any decimal.
    pub values: Vec<SlotDecimal>,
    /// Slot name, without the `@`.
    pub name: Option<String>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for DecimalReplacementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[+dec")?;
        if !self.values.is_empty() {
            write!(f, " (")?;
            for (i, value) in self.values.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{value}")?;
            }
            write!(f, ")")?;
        }
        if let Some(name) = &self.name {
            write!(f, " ")?;
            write_slot_name(f, name)?;
        }
        write!(f, "]]")
    }
}

/// A concrete value slot in attribute value position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConcreteValueReplacementSlot {
    /// A string slot.
    String(StringReplacementSlot),
    /// An integer slot.
    Integer(IntegerReplacementSlot),
    /// A decimal slot.
    Decimal(DecimalReplacementSlot),
}

impl ConcreteValueReplacementSlot {
    /// Source location.
    pub fn span(&self) -> Span {
        match self {
            ConcreteValueReplacementSlot::String(slot) => slot.span,
            ConcreteValueReplacementSlot::Integer(slot) => slot.span,
            ConcreteValueReplacementSlot::Decimal(slot) => slot.span,
        }
    }
}

impl fmt::Display for ConcreteValueReplacementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteValueReplacementSlot::String(slot) => write!(f, "{slot}"),
            ConcreteValueReplacementSlot::Integer(slot) => write!(f, "{slot}"),
            ConcreteValueReplacementSlot::Decimal(slot) => write!(f, "{slot}"),
        }
    }
}

/// An operator a token replacement slot may be filled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SlotToken {
    /// `===`
    EquivalentTo,
    /// `<<<`
    SubtypeOf,
    /// `,`
    Comma,
    /// `AND`
    Conjunction,
    /// `OR`
    Disjunction,
    /// `MINUS`
    Exclusion,
    /// `R`
    Reversed,
    /// `^`
    Caret,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `<<`
    DblLt,
    /// `<!`
    LtEm,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `>>`
    DblGt,
    /// `>!`
    GtEm,
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
}

impl fmt::Display for SlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SlotToken::EquivalentTo => "===",
            SlotToken::SubtypeOf => "<<<",
            SlotToken::Comma => ",",
            SlotToken::Conjunction => "AND",
            SlotToken::Disjunction => "OR",
            SlotToken::Exclusion => "MINUS",
            SlotToken::Reversed => "R",
            SlotToken::Caret => "^",
            SlotToken::Lt => "<",
            SlotToken::Lte => "<=",
            SlotToken::DblLt => "<<",
            SlotToken::LtEm => "<!",
            SlotToken::Gt => ">",
            SlotToken::Gte => ">=",
            SlotToken::DblGt => ">>",
            SlotToken::GtEm => ">!",
            SlotToken::Equal => "=",
            SlotToken::NotEqual => "!=",
        };
        f.write_str(text)
    }
}

// ============================================================================
// Cardinality
// ============================================================================

/// A repetition bound, `min..max` with `*` for an unbounded maximum.
///
/// In information slots the minimum may carry a `~` prefix making it
/// exclusive; ECL cardinalities (`[1..3]`) never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cardinality {
    /// Lower bound.
    pub min: u32,
    /// Upper bound.
    pub max: MaxValue,
    /// True if `~` was written, making the lower bound exclusive.
    pub exclusive_min: bool,
    /// Source location.
    pub span: Span,
}

impl Cardinality {
    /// True if `count` occurrences satisfy this bound.
    pub fn matches(&self, count: u32) -> bool {
        let above_min = if self.exclusive_min {
            count > self.min
        } else {
            count >= self.min
        };
        above_min
            && match self.max {
                MaxValue::Concrete(max) => count <= max,
                MaxValue::Unbounded => true,
            }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exclusive_min {
            write!(f, "~")?;
        }
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// The upper bound of a cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaxValue {
    /// A concrete maximum.
    Concrete(u32),
    /// `*`, no maximum.
    Unbounded,
}

impl fmt::Display for MaxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxValue::Concrete(max) => write!(f, "{max}"),
            MaxValue::Unbounded => write!(f, "*"),
        }
    }
}

// ============================================================================
// Refinements
// ============================================================================

/// Everything after the `:` of a subexpression: ungrouped attributes
/// followed by attribute groups.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Refinement {
    /// Ungrouped attributes; may be empty when the refinement starts with a
    /// group.
    pub attributes: Vec<Attribute>,
    /// Attribute groups, in source order.
    pub groups: Vec<AttributeGroup>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for attribute in &self.attributes {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{attribute}")?;
        }
        for group in &self.groups {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{group}")?;
        }
        Ok(())
    }
}

/// `{ attribute, attribute }` with an optional leading information slot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttributeGroup {
    /// Template metadata attached to the group.
    pub slot: Option<TemplateInformationSlot>,
    /// The grouped attributes; at least one.
    pub attributes: Vec<Attribute>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for AttributeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(slot) = &self.slot {
            write!(f, "{slot} ")?;
        }
        write!(f, "{{ ")?;
        for (i, attribute) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{attribute}")?;
        }
        write!(f, " }}")
    }
}

/// `name = value` with an optional leading information slot.
///
/// Syntax: `[[1..1]] 260686004 |Method| = [[+id (<< 129264002)]]`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Attribute {
    /// Template metadata attached to the attribute.
    pub slot: Option<TemplateInformationSlot>,
    /// The attribute name, literal or slotted.
    pub name: ConceptReference,
    /// The attribute value.
    pub value: AttributeValue,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(slot) = &self.slot {
            write!(f, "{slot} ")?;
        }
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// The right-hand side of an attribute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttributeValue {
    /// A concept reference, literal or slotted.
    Concept(ConceptReference),
    /// A parenthesized nested subexpression.
    Nested(Box<SubExpression>),
    /// A quoted string literal.
    String(StringValue),
    /// `#` integer literal.
    Integer(IntegerValue),
    /// `#` decimal literal.
    Decimal(DecimalValue),
    /// A concrete value replacement slot.
    Slot(ConcreteValueReplacementSlot),
}

impl AttributeValue {
    /// Source location.
    pub fn span(&self) -> Span {
        match self {
            AttributeValue::Concept(concept) => concept.span(),
            AttributeValue::Nested(nested) => nested.span,
            AttributeValue::String(value) => value.span,
            AttributeValue::Integer(value) => value.span,
            AttributeValue::Decimal(value) => value.span,
            AttributeValue::Slot(slot) => slot.span(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Concept(concept) => write!(f, "{concept}"),
            AttributeValue::Nested(nested) => write!(f, "({nested})"),
            AttributeValue::String(value) => write!(f, "{value}"),
            AttributeValue::Integer(value) => write!(f, "{value}"),
            AttributeValue::Decimal(value) => write!(f, "{value}"),
            AttributeValue::Slot(slot) => write!(f, "{slot}"),
        }
    }
}

/// A quoted string attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StringValue {
    /// The string content, escapes resolved.
    pub value: String,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_quoted(f, &self.value)
    }
}

/// A `#`-prefixed integer attribute value, e.g. `#-5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegerValue {
    /// The integer.
    pub value: i64,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for IntegerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.value)
    }
}

/// A `#`-prefixed decimal attribute value, e.g. `#3.14`.
///
/// Printed with at least one fractional digit so a decimal never reads back
/// as an integer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecimalValue {
    /// The decimal.
    pub value: f64,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#")?;
        write_decimal(f, self.value)
    }
}

// ============================================================================
// Slot value ranges
// ============================================================================

/// One entry in an integer slot's value list: a single value or a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SlotInteger {
    /// `#5`
    Value {
        /// The value.
        value: u64,
        /// Source location.
        span: Span,
    },
    /// `#5..#10`, `>#0..`, `..<#100`
    Range(IntegerRange),
}

impl fmt::Display for SlotInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotInteger::Value { value, span: _ } => write!(f, "#{value}"),
            SlotInteger::Range(range) => write!(f, "{range}"),
        }
    }
}

/// An integer range with at least one bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegerRange {
    /// Lower bound, if any.
    pub minimum: Option<RangeBound<u64>>,
    /// Upper bound, if any.
    pub maximum: Option<RangeBound<u64>>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for IntegerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(minimum) = &self.minimum {
            if minimum.exclusive {
                write!(f, ">")?;
            }
            write!(f, "#{}", minimum.value)?;
        }
        write!(f, "..")?;
        if let Some(maximum) = &self.maximum {
            if maximum.exclusive {
                write!(f, "<")?;
            }
            write!(f, "#{}", maximum.value)?;
        }
        Ok(())
    }
}

/// One entry in a decimal slot's value list: a single value or a range.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SlotDecimal {
    /// `#0.5`
    Value {
        /// The value.
        value: f64,
        /// Source location.
        span: Span,
    },
    /// `#0.5..#1.5`, `>#0.0..`, `..<#2.5`
    Range(DecimalRange),
}

impl fmt::Display for SlotDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotDecimal::Value { value, span: _ } => {
                write!(f, "#")?;
                write_decimal(f, *value)
            }
            SlotDecimal::Range(range) => write!(f, "{range}"),
        }
    }
}

/// A decimal range with at least one bound.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecimalRange {
    /// Lower bound, if any.
    pub minimum: Option<RangeBound<f64>>,
    /// Upper bound, if any.
    pub maximum: Option<RangeBound<f64>>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for DecimalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(minimum) = &self.minimum {
            if minimum.exclusive {
                write!(f, ">")?;
            }
            write!(f, "#")?;
            write_decimal(f, minimum.value)?;
        }
        write!(f, "..")?;
        if let Some(maximum) = &self.maximum {
            if maximum.exclusive {
                write!(f, "<")?;
            }
            write!(f, "#")?;
            write_decimal(f, maximum.value)?;
        }
        Ok(())
    }
}

/// A single range bound; `>` before a minimum or `<` before a maximum makes
/// it exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RangeBound<T> {
    /// True if written with an exclusion marker.
    pub exclusive: bool,
    /// The bound value.
    pub value: T,
}

impl<T> RangeBound<T> {
    /// An inclusive bound.
    pub fn inclusive(value: T) -> Self {
        RangeBound {
            exclusive: false,
            value,
        }
    }

    /// An exclusive bound.
    pub fn exclusive(value: T) -> Self {
        RangeBound {
            exclusive: true,
            value,
        }
    }
}

// ============================================================================
// Expression constraints (embedded ECL)
// ============================================================================

/// An expression constraint inside a slot's parentheses.
///
/// Binary operators are left associative, binding loosest to tightest:
/// `OR`, then `AND`/`,`, then `MINUS`. Refinement (`:`) and dotted attribute
/// access (`.`) bind tighter still.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExpressionConstraint {
    /// `left OR right`
    Or {
        /// Left operand.
        left: Box<ExpressionConstraint>,
        /// Right operand.
        right: Box<ExpressionConstraint>,
        /// Source location.
        span: Span,
    },
    /// `left AND right` (or comma)
    And {
        /// Left operand.
        left: Box<ExpressionConstraint>,
        /// Right operand.
        right: Box<ExpressionConstraint>,
        /// Source location.
        span: Span,
    },
    /// `left MINUS right`
    Exclusion {
        /// Left operand.
        left: Box<ExpressionConstraint>,
        /// Right operand.
        right: Box<ExpressionConstraint>,
        /// Source location.
        span: Span,
    },
    /// `constraint : refinement`
    Refined {
        /// The constrained expression.
        constraint: Box<ExpressionConstraint>,
        /// The refinement after the colon.
        refinement: EclRefinement,
        /// Source location.
        span: Span,
    },
    /// `constraint . attribute`
    Dotted {
        /// The source set.
        constraint: Box<ExpressionConstraint>,
        /// The attribute navigated through.
        attribute: Box<ExpressionConstraint>,
        /// Source location.
        span: Span,
    },
    /// `<! focus`
    ChildOf {
        /// The focus concept.
        focus: EclFocusConcept,
        /// Source location.
        span: Span,
    },
    /// `< focus`
    DescendantOf {
        /// The focus concept.
        focus: EclFocusConcept,
        /// Source location.
        span: Span,
    },
    /// `<< focus`
    DescendantOrSelfOf {
        /// The focus concept.
        focus: EclFocusConcept,
        /// Source location.
        span: Span,
    },
    /// `>! focus`
    ParentOf {
        /// The focus concept.
        focus: EclFocusConcept,
        /// Source location.
        span: Span,
    },
    /// `> focus`
    AncestorOf {
        /// The focus concept.
        focus: EclFocusConcept,
        /// Source location.
        span: Span,
    },
    /// `>> focus`
    AncestorOrSelfOf {
        /// The focus concept.
        focus: EclFocusConcept,
        /// Source location.
        span: Span,
    },
    /// A bare focus concept.
    Focus(EclFocusConcept),
}

impl ExpressionConstraint {
    /// Source location.
    pub fn span(&self) -> Span {
        match self {
            ExpressionConstraint::Or { span, .. }
            | ExpressionConstraint::And { span, .. }
            | ExpressionConstraint::Exclusion { span, .. }
            | ExpressionConstraint::Refined { span, .. }
            | ExpressionConstraint::Dotted { span, .. }
            | ExpressionConstraint::ChildOf { span, .. }
            | ExpressionConstraint::DescendantOf { span, .. }
            | ExpressionConstraint::DescendantOrSelfOf { span, .. }
            | ExpressionConstraint::ParentOf { span, .. }
            | ExpressionConstraint::AncestorOf { span, .. }
            | ExpressionConstraint::AncestorOrSelfOf { span, .. } => *span,
            ExpressionConstraint::Focus(focus) => focus.span(),
        }
    }
}

impl fmt::Display for ExpressionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionConstraint::Or { left, right, .. } => write!(f, "{left} OR {right}"),
            ExpressionConstraint::And { left, right, .. } => write!(f, "{left} AND {right}"),
            ExpressionConstraint::Exclusion { left, right, .. } => {
                write!(f, "{left} MINUS {right}")
            }
            ExpressionConstraint::Refined {
                constraint,
                refinement,
                ..
            } => write!(f, "{constraint} : {refinement}"),
            ExpressionConstraint::Dotted {
                constraint,
                attribute,
                ..
            } => write!(f, "{constraint} . {attribute}"),
            ExpressionConstraint::ChildOf { focus, .. } => write!(f, "<! {focus}"),
            ExpressionConstraint::DescendantOf { focus, .. } => write!(f, "< {focus}"),
            ExpressionConstraint::DescendantOrSelfOf { focus, .. } => write!(f, "<< {focus}"),
            ExpressionConstraint::ParentOf { focus, .. } => write!(f, ">! {focus}"),
            ExpressionConstraint::AncestorOf { focus, .. } => write!(f, "> {focus}"),
            ExpressionConstraint::AncestorOrSelfOf { focus, .. } => write!(f, ">> {focus}"),
            ExpressionConstraint::Focus(focus) => write!(f, "{focus}"),
        }
    }
}

/// The operand of a hierarchy operator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EclFocusConcept {
    /// `^ refset` — members of a reference set.
    MemberOf {
        /// The reference set, itself a focus concept.
        inner: Box<EclFocusConcept>,
        /// Source location.
        span: Span,
    },
    /// A literal concept identifier with an optional term.
    ConceptRef {
        /// The concept identifier.
        id: SctId,
        /// The human-readable term, if written.
        term: Option<String>,
        /// Source location.
        span: Span,
    },
    /// `*` — any concept.
    Any {
        /// Source location.
        span: Span,
    },
    /// A parenthesized constraint.
    Nested {
        /// The inner constraint.
        constraint: Box<ExpressionConstraint>,
        /// Source location.
        span: Span,
    },
}

impl EclFocusConcept {
    /// Source location.
    pub fn span(&self) -> Span {
        match self {
            EclFocusConcept::MemberOf { span, .. }
            | EclFocusConcept::ConceptRef { span, .. }
            | EclFocusConcept::Any { span }
            | EclFocusConcept::Nested { span, .. } => *span,
        }
    }
}

impl fmt::Display for EclFocusConcept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EclFocusConcept::MemberOf { inner, .. } => write!(f, "^ {inner}"),
            EclFocusConcept::ConceptRef { id, term, .. } => {
                write!(f, "{id}")?;
                if let Some(term) = term {
                    write!(f, " |{term}|")?;
                }
                Ok(())
            }
            EclFocusConcept::Any { .. } => write!(f, "*"),
            EclFocusConcept::Nested { constraint, .. } => write!(f, "({constraint})"),
        }
    }
}

/// The refinement of a refined expression constraint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EclRefinement {
    /// `left OR right`
    Or {
        /// Left operand.
        left: Box<EclRefinement>,
        /// Right operand.
        right: Box<EclRefinement>,
        /// Source location.
        span: Span,
    },
    /// `left AND right` (or comma)
    And {
        /// Left operand.
        left: Box<EclRefinement>,
        /// Right operand.
        right: Box<EclRefinement>,
        /// Source location.
        span: Span,
    },
    /// A single refinement item.
    Sub(SubRefinement),
}

impl EclRefinement {
    /// Source location.
    pub fn span(&self) -> Span {
        match self {
            EclRefinement::Or { span, .. } | EclRefinement::And { span, .. } => *span,
            EclRefinement::Sub(sub) => sub.span(),
        }
    }
}

impl fmt::Display for EclRefinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EclRefinement::Or { left, right, .. } => write!(f, "{left} OR {right}"),
            EclRefinement::And { left, right, .. } => write!(f, "{left} AND {right}"),
            EclRefinement::Sub(sub) => write!(f, "{sub}"),
        }
    }
}

/// One item of an ECL refinement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SubRefinement {
    /// An attribute constraint.
    Attribute(AttributeConstraint),
    /// A cardinality-qualified attribute group.
    Group(EclAttributeGroup),
    /// A parenthesized refinement.
    Nested {
        /// The inner refinement.
        refinement: Box<EclRefinement>,
        /// Source location.
        span: Span,
    },
}

impl SubRefinement {
    /// Source location.
    pub fn span(&self) -> Span {
        match self {
            SubRefinement::Attribute(attribute) => attribute.span,
            SubRefinement::Group(group) => group.span,
            SubRefinement::Nested { span, .. } => *span,
        }
    }
}

impl fmt::Display for SubRefinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubRefinement::Attribute(attribute) => write!(f, "{attribute}"),
            SubRefinement::Group(group) => write!(f, "{group}"),
            SubRefinement::Nested { refinement, .. } => write!(f, "({refinement})"),
        }
    }
}

/// `[1..3]? { attribute set }` inside an ECL refinement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EclAttributeGroup {
    /// Group cardinality, if written.
    pub cardinality: Option<Cardinality>,
    /// The grouped attribute set.
    pub refinement: Box<EclRefinement>,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for EclAttributeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cardinality) = &self.cardinality {
            write!(f, "[{cardinality}] ")?;
        }
        write!(f, "{{ {} }}", self.refinement)
    }
}

/// `[0..1]? R? attribute-name comparison` inside an ECL refinement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttributeConstraint {
    /// Attribute cardinality, if written.
    pub cardinality: Option<Cardinality>,
    /// True if `R` reverses the direction of the attribute.
    pub reversed: bool,
    /// The attribute name constraint.
    pub attribute: Box<ExpressionConstraint>,
    /// The comparison against the attribute value.
    pub comparison: Comparison,
    /// Source location.
    pub span: Span,
}

impl fmt::Display for AttributeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cardinality) = &self.cardinality {
            write!(f, "[{cardinality}] ")?;
        }
        if self.reversed {
            write!(f, "R ")?;
        }
        write!(f, "{} {}", self.attribute, self.comparison)
    }
}

/// The comparison operator and operand of an attribute constraint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Comparison {
    /// `= constraint`
    AttributeEquals(Box<ExpressionConstraint>),
    /// `!= constraint`
    AttributeNotEquals(Box<ExpressionConstraint>),
    /// `= true` / `= false`
    BooleanEquals(bool),
    /// `!= true` / `!= false`
    BooleanNotEquals(bool),
    /// `= "string"`
    StringEquals(String),
    /// `!= "string"`
    StringNotEquals(String),
    /// `= #int`
    IntegerEquals(i64),
    /// `!= #int`
    IntegerNotEquals(i64),
    /// `> #int`
    IntegerGreaterThan(i64),
    /// `>= #int`
    IntegerGreaterThanEquals(i64),
    /// `< #int`
    IntegerLessThan(i64),
    /// `<= #int`
    IntegerLessThanEquals(i64),
    /// `= #dec`
    DecimalEquals(f64),
    /// `!= #dec`
    DecimalNotEquals(f64),
    /// `> #dec`
    DecimalGreaterThan(f64),
    /// `>= #dec`
    DecimalGreaterThanEquals(f64),
    /// `< #dec`
    DecimalLessThan(f64),
    /// `<= #dec`
    DecimalLessThanEquals(f64),
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::AttributeEquals(constraint) => write!(f, "= {constraint}"),
            Comparison::AttributeNotEquals(constraint) => write!(f, "!= {constraint}"),
            Comparison::BooleanEquals(value) => write!(f, "= {value}"),
            Comparison::BooleanNotEquals(value) => write!(f, "!= {value}"),
            Comparison::StringEquals(value) => {
                write!(f, "= ")?;
                write_quoted(f, value)
            }
            Comparison::StringNotEquals(value) => {
                write!(f, "!= ")?;
                write_quoted(f, value)
            }
            Comparison::IntegerEquals(value) => write!(f, "= #{value}"),
            Comparison::IntegerNotEquals(value) => write!(f, "!= #{value}"),
            Comparison::IntegerGreaterThan(value) => write!(f, "> #{value}"),
            Comparison::IntegerGreaterThanEquals(value) => write!(f, ">= #{value}"),
            Comparison::IntegerLessThan(value) => write!(f, "< #{value}"),
            Comparison::IntegerLessThanEquals(value) => write!(f, "<= #{value}"),
            Comparison::DecimalEquals(value) => {
                write!(f, "= #")?;
                write_decimal(f, *value)
            }
            Comparison::DecimalNotEquals(value) => {
                write!(f, "!= #")?;
                write_decimal(f, *value)
            }
            Comparison::DecimalGreaterThan(value) => {
                write!(f, "> #")?;
                write_decimal(f, *value)
            }
            Comparison::DecimalGreaterThanEquals(value) => {
                write!(f, ">= #")?;
                write_decimal(f, *value)
            }
            Comparison::DecimalLessThan(value) => {
                write!(f, "< #")?;
                write_decimal(f, *value)
            }
            Comparison::DecimalLessThanEquals(value) => {
                write!(f, "<= #")?;
                write_decimal(f, *value)
            }
        }
    }
}

// ============================================================================
// Formatting helpers
// ============================================================================

/// Writes a decimal with at least one fractional digit so the printed form
/// still lexes as a decimal.
fn write_decimal(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.fract() == 0.0 {
        write!(f, "{value:.1}")
    } else {
        write!(f, "{value}")
    }
}

/// Writes a double-quoted string, escaping backslashes and quotes.
fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in value.chars() {
        if c == '\\' || c == '"' {
            write!(f, "\\")?;
        }
        write!(f, "{c}")?;
    }
    write!(f, "\"")
}

/// Writes a slot name, bare when possible and quoted otherwise.
fn write_slot_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if !name.is_empty() && name.chars().all(is_bare_name_char) {
        write!(f, "@{name}")
    } else {
        write!(f, "@")?;
        write_quoted(f, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_template_prints_nothing() {
        assert_eq!(ExpressionTemplate::empty().to_string(), "");
    }

    #[test]
    fn test_concept_reference_display() {
        assert_eq!(ConceptReference::literal(73211009).to_string(), "73211009");
        let with_term = ConceptReference::Literal {
            id: 73211009,
            term: Some("Diabetes mellitus".to_string()),
            span: Span::default(),
        };
        assert_eq!(with_term.to_string(), "73211009 |Diabetes mellitus|");
    }

    #[test]
    fn test_cardinality_display_and_matches() {
        let exact = Cardinality {
            min: 1,
            max: MaxValue::Concrete(1),
            exclusive_min: false,
            span: Span::default(),
        };
        assert_eq!(exact.to_string(), "1..1");
        assert!(exact.matches(1));
        assert!(!exact.matches(0));
        assert!(!exact.matches(2));

        let open = Cardinality {
            min: 0,
            max: MaxValue::Unbounded,
            exclusive_min: true,
            span: Span::default(),
        };
        assert_eq!(open.to_string(), "~0..*");
        assert!(!open.matches(0));
        assert!(open.matches(100));
    }

    #[test]
    fn test_decimal_display_keeps_fraction() {
        let whole = DecimalValue {
            value: 5.0,
            span: Span::default(),
        };
        assert_eq!(whole.to_string(), "#5.0");
        let fractional = DecimalValue {
            value: 3.14,
            span: Span::default(),
        };
        assert_eq!(fractional.to_string(), "#3.14");
    }

    #[test]
    fn test_string_value_escapes() {
        let value = StringValue {
            value: "a\"b\\c".to_string(),
            span: Span::default(),
        };
        assert_eq!(value.to_string(), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn test_slot_name_quoting() {
        let bare = TemplateInformationSlot {
            cardinality: None,
            name: Some("group".to_string()),
            span: Span::default(),
        };
        assert_eq!(bare.to_string(), "[[@group]]");
        let spaced = TemplateInformationSlot {
            cardinality: None,
            name: Some("my slot".to_string()),
            span: Span::default(),
        };
        assert_eq!(spaced.to_string(), "[[@\"my slot\"]]");
    }

    #[test]
    fn test_integer_range_display() {
        let range = SlotInteger::Range(IntegerRange {
            minimum: Some(RangeBound::exclusive(0)),
            maximum: Some(RangeBound::inclusive(10)),
            span: Span::default(),
        });
        assert_eq!(range.to_string(), ">#0..#10");
        let open = SlotInteger::Range(IntegerRange {
            minimum: None,
            maximum: Some(RangeBound::exclusive(100)),
            span: Span::default(),
        });
        assert_eq!(open.to_string(), "..<#100");
    }

    #[test]
    fn test_token_slot_display() {
        let slot = TokenReplacementSlot {
            tokens: vec![SlotToken::DblLt, SlotToken::SubtypeOf],
            name: Some("op".to_string()),
            span: Span::default(),
        };
        assert_eq!(slot.to_string(), "[[+tok (<< <<<) @op]]");
        let bare = TokenReplacementSlot {
            tokens: Vec::new(),
            name: None,
            span: Span::default(),
        };
        assert_eq!(bare.to_string(), "[[+tok]]");
    }

    #[test]
    fn test_expression_slot_display() {
        let slot = ExpressionReplacementSlot {
            scg: false,
            constraint: None,
            name: None,
            span: Span::default(),
        };
        assert_eq!(slot.to_string(), "[[+]]");
        let scg = ExpressionReplacementSlot {
            scg: true,
            constraint: Some(ExpressionConstraint::DescendantOrSelfOf {
                focus: EclFocusConcept::ConceptRef {
                    id: 71388002,
                    term: None,
                    span: Span::default(),
                },
                span: Span::default(),
            }),
            name: Some("proc".to_string()),
            span: Span::default(),
        };
        assert_eq!(scg.to_string(), "[[+scg (<< 71388002) @proc]]");
    }
}
