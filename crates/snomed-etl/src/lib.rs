//! # snomed-etl
//!
//! A parser for the SNOMED CT Expression Template Language (ETL).
//!
//! ETL extends SNOMED CT compositional grammar expressions with typed
//! replacement slots, producing templates that can later be filled in to
//! yield concrete clinical expressions:
//!
//! ```text
//! [[+tok (=== <<<) @status]] 71388002 |Procedure| :
//!     [[1..1 @method]] 260686004 |Method| = [[+id (<< 129264002) @action]]
//! ```
//!
//! ## Features
//!
//! - Complete template grammar: definition status headers, focus concepts,
//!   refinements, attribute groups and nested subexpressions
//! - All six slot kinds: concept (`[[+id]]`), expression (`[[+scg]]`), token
//!   (`[[+tok]]`), information (`[[1..1 @name]]`), string (`[[+str]]`) and
//!   numeric (`[[+int]]`, `[[+dec]]`) replacement slots
//! - Embedded expression constraints inside slot parentheses, with the full
//!   operator set: hierarchy operators, `AND`/`OR`/`MINUS`, refinements,
//!   attribute groups, cardinalities and dotted attributes
//! - Spanned AST nodes and structured [`EtlError`] values
//! - Round-trip printing: every node implements `Display` and prints back to
//!   an equivalent canonical form
//! - Optional [serde](https://serde.rs) support behind the `serde` feature
//!
//! ## Example
//!
//! ```
//! use snomed_etl::{parse, ConceptReference, ConceptReferenceSlot};
//!
//! let template = parse("[[+id (<< 404684003 |Clinical finding|) @finding]]").unwrap();
//! let expression = template.expression.as_ref().unwrap();
//! match &expression.focus_concepts[0].concept {
//!     ConceptReference::Slot(ConceptReferenceSlot::Concept(slot)) => {
//!         assert_eq!(slot.name.as_deref(), Some("finding"));
//!     }
//!     other => panic!("unexpected focus: {other:?}"),
//! }
//! ```

#![warn(missing_docs)]

mod ast;
mod error;
mod lookahead;
mod parser;
mod stream;
mod token;

pub use ast::{
    Attribute, AttributeConstraint, AttributeGroup, AttributeValue, Cardinality, Comparison,
    ConceptReference, ConceptReferenceSlot, ConceptReplacementSlot, ConcreteValueReplacementSlot,
    DecimalRange, DecimalReplacementSlot, DecimalValue, EclAttributeGroup, EclFocusConcept,
    EclRefinement, ExpressionConstraint, ExpressionReplacementSlot, ExpressionTemplate,
    FocusConcept, IntegerRange, IntegerReplacementSlot, IntegerValue, MaxValue, RangeBound,
    Refinement, SctId, SlotDecimal, SlotInteger, SlotToken, StringReplacementSlot, StringValue,
    SubExpression, SubRefinement, TemplateInformationSlot, TokenReplacementSlot,
};
pub use error::{EtlError, EtlResult};
pub use parser::{
    parse, parse_concept_reference, parse_concept_reference_tokens, parse_expression_constraint,
    parse_expression_constraint_tokens, parse_expression_template,
    parse_expression_template_tokens, parse_refinement, parse_refinement_tokens,
};
pub use stream::{Position, TokenStream};
pub use token::{tokenize, Span, Token, TokenKind};
