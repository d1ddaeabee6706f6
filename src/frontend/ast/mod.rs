//! Syntax tree produced by the parser. Nodes are immutable once built and
//! owned by their parent; passes walk it with exhaustive matches.

use strum::Display;

use crate::frontend::lexer::Span;

pub mod pretty_print;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Top level statements in program order
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub id: NodeId,
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    // int a, b = expression;
    Declaration(Box<Declaration>),
    // a = expression;
    Assignment(Box<Assignment>),
    // a += expression;
    CompoundAssignment(Box<CompoundAssignment>),
    // if expression: begin ... end (elif ...)* (else ...)?
    Conditional(Box<Conditional>),
    // loopc expression: begin ... end
    Loop(Box<Loop>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Always holds at least one name
    pub names: Vec<Identifier>,
    /// Shared by every declared name
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: Identifier,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundAssignment {
    pub target: Identifier,
    pub operator: CompoundOperator,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    /// The `if` branch followed by any `elif` branches, in source order
    pub branches: Vec<ConditionalBranch>,
    pub otherwise: Option<Body>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    pub id: NodeId,
    pub span: Span,
    pub guard: Expression,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub guard: Expression,
    pub body: Body,
}

/// `begin ... end`. The grammar only admits assignments and compound
/// assignments here.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: NodeId,
    pub span: Span,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Literal),
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperator,
        rhs: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Identifier(Identifier),
    Integer(i32),
}

impl Expression {
    /// The integer value of this expression if it is written as a literal
    pub fn as_integer_literal(&self) -> Option<i32> {
        match &self.kind {
            ExpressionKind::Literal(Literal::Integer(value)) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryOperator {
    pub id: NodeId,
    pub span: Span,
    pub kind: BinaryOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOperatorKind {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulus,
    #[strum(serialize = "^")]
    Power,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "and")]
    LogicalAnd,
    #[strum(serialize = "or")]
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Relational,
    Logical,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add
            | Self::Subtract
            | Self::Multiply
            | Self::Divide
            | Self::Modulus
            | Self::Power => BinaryOperatorClass::Arithmetic,
            Self::Equals
            | Self::NotEquals
            | Self::GreaterThanOrEqualTo
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::LessThan => BinaryOperatorClass::Relational,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompoundOperator {
    pub id: NodeId,
    pub span: Span,
    pub kind: CompoundOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CompoundOperatorKind {
    #[strum(serialize = "+=")]
    Add,
    #[strum(serialize = "-=")]
    Subtract,
    #[strum(serialize = "*=")]
    Multiply,
    #[strum(serialize = "/=")]
    Divide,
}

impl CompoundOperatorKind {
    /// The arithmetic operator combining the current value with the operand
    pub fn arithmetic(self) -> BinaryOperatorKind {
        match self {
            Self::Add => BinaryOperatorKind::Add,
            Self::Subtract => BinaryOperatorKind::Subtract,
            Self::Multiply => BinaryOperatorKind::Multiply,
            Self::Divide => BinaryOperatorKind::Divide,
        }
    }
}
