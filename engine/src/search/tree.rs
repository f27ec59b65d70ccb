//! Expression tree produced by the parser.

use crate::schema::PathSegment;
use crate::units::Quantity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open character range `[start, end)` in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnaryOperator {
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Not => write!(f, "not"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOperator {
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    On,
    Before,
    After,
    In,
}

impl BinaryOperator {
    /// Whether this operator combines two boolean expressions.
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::On => "on",
            BinaryOperator::Before => "before",
            BinaryOperator::After => "after",
            BinaryOperator::In => "in",
        };
        write!(f, "{}", symbol)
    }
}

/// A dotted attribute path, e.g. `array_attr.?.bool_attr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributePath(pub Vec<PathSegment>);

impl AttributePath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn placeholder_count(&self) -> usize {
        self.0
            .iter()
            .filter(|s| **s == PathSegment::Placeholder)
            .count()
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// A quantity as written in the query together with its normalized value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityLiteral {
    pub magnitude: f64,
    pub units: String,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Literal {
    Boolean(bool),
    Date(NaiveDate),
    Quantity(QuantityLiteral),
    Text(String),
    Tag(String),
    Attribute(AttributePath),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum NodeKind {
    Literal {
        literal: Literal,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Node>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Parenthesized {
        inner: Box<Node>,
    },
}

/// A node of the expression tree with its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn literal(literal: Literal, span: Span) -> Self {
        Self {
            kind: NodeKind::Literal { literal },
            span,
        }
    }

    pub fn unary(operator: UnaryOperator, operand: Node, span: Span) -> Self {
        Self {
            kind: NodeKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            span,
        }
    }

    pub fn binary(operator: BinaryOperator, left: Node, right: Node) -> Self {
        let span = left.span.join(right.span);
        Self {
            kind: NodeKind::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        }
    }

    pub fn parenthesized(inner: Node, span: Span) -> Self {
        Self {
            kind: NodeKind::Parenthesized {
                inner: Box::new(inner),
            },
            span,
        }
    }

    /// The node with any enclosing parentheses removed.
    pub fn without_parentheses(&self) -> &Node {
        match &self.kind {
            NodeKind::Parenthesized { inner } => inner.without_parentheses(),
            _ => self,
        }
    }

    /// The literal of this node, looking through parentheses.
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.without_parentheses().kind {
            NodeKind::Literal { literal } => Some(literal),
            _ => None,
        }
    }
}
