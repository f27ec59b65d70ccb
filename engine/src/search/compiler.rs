//! Turns an expression tree into a [`Filter`].
//!
//! Attribute references are resolved against the action schema here, so
//! type mismatches are reported as diagnostics and never reach evaluation.
//! Any error makes the whole query constantly false.

use super::diagnostics::Diagnostics;
use super::filter::{Comparison, Filter, Operand, Scalar, ValueKind};
use super::tree::{AttributePath, BinaryOperator, Literal, Node, NodeKind, Span, UnaryOperator};
use crate::schema::{PathSegment, PropertySchema, Schema};
use crate::units::{Dimensionality, UnitRegistry};
use serde_json::Value;

/// Compile a parsed query against a schema.
pub fn compile(tree: &Node, schema: &Schema, units: &UnitRegistry) -> (Filter, Diagnostics) {
    let mut compiler = Compiler {
        schema,
        units,
        diagnostics: Diagnostics::new(),
    };

    let filter = compiler
        .compile_node(tree)
        .and_then(|term| compiler.root(term, tree.span));

    let filter = match filter {
        Some(filter) if !compiler.diagnostics.has_errors() => filter,
        _ => Filter::Constant(false),
    };
    (filter, compiler.diagnostics)
}

/// What an attribute path refers to.
#[derive(Debug, Clone)]
enum AttributeKind {
    Value {
        kind: ValueKind,
        /// Known for quantities with declared units
        dimensionality: Option<Dimensionality>,
    },
    Tags,
    /// Objects, arrays and leaf types without search semantics
    Other,
}

/// A compiled subexpression.
#[derive(Debug, Clone)]
enum Term {
    Predicate(Filter),
    Value(Scalar),
    Tag(String),
    Attribute {
        path: AttributePath,
        kind: AttributeKind,
    },
}

struct Compiler<'a> {
    schema: &'a Schema,
    units: &'a UnitRegistry,
    diagnostics: Diagnostics,
}

impl<'a> Compiler<'a> {
    /// Compile a node. `None` means an error has been reported.
    fn compile_node(&mut self, node: &Node) -> Option<Term> {
        match &node.kind {
            NodeKind::Parenthesized { inner } => self.compile_node(inner),
            NodeKind::Literal { literal } => self.compile_literal(literal, node.span),
            NodeKind::Unary { operator, operand } => self.compile_unary(*operator, operand, node.span),
            NodeKind::Binary {
                operator,
                left,
                right,
            } => self.compile_binary(*operator, left, right, node.span),
        }
    }

    fn compile_literal(&mut self, literal: &Literal, span: Span) -> Option<Term> {
        let term = match literal {
            Literal::Boolean(value) => Term::Value(Scalar::Bool(*value)),
            Literal::Date(date) => Term::Value(Scalar::Date(*date)),
            Literal::Quantity(quantity) => Term::Value(Scalar::Quantity(quantity.quantity)),
            Literal::Text(text) => Term::Value(Scalar::Text(text.clone())),
            Literal::Tag(tag) => Term::Tag(tag.clone()),
            Literal::Attribute(path) => {
                let Some(property) = self.schema.resolve(path.segments()) else {
                    self.diagnostics
                        .error("Invalid attribute name", span.start, Some(span.end));
                    return None;
                };
                Term::Attribute {
                    path: path.clone(),
                    kind: self.attribute_kind(property),
                }
            }
        };
        Some(term)
    }

    fn attribute_kind(&self, property: &PropertySchema) -> AttributeKind {
        let value = |kind| AttributeKind::Value {
            kind,
            dimensionality: None,
        };
        match property {
            PropertySchema::Bool => value(ValueKind::Bool),
            PropertySchema::Text => value(ValueKind::Text),
            PropertySchema::Datetime => value(ValueKind::DateTime),
            PropertySchema::Quantity { units } => AttributeKind::Value {
                kind: ValueKind::Quantity,
                dimensionality: units
                    .as_deref()
                    .and_then(|units| self.units.dimensionality_of(units)),
            },
            PropertySchema::Tags => AttributeKind::Tags,
            PropertySchema::Object { .. } | PropertySchema::Array { .. } | PropertySchema::Other(_) => {
                AttributeKind::Other
            }
        }
    }

    fn compile_unary(&mut self, operator: UnaryOperator, operand: &Node, span: Span) -> Option<Term> {
        let UnaryOperator::Not = operator;
        let term = self.compile_node(operand)?;

        if let Term::Value(Scalar::Bool(value)) = term {
            let message = if value {
                "This expression will always be false"
            } else {
                "This expression will always be true"
            };
            self.diagnostics.warning(message, span.start, Some(span.end));
            return Some(Term::Predicate(Filter::Constant(!value)));
        }

        match self.as_predicate(term) {
            Some(filter) => Some(Term::Predicate(Filter::not(filter))),
            None => {
                self.diagnostics
                    .error("Unknown unary operation", span.start, Some(span.end));
                None
            }
        }
    }

    fn compile_binary(
        &mut self,
        operator: BinaryOperator,
        left: &Node,
        right: &Node,
        span: Span,
    ) -> Option<Term> {
        // compile both sides so that errors on either are reported
        let left = self.compile_node(left);
        let right = self.compile_node(right);
        let (left, right) = (left?, right?);

        if operator.is_logical() {
            let (Some(left), Some(right)) = (self.as_predicate(left), self.as_predicate(right))
            else {
                return self.unknown_binary(span);
            };
            let filter = match operator {
                BinaryOperator::And => Filter::and(left, right),
                _ => Filter::or(left, right),
            };
            return Some(Term::Predicate(filter));
        }

        let (Some((left, left_dims)), Some((right, right_dims))) =
            (as_operand(left), as_operand(right))
        else {
            return self.unknown_binary(span);
        };

        if operator == BinaryOperator::In {
            if left.kind() != ValueKind::Text || right.kind() != ValueKind::Text {
                return self.unknown_binary(span);
            }
            return Some(self.fold(Filter::Contains {
                needle: left,
                haystack: right,
            }));
        }

        let Some(comparison) = lower_comparison(operator, left.kind()) else {
            return self.unknown_binary(span);
        };
        if left.kind() != right.kind() {
            return self.unknown_binary(span);
        }

        if let (Some(l), Some(r)) = (left_dims, right_dims) {
            if l != r {
                self.diagnostics.warning(
                    "Invalid comparison between quantities of different dimensionalities",
                    span.start,
                    None,
                );
                return Some(Term::Predicate(Filter::Constant(
                    comparison == Comparison::NotEqual,
                )));
            }
        }

        Some(self.fold(Filter::Compare {
            operator: comparison,
            left,
            right,
        }))
    }

    fn unknown_binary(&mut self, span: Span) -> Option<Term> {
        self.diagnostics
            .error("Unknown binary operation", span.start, Some(span.end));
        None
    }

    /// Evaluate comparisons between two constants right away.
    fn fold(&self, filter: Filter) -> Term {
        let constant = match &filter {
            Filter::Compare { left, right, .. } | Filter::Contains {
                needle: left,
                haystack: right,
            } => matches!(left, Operand::Value(_)) && matches!(right, Operand::Value(_)),
            _ => false,
        };
        if constant {
            Term::Predicate(Filter::Constant(filter.matches(&Value::Null, self.units)))
        } else {
            Term::Predicate(filter)
        }
    }

    /// Interpret a term as a condition, if it has a truth value.
    fn as_predicate(&self, term: Term) -> Option<Filter> {
        match term {
            Term::Predicate(filter) => Some(filter),
            Term::Value(Scalar::Bool(value)) => Some(Filter::Constant(value)),
            Term::Value(_) => None,
            Term::Tag(tag) => Some(match self.schema.tags_property() {
                Some(name) => Filter::HasTag {
                    attribute: AttributePath(vec![PathSegment::Key(name.to_string())]),
                    tag,
                },
                None => Filter::Constant(false),
            }),
            Term::Attribute {
                path,
                kind:
                    AttributeKind::Value {
                        kind: ValueKind::Bool,
                        ..
                    },
            } => Some(Filter::IsTrue(path)),
            Term::Attribute { .. } => None,
        }
    }

    fn root(&mut self, term: Term, span: Span) -> Option<Filter> {
        match term {
            Term::Value(Scalar::Bool(value)) => {
                let message = if value {
                    "This search will always return all objects"
                } else {
                    "This search will never return any objects"
                };
                self.diagnostics.warning(message, span.start, Some(span.end));
                Some(Filter::Constant(value))
            }
            Term::Value(_) => {
                self.diagnostics
                    .error("Unable to use literal as search query", span.start, Some(span.end));
                None
            }
            term @ Term::Attribute { .. } => match self.as_predicate(term) {
                Some(filter) => Some(filter),
                None => {
                    self.diagnostics.error(
                        "Unable to use attribute as search query",
                        span.start,
                        Some(span.end),
                    );
                    None
                }
            },
            term => self.as_predicate(term),
        }
    }
}

fn as_operand(term: Term) -> Option<(Operand, Option<Dimensionality>)> {
    match term {
        Term::Value(scalar) => {
            let dimensionality = match &scalar {
                Scalar::Quantity(quantity) => Some(quantity.dimensionality),
                _ => None,
            };
            Some((Operand::Value(scalar), dimensionality))
        }
        Term::Attribute {
            path,
            kind:
                AttributeKind::Value {
                    kind,
                    dimensionality,
                },
        } => Some((Operand::Attribute { path, kind }, dimensionality)),
        _ => None,
    }
}

/// The comparison an operator stands for on values of `kind`, if supported.
fn lower_comparison(operator: BinaryOperator, kind: ValueKind) -> Option<Comparison> {
    use BinaryOperator as Op;

    let comparison = match operator {
        Op::Equal => Comparison::Equal,
        Op::NotEqual => Comparison::NotEqual,
        Op::Less | Op::Before => Comparison::Less,
        Op::LessEqual => Comparison::LessEqual,
        Op::Greater | Op::After => Comparison::Greater,
        Op::GreaterEqual => Comparison::GreaterEqual,
        Op::On => Comparison::SameDay,
        Op::And | Op::Or | Op::In => return None,
    };

    let date_only = matches!(operator, Op::On | Op::Before | Op::After);
    let supported = match kind {
        ValueKind::Bool | ValueKind::Text => {
            matches!(comparison, Comparison::Equal | Comparison::NotEqual)
        }
        ValueKind::Quantity => !date_only,
        ValueKind::DateTime => true,
    };
    supported.then_some(comparison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::diagnostics::{Diagnostic, Severity};
    use crate::search::parser::parse;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_json(json!({
            "type": "object",
            "properties": {
                "name": {"type": "text"},
                "length": {"type": "quantity", "units": "mm"},
                "volume": {"type": "quantity", "units": "mL"},
                "created": {"type": "datetime"},
                "flag": {"type": "bool"},
                "tags": {"type": "tags"},
                "array_attr": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"bool_attr": {"type": "bool"}}
                    }
                }
            }
        }))
        .unwrap()
    }

    fn compile_query(query: &str) -> (Filter, Diagnostics) {
        let units = UnitRegistry::new();
        let (tree, diagnostics) = parse(query, &units);
        assert!(diagnostics.is_empty(), "parse failed: {:?}", diagnostics);
        compile(&tree.unwrap(), &schema(), &units)
    }

    fn single(diagnostics: &Diagnostics) -> &Diagnostic {
        assert_eq!(diagnostics.len(), 1, "{:?}", diagnostics);
        diagnostics.iter().next().unwrap()
    }

    #[test]
    fn constant_comparisons_fold_silently() {
        let (filter, diagnostics) = compile_query("\"Example\" == \"Example\"");
        assert_eq!(filter, Filter::Constant(true));
        assert!(diagnostics.is_empty());

        assert_eq!(compile_query("20mm == 2cm").0, Filter::Constant(true));
        let (filter, diagnostics) = compile_query("20mm == 20km");
        assert_eq!(filter, Filter::Constant(false));
        assert!(diagnostics.is_empty());

        assert_eq!(compile_query("\"amp\" in \"Example\"").0, Filter::Constant(true));
    }

    #[test]
    fn boolean_literals_at_root_warn() {
        let (filter, diagnostics) = compile_query("True");
        assert_eq!(filter, Filter::Constant(true));
        let warning = single(&diagnostics);
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(warning.message, "This search will always return all objects");

        let (filter, diagnostics) = compile_query("False");
        assert_eq!(filter, Filter::Constant(false));
        assert_eq!(
            single(&diagnostics).message,
            "This search will never return any objects"
        );
    }

    #[test]
    fn negated_literals_warn() {
        let (filter, diagnostics) = compile_query("not True");
        assert_eq!(filter, Filter::Constant(false));
        assert_eq!(single(&diagnostics).message, "This expression will always be false");

        let (filter, diagnostics) = compile_query("flag or not False");
        assert_eq!(filter, Filter::Constant(true));
        assert_eq!(
            *single(&diagnostics),
            Diagnostic {
                severity: Severity::Warning,
                message: "This expression will always be true".into(),
                start: 8,
                end: Some(17),
            }
        );
    }

    #[test]
    fn non_boolean_roots_are_errors() {
        let (filter, diagnostics) = compile_query("20mm");
        assert_eq!(filter, Filter::Constant(false));
        assert_eq!(single(&diagnostics).message, "Unable to use literal as search query");

        let (_, diagnostics) = compile_query("name");
        assert_eq!(single(&diagnostics).message, "Unable to use attribute as search query");

        let (filter, diagnostics) = compile_query("flag");
        assert_eq!(filter, Filter::IsTrue(AttributePath(vec![PathSegment::Key("flag".into())])));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unknown_attribute() {
        let (filter, diagnostics) = compile_query("flag and colour == \"red\"");
        assert_eq!(filter, Filter::Constant(false));
        assert_eq!(
            *single(&diagnostics),
            Diagnostic {
                severity: Severity::Error,
                message: "Invalid attribute name".into(),
                start: 9,
                end: Some(15),
            }
        );
    }

    #[test]
    fn dimensionality_mismatch_warns() {
        for (query, expected) in [
            ("length == 1L", false),
            ("length != 1L", true),
            ("length < 1L", false),
            ("length >= volume", false),
        ] {
            let (filter, diagnostics) = compile_query(query);
            assert_eq!(filter, Filter::Constant(expected), "{}", query);
            let warning = single(&diagnostics);
            assert_eq!(warning.severity, Severity::Warning);
            assert_eq!(
                warning.message,
                "Invalid comparison between quantities of different dimensionalities"
            );
            assert_eq!(warning.start, 0);
            assert_eq!(warning.end, None);
        }
    }

    #[test]
    fn unsupported_operations() {
        for query in [
            "name < \"a\"",
            "flag on 2021-01-01",
            "length before 2021-01-01",
            "name == 5mm",
            "length in name",
            "20mm and flag",
        ] {
            let (filter, diagnostics) = compile_query(query);
            assert_eq!(filter, Filter::Constant(false), "{}", query);
            assert_eq!(single(&diagnostics).message, "Unknown binary operation", "{}", query);
        }

        let (_, diagnostics) = compile_query("not name");
        assert_eq!(single(&diagnostics).message, "Unknown unary operation");
    }

    #[test]
    fn date_operators_lower_to_comparisons() {
        let (filter, diagnostics) = compile_query("created before 2021-01-01");
        assert!(diagnostics.is_empty());
        let Filter::Compare { operator, .. } = filter else {
            panic!("expected comparison");
        };
        assert_eq!(operator, Comparison::Less);

        let (filter, _) = compile_query("created on 2021-01-01");
        assert!(matches!(
            filter,
            Filter::Compare {
                operator: Comparison::SameDay,
                ..
            }
        ));
    }

    #[test]
    fn tags_and_placeholders() {
        let (filter, diagnostics) = compile_query("#alpha and array_attr.?.bool_attr");
        assert!(diagnostics.is_empty());
        assert_eq!(filter.to_string(), "(and #alpha array_attr.?.bool_attr)");
    }

    #[test]
    fn tags_without_tags_property_never_match() {
        let schema = Schema::from_json(json!({
            "type": "object",
            "properties": {"name": {"type": "text"}}
        }))
        .unwrap();
        let units = UnitRegistry::new();
        let (tree, _) = parse("#alpha", &units);
        let (filter, diagnostics) = compile(&tree.unwrap(), &schema, &units);
        assert_eq!(filter, Filter::Constant(false));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn lowering_table() {
        assert_eq!(
            lower_comparison(BinaryOperator::After, ValueKind::DateTime),
            Some(Comparison::Greater)
        );
        assert_eq!(lower_comparison(BinaryOperator::On, ValueKind::Quantity), None);
        assert_eq!(lower_comparison(BinaryOperator::Less, ValueKind::Bool), None);
        assert_eq!(
            lower_comparison(BinaryOperator::NotEqual, ValueKind::Text),
            Some(Comparison::NotEqual)
        );
    }
}
