//! Compiled search filters and their evaluation against object data.
//!
//! A [`Filter`] is the closed form of a compiled query. Evaluation never
//! fails: missing attributes, unexpected leaf shapes and unknown units all
//! make the affected comparison false.

use super::tree::AttributePath;
use crate::schema::PathSegment;
use crate::units::{Dimensionality, Quantity, UnitRegistry};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Format of `utc_datetime` in datetime leaves.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Type of the values an operand produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    DateTime,
    Quantity,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::DateTime => "datetime",
            ValueKind::Quantity => "quantity",
            ValueKind::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// A single comparable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    /// A calendar date without time, as written in queries
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Quantity(Quantity),
    Text(String),
}

impl Scalar {
    pub fn kind(&self) -> ValueKind {
        match self {
            Scalar::Bool(_) => ValueKind::Bool,
            Scalar::Date(_) | Scalar::DateTime(_) => ValueKind::DateTime,
            Scalar::Quantity(_) => ValueKind::Quantity,
            Scalar::Text(_) => ValueKind::Text,
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Values read from the object data
    Attribute { path: AttributePath, kind: ValueKind },
    /// A constant from the query
    Value(Scalar),
}

impl Operand {
    pub fn kind(&self) -> ValueKind {
        match self {
            Operand::Attribute { kind, .. } => *kind,
            Operand::Value(scalar) => scalar.kind(),
        }
    }

    fn path(&self) -> Option<&AttributePath> {
        match self {
            Operand::Attribute { path, .. } => Some(path),
            Operand::Value(_) => None,
        }
    }

    fn values(&self, cx: &EvalContext<'_>) -> Vec<Scalar> {
        match self {
            Operand::Value(scalar) => vec![scalar.clone()],
            Operand::Attribute { path, kind } => match cx.lookup(path) {
                Some(leaf) => read_leaf(leaf, *kind, cx.units),
                None => Vec::new(),
            },
        }
    }
}

/// Comparison operators after `before`/`after`/`on` have been lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// Same calendar date
    SameDay,
}

impl Comparison {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Equal | Comparison::SameDay => ordering == Ordering::Equal,
            Comparison::NotEqual => ordering != Ordering::Equal,
            Comparison::Less => ordering == Ordering::Less,
            Comparison::LessEqual => ordering != Ordering::Greater,
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::GreaterEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::Less => "<",
            Comparison::LessEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterEqual => ">=",
            Comparison::SameDay => "on",
        };
        write!(f, "{}", symbol)
    }
}

/// A compiled search query.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Constant(bool),
    Not(Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    /// A bool attribute whose value is `true`
    IsTrue(AttributePath),
    Compare {
        operator: Comparison,
        left: Operand,
        right: Operand,
    },
    /// Substring test between two text operands
    Contains { needle: Operand, haystack: Operand },
    /// Tag membership in the tags attribute
    HasTag { attribute: AttributePath, tag: String },
}

impl Filter {
    pub fn not(filter: Filter) -> Filter {
        match filter {
            Filter::Constant(value) => Filter::Constant(!value),
            other => Filter::Not(Box::new(other)),
        }
    }

    pub fn and(left: Filter, right: Filter) -> Filter {
        match (left, right) {
            (Filter::Constant(false), _) | (_, Filter::Constant(false)) => Filter::Constant(false),
            (Filter::Constant(true), other) | (other, Filter::Constant(true)) => other,
            (left, right) => Filter::And(Box::new(left), Box::new(right)),
        }
    }

    pub fn or(left: Filter, right: Filter) -> Filter {
        match (left, right) {
            (Filter::Constant(true), _) | (_, Filter::Constant(true)) => Filter::Constant(true),
            (Filter::Constant(false), other) | (other, Filter::Constant(false)) => other,
            (left, right) => Filter::Or(Box::new(left), Box::new(right)),
        }
    }

    /// Path of the array the `?` placeholder iterates over, if any.
    pub fn placeholder_array(&self) -> Option<&[PathSegment]> {
        fn from_path(path: &AttributePath) -> Option<&[PathSegment]> {
            let segments = path.segments();
            segments
                .iter()
                .position(|s| *s == PathSegment::Placeholder)
                .map(|i| &segments[..i])
        }

        match self {
            Filter::Constant(_) => None,
            Filter::Not(inner) => inner.placeholder_array(),
            Filter::And(left, right) | Filter::Or(left, right) => left
                .placeholder_array()
                .or_else(|| right.placeholder_array()),
            Filter::IsTrue(path) => from_path(path),
            Filter::HasTag { attribute, .. } => from_path(attribute),
            Filter::Compare { left, right, .. } => left
                .path()
                .and_then(from_path)
                .or_else(|| right.path().and_then(from_path)),
            Filter::Contains { needle, haystack } => needle
                .path()
                .and_then(from_path)
                .or_else(|| haystack.path().and_then(from_path)),
        }
    }

    /// Evaluate the filter against object data.
    ///
    /// With a `?` placeholder the filter matches if it matches for at least
    /// one element of the placeholder array.
    pub fn matches(&self, data: &Value, units: &UnitRegistry) -> bool {
        let Some(array_path) = self.placeholder_array() else {
            return self.eval(&EvalContext {
                data,
                units,
                index: None,
            });
        };

        let length = resolve(data, array_path, None)
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        (0..length).any(|index| {
            self.eval(&EvalContext {
                data,
                units,
                index: Some(index),
            })
        })
    }

    fn eval(&self, cx: &EvalContext<'_>) -> bool {
        match self {
            Filter::Constant(value) => *value,
            Filter::Not(inner) => !inner.eval(cx),
            Filter::And(left, right) => left.eval(cx) && right.eval(cx),
            Filter::Or(left, right) => left.eval(cx) || right.eval(cx),
            Filter::IsTrue(path) => cx
                .lookup(path)
                .map(|leaf| read_leaf(leaf, ValueKind::Bool, cx.units))
                .is_some_and(|values| values.contains(&Scalar::Bool(true))),
            Filter::Compare {
                operator,
                left,
                right,
            } => {
                let left = left.values(cx);
                let right = right.values(cx);
                left.iter()
                    .any(|l| right.iter().any(|r| compare(*operator, l, r)))
            }
            Filter::Contains { needle, haystack } => {
                let needles = needle.values(cx);
                let haystacks = haystack.values(cx);
                needles.iter().any(|n| {
                    haystacks.iter().any(|h| match (n, h) {
                        (Scalar::Text(n), Scalar::Text(h)) => h.contains(n.as_str()),
                        _ => false,
                    })
                })
            }
            Filter::HasTag { attribute, tag } => cx
                .lookup(attribute)
                .and_then(|leaf| leaf.get("tags"))
                .and_then(Value::as_array)
                .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(tag.as_str()))),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Attribute { path, .. } => write!(f, "{}", path),
            Operand::Value(Scalar::Bool(value)) => write!(f, "{}", value),
            Operand::Value(Scalar::Date(date)) => write!(f, "{}", date),
            Operand::Value(Scalar::DateTime(datetime)) => write!(f, "{}", datetime),
            Operand::Value(Scalar::Quantity(q)) => {
                write!(f, "{} {}", q.magnitude_in_base_units, q.dimensionality)
            }
            Operand::Value(Scalar::Text(text)) => write!(f, "{:?}", text),
        }
    }
}

impl fmt::Display for Filter {
    /// Compact prefix notation for log output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Constant(value) => write!(f, "{}", value),
            Filter::Not(inner) => write!(f, "(not {})", inner),
            Filter::And(left, right) => write!(f, "(and {} {})", left, right),
            Filter::Or(left, right) => write!(f, "(or {} {})", left, right),
            Filter::IsTrue(path) => write!(f, "{}", path),
            Filter::Compare {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", operator, left, right),
            Filter::Contains { needle, haystack } => write!(f, "(in {} {})", needle, haystack),
            Filter::HasTag { tag, .. } => write!(f, "#{}", tag),
        }
    }
}

struct EvalContext<'a> {
    data: &'a Value,
    units: &'a UnitRegistry,
    /// Element index substituted for the placeholder
    index: Option<usize>,
}

impl<'a> EvalContext<'a> {
    fn lookup(&self, path: &AttributePath) -> Option<&'a Value> {
        resolve(self.data, path.segments(), self.index)
    }
}

fn resolve<'a>(data: &'a Value, path: &[PathSegment], index: Option<usize>) -> Option<&'a Value> {
    path.iter().try_fold(data, |value, segment| match segment {
        PathSegment::Key(key) => value.get(key.as_str()),
        PathSegment::Index(i) => value.get(*i),
        PathSegment::Placeholder => value.get(index?),
    })
}

/// Read the values of a typed data leaf.
///
/// Multilingual text yields one value per translation.
fn read_leaf(leaf: &Value, kind: ValueKind, units: &UnitRegistry) -> Vec<Scalar> {
    match kind {
        ValueKind::Bool => leaf
            .get("value")
            .and_then(Value::as_bool)
            .map(Scalar::Bool)
            .into_iter()
            .collect(),
        ValueKind::Text => match leaf.get("text") {
            Some(Value::String(text)) => vec![Scalar::Text(text.clone())],
            Some(Value::Object(translations)) => translations
                .values()
                .filter_map(Value::as_str)
                .map(|text| Scalar::Text(text.to_string()))
                .collect(),
            _ => Vec::new(),
        },
        ValueKind::DateTime => leaf
            .get("utc_datetime")
            .and_then(Value::as_str)
            .and_then(|text| NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).ok())
            .map(Scalar::DateTime)
            .into_iter()
            .collect(),
        ValueKind::Quantity => read_quantity(leaf, units).map(Scalar::Quantity).into_iter().collect(),
    }
}

fn read_quantity(leaf: &Value, units: &UnitRegistry) -> Option<Quantity> {
    let magnitude = leaf.get("magnitude_in_base_units")?.as_f64()?;
    let from_units = leaf
        .get("units")
        .and_then(Value::as_str)
        .and_then(|u| units.dimensionality_of(u));
    let dimensionality = match from_units {
        Some(dimensionality) => dimensionality,
        None => leaf
            .get("dimensionality")
            .and_then(Value::as_str)?
            .parse::<Dimensionality>()
            .ok()?,
    };
    Some(Quantity::new(magnitude, dimensionality))
}

fn compare(operator: Comparison, left: &Scalar, right: &Scalar) -> bool {
    let ordering = match (left, right) {
        (Scalar::Bool(l), Scalar::Bool(r)) => Some(l.cmp(r)),
        (Scalar::Text(l), Scalar::Text(r)) => Some(l.cmp(r)),
        (Scalar::Quantity(l), Scalar::Quantity(r)) => l.compare(r),
        (Scalar::DateTime(l), Scalar::DateTime(r)) if operator != Comparison::SameDay => {
            Some(l.cmp(r))
        }
        (l, r) => match (calendar_date(l), calendar_date(r)) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => None,
        },
    };

    match ordering {
        Some(ordering) => operator.accepts(ordering),
        // quantities of different dimensionality are only ever unequal
        None => operator == Comparison::NotEqual,
    }
}

fn calendar_date(scalar: &Scalar) -> Option<NaiveDate> {
    match scalar {
        Scalar::Date(date) => Some(*date),
        Scalar::DateTime(datetime) => Some(datetime.date()),
        _ => None,
    }
}
