//! Action schemas.
//!
//! A schema is a tree of property definitions. Object data mirrors it: every
//! leaf of the data carries a `_type` tag and type specific fields. Schemas are
//! parsed once into a typed [`PropertySchema`] tree while the raw JSON is kept
//! for hashing and serialization.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One segment of an attribute path such as `array_attr.?.bool_attr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathSegment {
    /// A property name
    Key(String),
    /// A concrete array index
    Index(usize),
    /// `?`, standing for some element of an array
    Placeholder,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "{}", index),
            PathSegment::Placeholder => write!(f, "?"),
        }
    }
}

/// A property definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySchema {
    Object {
        properties: BTreeMap<String, PropertySchema>,
    },
    Array {
        items: Box<PropertySchema>,
    },
    Text,
    Bool,
    Datetime,
    Quantity {
        /// Declared units, if any
        units: Option<String>,
    },
    Tags,
    /// Any other leaf type (sample, user, file, ...)
    Other(String),
}

impl PropertySchema {
    /// Parse a property definition from its JSON form.
    pub fn from_json(value: &Value) -> Result<Self> {
        let definition = value
            .as_object()
            .ok_or_else(|| Error::InvalidSchema("property definition must be an object".into()))?;
        let property_type = definition
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidSchema("property definition without type".into()))?;

        let schema = match property_type {
            "object" => {
                let properties = definition
                    .get("properties")
                    .and_then(Value::as_object)
                    .ok_or_else(|| {
                        Error::InvalidSchema("object definition without properties".into())
                    })?;
                let mut parsed = BTreeMap::new();
                for (name, property) in properties {
                    parsed.insert(name.clone(), PropertySchema::from_json(property)?);
                }
                PropertySchema::Object { properties: parsed }
            }
            "array" => {
                let items = definition.get("items").ok_or_else(|| {
                    Error::InvalidSchema("array definition without items".into())
                })?;
                PropertySchema::Array {
                    items: Box::new(PropertySchema::from_json(items)?),
                }
            }
            "text" => PropertySchema::Text,
            "bool" => PropertySchema::Bool,
            "datetime" => PropertySchema::Datetime,
            "quantity" => {
                // units may be a single string or a list of alternatives
                let units = match definition.get("units") {
                    Some(Value::String(units)) => Some(units.clone()),
                    Some(Value::Array(options)) => {
                        options.first().and_then(Value::as_str).map(str::to_string)
                    }
                    _ => None,
                };
                PropertySchema::Quantity { units }
            }
            "tags" => PropertySchema::Tags,
            other => PropertySchema::Other(other.to_string()),
        };
        Ok(schema)
    }

    /// Name of the property type as used in schema JSON.
    pub fn type_name(&self) -> &str {
        match self {
            PropertySchema::Object { .. } => "object",
            PropertySchema::Array { .. } => "array",
            PropertySchema::Text => "text",
            PropertySchema::Bool => "bool",
            PropertySchema::Datetime => "datetime",
            PropertySchema::Quantity { .. } => "quantity",
            PropertySchema::Tags => "tags",
            PropertySchema::Other(name) => name,
        }
    }

    /// Resolve a path relative to this property.
    pub fn resolve(&self, path: &[PathSegment]) -> Option<&PropertySchema> {
        let Some((segment, rest)) = path.split_first() else {
            return Some(self);
        };
        match (self, segment) {
            (PropertySchema::Object { properties }, PathSegment::Key(key)) => {
                properties.get(key)?.resolve(rest)
            }
            (PropertySchema::Array { items }, PathSegment::Index(_))
            | (PropertySchema::Array { items }, PathSegment::Placeholder) => items.resolve(rest),
            _ => None,
        }
    }
}

impl fmt::Display for PropertySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// The schema of an action, describing the data of its objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Schema {
    root: PropertySchema,
    raw: Value,
}

impl Schema {
    /// Parse a schema. The root must be an object definition.
    pub fn from_json(raw: Value) -> Result<Self> {
        let root = PropertySchema::from_json(&raw)?;
        if !matches!(root, PropertySchema::Object { .. }) {
            return Err(Error::InvalidSchema(format!(
                "root must be an object, got {}",
                root
            )));
        }
        Ok(Self { root, raw })
    }

    /// The typed root definition.
    pub fn root(&self) -> &PropertySchema {
        &self.root
    }

    /// The schema as it was given.
    pub fn as_json(&self) -> &Value {
        &self.raw
    }

    /// Resolve an attribute path to its property definition.
    pub fn resolve(&self, path: &[PathSegment]) -> Option<&PropertySchema> {
        if path.is_empty() {
            return None;
        }
        self.root.resolve(path)
    }

    /// Name of the top-level tags property, if the schema declares one.
    pub fn tags_property(&self) -> Option<&str> {
        match &self.root {
            PropertySchema::Object { properties } => properties
                .iter()
                .find(|(_, p)| **p == PropertySchema::Tags)
                .map(|(name, _)| name.as_str()),
            _ => None,
        }
    }
}

impl TryFrom<Value> for Schema {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Schema::from_json(value)
    }
}

impl From<Schema> for Value {
    fn from(schema: Schema) -> Self {
        schema.raw
    }
}
