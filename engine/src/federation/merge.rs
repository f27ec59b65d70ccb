//! Three-way merge of object data.
//!
//! The merge walks the schema, not the raw JSON: objects are merged per
//! declared property, arrays get the append heuristic and every other
//! property is an opaque leaf. A leaf changed differently on both sides is
//! kept as a [`MergedValue::Conflict`] for manual resolution. Array elements
//! never become conflicts: an element changed differently on both sides fails
//! the whole merge.

use crate::schema::PropertySchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Merges that cannot even produce a partial result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("conflicting changes to existing elements of array {path}")]
    ArrayConflict { path: String },
}

/// Result of merging one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum MergedValue {
    /// Resolved to a single value
    Value(Value),
    Object(BTreeMap<String, MergedValue>),
    Array(Vec<MergedValue>),
    /// Both sides changed the value differently. `None` means removed.
    Conflict {
        local: Option<Value>,
        imported: Option<Value>,
    },
}

impl MergedValue {
    /// The merged data. Conflicts render as `{"local": .., "imported": ..}`.
    pub fn to_json(&self) -> Value {
        match self {
            MergedValue::Value(value) => value.clone(),
            MergedValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            MergedValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            MergedValue::Conflict { local, imported } => json!({
                "local": local,
                "imported": imported,
            }),
        }
    }

    pub fn is_fully_merged(&self) -> bool {
        match self {
            MergedValue::Value(_) => true,
            MergedValue::Object(fields) => fields.values().all(Self::is_fully_merged),
            MergedValue::Array(items) => items.iter().all(Self::is_fully_merged),
            MergedValue::Conflict { .. } => false,
        }
    }

    /// Dotted paths of all unresolved conflicts, e.g. `subobject.name`.
    pub fn conflict_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_conflicts(&mut Vec::new(), &mut paths);
        paths
    }

    fn collect_conflicts(&self, prefix: &mut Vec<String>, paths: &mut Vec<String>) {
        match self {
            MergedValue::Value(_) => {}
            MergedValue::Object(fields) => {
                for (name, value) in fields {
                    prefix.push(name.clone());
                    value.collect_conflicts(prefix, paths);
                    prefix.pop();
                }
            }
            MergedValue::Array(items) => {
                for (index, value) in items.iter().enumerate() {
                    prefix.push(index.to_string());
                    value.collect_conflicts(prefix, paths);
                    prefix.pop();
                }
            }
            MergedValue::Conflict { .. } => paths.push(prefix.join(".")),
        }
    }
}

/// Merge the local and imported data, both derived from `base`.
///
/// Without a base (the common ancestor is unknown) every difference between
/// the two sides is a change on both.
pub fn merge(
    base: Option<&Value>,
    local: &Value,
    imported: &Value,
    schema: &PropertySchema,
) -> Result<MergedValue, MergeError> {
    let merged = merge_property(base, Some(local), Some(imported), schema, &mut Vec::new())?;
    Ok(merged.unwrap_or_else(|| MergedValue::Value(local.clone())))
}

/// Merge one property. `Ok(None)` means the property is absent afterwards.
fn merge_property(
    base: Option<&Value>,
    local: Option<&Value>,
    imported: Option<&Value>,
    schema: &PropertySchema,
    path: &mut Vec<String>,
) -> Result<Option<MergedValue>, MergeError> {
    if local == imported {
        return Ok(local.cloned().map(MergedValue::Value));
    }
    if local == base {
        return Ok(imported.cloned().map(MergedValue::Value));
    }
    if imported == base {
        return Ok(local.cloned().map(MergedValue::Value));
    }

    match (schema, local, imported) {
        (
            PropertySchema::Object { properties },
            Some(Value::Object(local_fields)),
            Some(Value::Object(imported_fields)),
        ) => {
            let mut merged = BTreeMap::new();
            for (name, property) in properties {
                path.push(name.clone());
                let value = merge_property(
                    base.and_then(|b| b.get(name.as_str())),
                    local_fields.get(name),
                    imported_fields.get(name),
                    property,
                    path,
                )?;
                path.pop();
                if let Some(value) = value {
                    merged.insert(name.clone(), value);
                }
            }
            Ok(Some(MergedValue::Object(merged)))
        }
        (
            PropertySchema::Array { .. },
            Some(Value::Array(local_items)),
            Some(Value::Array(imported_items)),
        ) => {
            let base_items = base
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            merge_array(base_items, local_items, imported_items, path).map(Some)
        }
        _ => Ok(Some(MergedValue::Conflict {
            local: local.cloned(),
            imported: imported.cloned(),
        })),
    }
}

fn merge_array(
    base: &[Value],
    local: &[Value],
    imported: &[Value],
    path: &[String],
) -> Result<MergedValue, MergeError> {
    // same shape: each element may be changed by at most one side
    if local.len() == base.len() && imported.len() == base.len() {
        let mut merged = Vec::with_capacity(base.len());
        for ((b, l), i) in base.iter().zip(local).zip(imported) {
            let value = if l == i || i == b {
                l
            } else if l == b {
                i
            } else {
                return Err(MergeError::ArrayConflict {
                    path: path.join("."),
                });
            };
            merged.push(MergedValue::Value(value.clone()));
        }
        return Ok(MergedValue::Array(merged));
    }

    // both sides only appended: keep the local additions first
    if local.starts_with(base) && imported.starts_with(base) {
        let merged = base
            .iter()
            .chain(&local[base.len()..])
            .chain(&imported[base.len()..])
            .cloned()
            .map(MergedValue::Value)
            .collect();
        return Ok(MergedValue::Array(merged));
    }

    Err(MergeError::ArrayConflict {
        path: path.join("."),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text(value: &str) -> Value {
        json!({"_type": "text", "text": value})
    }

    fn schema() -> PropertySchema {
        PropertySchema::from_json(&json!({
            "type": "object",
            "properties": {
                "name": {"type": "text"},
                "subobject": {
                    "type": "object",
                    "properties": {"name": {"type": "text"}}
                },
                "list": {"type": "array", "items": {"type": "text"}}
            }
        }))
        .unwrap()
    }

    fn object(name: &str, sub: &str, list: &[&str]) -> Value {
        json!({
            "name": text(name),
            "subobject": {"name": text(sub)},
            "list": list.iter().map(|v| text(v)).collect::<Vec<_>>(),
        })
    }

    #[test]
    fn disjoint_changes_merge() {
        let base = object("Test-Object", "Subobject", &[]);
        let local = object("Test-Object v2", "Subobject", &[]);
        let imported = object("Test-Object", "Subobject v2", &[]);

        let merged = merge(Some(&base), &local, &imported, &schema()).unwrap();
        assert!(merged.is_fully_merged());
        assert_eq!(merged.to_json(), object("Test-Object v2", "Subobject v2", &[]));
    }

    #[test]
    fn identical_changes_merge() {
        let base = object("a", "b", &[]);
        let changed = object("c", "b", &[]);
        let merged = merge(Some(&base), &changed, &changed, &schema()).unwrap();
        assert_eq!(merged, MergedValue::Value(changed));
    }

    #[test]
    fn same_leaf_changed_differently_is_a_conflict() {
        let base = object("a", "b", &[]);
        let local = object("local", "b", &[]);
        let imported = object("imported", "b", &[]);

        let merged = merge(Some(&base), &local, &imported, &schema()).unwrap();
        assert!(!merged.is_fully_merged());
        assert_eq!(merged.conflict_paths(), vec!["name"]);
        assert_eq!(
            merged.to_json()["name"],
            json!({"local": text("local"), "imported": text("imported")})
        );
    }

    #[test]
    fn appended_items_are_concatenated() {
        let base = object("a", "b", &["x"]);
        let local = object("a", "b", &["x", "local"]);
        let imported = object("a", "b", &["x", "imported 1", "imported 2"]);

        let merged = merge(Some(&base), &local, &imported, &schema()).unwrap();
        assert!(merged.is_fully_merged());
        assert_eq!(
            merged.to_json(),
            object("a", "b", &["x", "local", "imported 1", "imported 2"])
        );
    }

    #[test]
    fn equal_length_arrays_merge_elementwise() {
        let base = object("a", "b", &["x", "y"]);
        let local = object("a", "b", &["x2", "y"]);
        let imported = object("a", "b", &["x", "y2"]);

        let merged = merge(Some(&base), &local, &imported, &schema()).unwrap();
        assert!(merged.is_fully_merged());
        assert_eq!(merged.to_json(), object("a", "b", &["x2", "y2"]));
    }

    #[test]
    fn same_element_changed_on_both_sides_fails() {
        let base = object("a", "b", &["x", "y"]);
        let local = object("a", "b", &["local", "y"]);
        let imported = object("a", "b", &["imported", "y"]);

        assert_eq!(
            merge(Some(&base), &local, &imported, &schema()),
            Err(MergeError::ArrayConflict {
                path: "list".into()
            })
        );

        // the same change on both sides is not a conflict
        let renamed = object("renamed", "b", &["local", "y"]);
        let merged = merge(Some(&base), &renamed, &local, &schema()).unwrap();
        assert_eq!(merged.to_json(), renamed);
    }

    #[test]
    fn changed_existing_items_with_appends_fail() {
        let base = object("a", "b", &["x"]);
        let local = object("a", "b", &["changed", "new"]);
        let imported = object("a", "b", &["x", "other"]);

        assert_eq!(
            merge(Some(&base), &local, &imported, &schema()),
            Err(MergeError::ArrayConflict {
                path: "list".into()
            })
        );
    }

    #[test]
    fn removed_field_against_change_is_a_conflict() {
        let base = object("a", "b", &[]);
        let mut local = base.clone();
        local.as_object_mut().unwrap().remove("name");
        let imported = object("changed", "b", &[]);

        let merged = merge(Some(&base), &local, &imported, &schema()).unwrap();
        assert_eq!(
            merged,
            MergedValue::Object(BTreeMap::from([
                (
                    "list".to_string(),
                    MergedValue::Value(json!([]))
                ),
                (
                    "name".to_string(),
                    MergedValue::Conflict {
                        local: None,
                        imported: Some(text("changed")),
                    }
                ),
                (
                    "subobject".to_string(),
                    MergedValue::Value(json!({"name": text("b")}))
                ),
            ]))
        );
    }

    proptest! {
        #[test]
        fn prop_disjoint_edits_always_merge(
            name in "[a-z]{1,8}",
            sub in "[a-z]{1,8}",
            new_name in "[A-Z]{1,8}",
            new_sub in "[A-Z]{1,8}",
        ) {
            let base = object(&name, &sub, &[]);
            let local = object(&new_name, &sub, &[]);
            let imported = object(&name, &new_sub, &[]);

            let merged = merge(Some(&base), &local, &imported, &schema()).unwrap();
            prop_assert!(merged.is_fully_merged());
            prop_assert_eq!(merged.to_json(), object(&new_name, &new_sub, &[]));
        }
    }
}
