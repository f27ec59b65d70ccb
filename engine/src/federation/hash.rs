//! Content hashes of object versions.
//!
//! Both hashes are SHA-256 digests of canonical JSON (object keys sorted).
//! They are only ever compared for equality.

use crate::object::UserIdentity;
use crate::schema::PropertySchema;
use crate::{ObjectId, Schema};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Format used for timestamps in metadata hashes.
pub const METADATA_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Hash the schema-declared part of an object's data together with its schema.
///
/// Returns `None` when there is nothing to hash (deletion markers).
pub fn calculate_data_hash(
    data: Option<&Value>,
    schema: Option<&Schema>,
    object_id: Option<ObjectId>,
) -> Option<String> {
    let (data, schema) = match (data, schema) {
        (Some(data), Some(schema)) => (data, schema),
        _ => return None,
    };

    let projected = project(data, schema.root());
    let hash = sha256_hex(&json!({
        "data": projected,
        "schema": schema.as_json(),
    }));
    tracing::trace!(?object_id, %hash, "calculated data hash");
    Some(hash)
}

/// Hash the authorship and time of an edit.
pub fn calculate_metadata_hash(user: &UserIdentity, utc_datetime: &DateTime<Utc>) -> String {
    let user = match user {
        UserIdentity::Federated {
            component_uuid,
            remote_user_id,
        } => json!([component_uuid.to_string(), remote_user_id]),
        UserIdentity::Automerged => json!("automerged"),
        UserIdentity::Anonymous => Value::Null,
    };
    sha256_hex(&json!({
        "user": user,
        "utc_datetime": utc_datetime.format(METADATA_DATETIME_FORMAT).to_string(),
    }))
}

/// Keep only the parts of `data` that `schema` declares.
fn project(data: &Value, schema: &PropertySchema) -> Value {
    match (schema, data) {
        (PropertySchema::Object { properties }, Value::Object(fields)) => {
            let mut projected = Map::new();
            for (name, property) in properties {
                if let Some(value) = fields.get(name) {
                    projected.insert(name.clone(), project(value, property));
                }
            }
            Value::Object(projected)
        }
        (PropertySchema::Array { items }, Value::Array(elements)) => {
            Value::Array(elements.iter().map(|e| project(e, items)).collect())
        }
        _ => data.clone(),
    }
}

fn sha256_hex(value: &Value) -> String {
    // serde_json maps are ordered by key, so this encoding is canonical
    let encoded = value.to_string();
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hex::encode(hasher.finalize())
}
