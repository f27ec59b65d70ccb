//! Applying object versions imported from federation components.

use super::conflicts::{create_object_version_conflict, ConflictKey, ImportedVersion};
use super::hash::{calculate_data_hash, calculate_metadata_hash};
use crate::store::{NewVersion, Store};
use crate::{error::Result, ComponentId, FedVersionId, ObjectId, VersionId};
use serde::{Deserialize, Serialize};

/// What happened to an imported version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "camelCase")]
pub enum ImportOutcome {
    /// The local tip is this very edit
    AlreadyPresent,
    /// Stored as a new local version
    Applied(VersionId),
    /// A different edit produced the same data
    EquivalentData,
    /// The object changed locally since the base version
    Conflict(ConflictKey),
}

/// Import a version of an existing object.
///
/// `base_version_id` is the local version the component's edit was derived
/// from. The decision compares data and metadata hashes with the current
/// local version.
pub fn import_object_version(
    store: &mut Store,
    object_id: ObjectId,
    component_id: ComponentId,
    fed_version_id: FedVersionId,
    base_version_id: Option<VersionId>,
    imported: ImportedVersion,
) -> Result<ImportOutcome> {
    store.component(component_id)?;
    let identity = store.user_identity(imported.user_id)?;
    let hash_data = calculate_data_hash(
        imported.data.as_ref(),
        imported.schema.as_ref(),
        Some(object_id),
    );
    let hash_metadata = calculate_metadata_hash(&identity, &imported.utc_datetime);

    let tip = store.get_object(object_id, None)?;
    if tip.hash_data == hash_data && tip.hash_metadata == hash_metadata {
        tracing::debug!(object_id, fed_version_id, "imported version already present");
        return Ok(ImportOutcome::AlreadyPresent);
    }

    if base_version_id == Some(tip.version_id) {
        let version = NewVersion {
            data: imported.data,
            schema: imported.schema,
            user_id: imported.user_id,
            utc_datetime: imported.utc_datetime,
            version_component_id: None,
            fed_version_id: None,
            automerged: false,
        }
        .attributed_to(component_id, fed_version_id);
        let applied = store.update_object(object_id, version)?;
        return Ok(ImportOutcome::Applied(applied.version_id));
    }

    if tip.hash_data == hash_data {
        tracing::debug!(object_id, fed_version_id, "imported version has equivalent data");
        return Ok(ImportOutcome::EquivalentData);
    }

    let conflict = create_object_version_conflict(
        store,
        object_id,
        fed_version_id,
        component_id,
        base_version_id,
        imported,
    )?;
    Ok(ImportOutcome::Conflict(conflict.key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::conflicts::get_active_object_version_conflicts;
    use crate::object::{Component, User};
    use crate::Schema;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn schema() -> Schema {
        Schema::from_json(json!({
            "type": "object",
            "properties": {"name": {"type": "text"}}
        }))
        .unwrap()
    }

    fn named(name: &str) -> Value {
        json!({"name": {"_type": "text", "text": name}})
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    fn remote_edit(name: &str, minute: u32) -> ImportedVersion {
        ImportedVersion {
            data: Some(named(name)),
            schema: Some(schema()),
            user_id: Some(2),
            utc_datetime: at(minute),
        }
    }

    fn setup() -> Store {
        let mut store = Store::new();
        store.add_component(Component::new(1, Uuid::new_v4()));
        store.add_user(User::local(1));
        store.add_user(User::federated(2, 1, 7));
        store
            .create_object(None, NewVersion::local(named("base"), schema(), Some(1), at(0)))
            .unwrap();
        store
    }

    #[test]
    fn fast_forward_then_already_present() {
        let mut store = setup();
        let outcome = import_object_version(&mut store, 0, 1, 3, Some(0), remote_edit("v2", 5)).unwrap();
        assert_eq!(outcome, ImportOutcome::Applied(1));
        let tip = store.get_object(0, None).unwrap();
        assert_eq!(tip.version_component_id, Some(1));
        assert_eq!(tip.fed_version_id, Some(3));

        let again = import_object_version(&mut store, 0, 1, 3, Some(0), remote_edit("v2", 5)).unwrap();
        assert_eq!(again, ImportOutcome::AlreadyPresent);
        assert_eq!(store.get_object_versions(0).unwrap().len(), 2);
    }

    #[test]
    fn independent_identical_edit() {
        let mut store = setup();
        store
            .update_object(0, NewVersion::local(named("same"), schema(), Some(1), at(3)))
            .unwrap();
        let outcome = import_object_version(&mut store, 0, 1, 2, Some(0), remote_edit("same", 5)).unwrap();
        assert_eq!(outcome, ImportOutcome::EquivalentData);
        assert!(get_active_object_version_conflicts(&store, 0).is_empty());
    }

    #[test]
    fn diverging_edit_creates_conflict() {
        let mut store = setup();
        store
            .update_object(0, NewVersion::local(named("local"), schema(), Some(1), at(3)))
            .unwrap();
        let outcome = import_object_version(&mut store, 0, 1, 2, Some(0), remote_edit("remote", 5)).unwrap();
        assert_eq!(outcome, ImportOutcome::Conflict(ConflictKey::new(0, 2, 1)));
        assert_eq!(get_active_object_version_conflicts(&store, 0).len(), 1);
    }
}
