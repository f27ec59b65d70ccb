//! Object version conflicts between local edits and federation imports.
//!
//! A conflict record remembers an imported version that could not be applied
//! because the object changed locally since the version it was based on.
//! Records are never removed. They are either discarded, when a newer import
//! from the same component supersedes them, or solved by one of the
//! [`SolvingStrategy`] variants.

use super::merge::{merge, MergedValue};
use crate::object::ObjectVersion;
use crate::store::{NewVersion, Store};
use crate::{error::Result, ComponentId, Error, FedVersionId, ObjectId, Schema, UserId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies a conflict record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictKey {
    pub object_id: ObjectId,
    pub fed_version_id: FedVersionId,
    pub component_id: ComponentId,
}

impl ConflictKey {
    pub fn new(object_id: ObjectId, fed_version_id: FedVersionId, component_id: ComponentId) -> Self {
        Self {
            object_id,
            fed_version_id,
            component_id,
        }
    }
}

/// Content of a version received from a federation component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedVersion {
    pub data: Option<Value>,
    pub schema: Option<Schema>,
    /// Local id of the (federated) author
    pub user_id: Option<UserId>,
    pub utc_datetime: DateTime<Utc>,
}

/// A conflict record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectVersionConflict {
    pub object_id: ObjectId,
    pub fed_version_id: FedVersionId,
    pub component_id: ComponentId,
    /// Local version the imported version was derived from
    pub base_version_id: Option<VersionId>,
    pub imported: ImportedVersion,
    /// Superseded by a newer import from the same component
    pub discarded: bool,
    pub version_solved_in: Option<VersionId>,
    pub solver_id: Option<UserId>,
    pub automerged: bool,
}

impl ObjectVersionConflict {
    pub fn key(&self) -> ConflictKey {
        ConflictKey::new(self.object_id, self.fed_version_id, self.component_id)
    }

    pub fn is_solved(&self) -> bool {
        self.version_solved_in.is_some()
    }

    /// Neither discarded nor solved.
    pub fn is_active(&self) -> bool {
        !self.discarded && !self.is_solved()
    }
}

/// How to solve a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolvingStrategy {
    /// Merge non-overlapping changes of both sides
    Automerge,
    /// Keep the local data
    ApplyLocal,
    /// Take the imported data
    ApplyImported,
}

impl fmt::Display for SolvingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolvingStrategy::Automerge => "automerge",
            SolvingStrategy::ApplyLocal => "apply_local",
            SolvingStrategy::ApplyImported => "apply_imported",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of [`automerge_conflict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomergeResult {
    /// No conflicting fields remain
    pub solved: bool,
    pub merged: MergedValue,
    /// Paths of the fields that need a manual decision
    pub conflicts: Vec<String>,
}

/// Record a conflict for an imported version.
///
/// Any active conflict for the same object and component is discarded.
pub fn create_object_version_conflict(
    store: &mut Store,
    object_id: ObjectId,
    fed_version_id: FedVersionId,
    component_id: ComponentId,
    base_version_id: Option<VersionId>,
    imported: ImportedVersion,
) -> Result<ObjectVersionConflict> {
    store.get_object(object_id, None)?;
    store.component(component_id)?;

    for previous in store.conflicts_mut().iter_mut().filter(|c| {
        c.object_id == object_id && c.component_id == component_id && c.is_active()
    }) {
        tracing::warn!(
            object_id,
            component_id,
            superseded = previous.fed_version_id,
            fed_version_id,
            "discarding superseded object version conflict"
        );
        previous.discarded = true;
    }

    let conflict = ObjectVersionConflict {
        object_id,
        fed_version_id,
        component_id,
        base_version_id,
        imported,
        discarded: false,
        version_solved_in: None,
        solver_id: None,
        automerged: false,
    };
    store.conflicts_mut().push(conflict.clone());

    tracing::info!(
        object_id,
        fed_version_id,
        component_id,
        ?base_version_id,
        "created object version conflict"
    );
    Ok(conflict)
}

/// Get a conflict record. If the same key was recorded more than once the
/// latest record is returned.
pub fn get_object_version_conflict(store: &Store, key: ConflictKey) -> Result<&ObjectVersionConflict> {
    store
        .conflicts()
        .iter()
        .rev()
        .find(|c| c.key() == key)
        .ok_or(Error::ObjectVersionConflictDoesNotExist {
            object_id: key.object_id,
            fed_version_id: key.fed_version_id,
            component_id: key.component_id,
        })
}

/// All conflict records of an object, oldest first.
pub fn get_object_version_conflicts(store: &Store, object_id: ObjectId) -> Vec<&ObjectVersionConflict> {
    store
        .conflicts()
        .iter()
        .filter(|c| c.object_id == object_id)
        .collect()
}

/// Conflict records of an object that still need solving.
pub fn get_active_object_version_conflicts(
    store: &Store,
    object_id: ObjectId,
) -> Vec<&ObjectVersionConflict> {
    store
        .conflicts()
        .iter()
        .filter(|c| c.object_id == object_id && c.is_active())
        .collect()
}

/// Merge the local and imported data of a conflict without committing.
///
/// Fails if either side is a deletion, the schemas differ or arrays were
/// changed in incompatible ways. Conflicting leaf values do not fail; they
/// are reported in the result.
pub fn automerge_conflict(store: &Store, key: ConflictKey) -> Result<AutomergeResult> {
    let conflict = get_object_version_conflict(store, key)?;
    let local = store.get_object(key.object_id, None)?;
    let base = match conflict.base_version_id {
        Some(version_id) => store.get_object(key.object_id, Some(version_id))?.data.as_ref(),
        None => None,
    };

    let failed = |reason: &str| Error::FailedSolvingByStrategy {
        strategy: SolvingStrategy::Automerge,
        reason: reason.to_string(),
    };

    let (Some(local_data), Some(local_schema)) = (&local.data, &local.schema) else {
        return Err(failed("the object has been deleted locally"));
    };
    let (Some(imported_data), Some(imported_schema)) =
        (&conflict.imported.data, &conflict.imported.schema)
    else {
        return Err(failed("the object has been deleted by the component"));
    };
    if local_schema != imported_schema {
        return Err(failed("local and imported versions use different schemas"));
    }

    let merged = merge(base, local_data, imported_data, local_schema.root())
        .map_err(|err| failed(&err.to_string()))?;
    let conflicts = merged.conflict_paths();

    Ok(AutomergeResult {
        solved: conflicts.is_empty(),
        merged,
        conflicts,
    })
}

/// Solve a conflict, creating a new version of the object.
///
/// On failure neither the object nor the conflict record change.
pub fn solve_conflict_by_strategy(
    store: &mut Store,
    key: ConflictKey,
    strategy: SolvingStrategy,
    solver_id: Option<UserId>,
    utc_datetime: DateTime<Utc>,
) -> Result<ObjectVersion> {
    let conflict = get_object_version_conflict(store, key)?;
    if !conflict.is_active() {
        return Err(Error::ConflictAlreadySolved {
            object_id: key.object_id,
            fed_version_id: key.fed_version_id,
            component_id: key.component_id,
        });
    }

    let version = match strategy {
        SolvingStrategy::ApplyLocal => {
            let local = store.get_object(key.object_id, None)?;
            NewVersion {
                data: local.data.clone(),
                schema: local.schema.clone(),
                user_id: solver_id,
                utc_datetime,
                version_component_id: None,
                fed_version_id: None,
                automerged: false,
            }
        }
        SolvingStrategy::ApplyImported => {
            let imported = conflict.imported.clone();
            NewVersion {
                data: imported.data,
                schema: imported.schema,
                user_id: imported.user_id,
                utc_datetime: imported.utc_datetime,
                version_component_id: None,
                fed_version_id: None,
                automerged: false,
            }
            .attributed_to(key.component_id, key.fed_version_id)
        }
        SolvingStrategy::Automerge => {
            let result = automerge_conflict(store, key).map_err(|err| {
                tracing::warn!(object_id = key.object_id, error = %err, "automerge failed");
                err
            })?;
            if !result.solved {
                tracing::warn!(
                    object_id = key.object_id,
                    conflicts = ?result.conflicts,
                    "automerge left conflicting fields"
                );
                return Err(Error::FailedSolvingByStrategy {
                    strategy,
                    reason: format!("conflicting changes in {}", result.conflicts.join(", ")),
                });
            }
            let local = store.get_object(key.object_id, None)?;
            NewVersion {
                data: Some(result.merged.to_json()),
                schema: local.schema.clone(),
                user_id: solver_id,
                utc_datetime,
                version_component_id: None,
                fed_version_id: None,
                automerged: false,
            }
            .automerged()
        }
    };

    let solved_in = store.update_object(key.object_id, version)?;
    if let Some(conflict) = store
        .conflicts_mut()
        .iter_mut()
        .rev()
        .find(|c| c.key() == key)
    {
        conflict.version_solved_in = Some(solved_in.version_id);
        conflict.solver_id = solver_id;
        conflict.automerged = strategy == SolvingStrategy::Automerge;
    }

    tracing::info!(
        object_id = key.object_id,
        fed_version_id = key.fed_version_id,
        component_id = key.component_id,
        %strategy,
        version_id = solved_in.version_id,
        "solved object version conflict"
    );
    Ok(solved_in)
}
