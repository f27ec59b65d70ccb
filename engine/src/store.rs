//! Store - the in-memory state container.
//!
//! The Store holds components, users, every version of every object and the
//! conflict records created by federation imports. It stands in for the
//! relational storage SampleDB uses and is the collaborator the search and
//! conflict operations read from and write to.

use crate::federation::conflicts::ObjectVersionConflict;
use crate::federation::hash::{calculate_data_hash, calculate_metadata_hash};
use crate::object::{Component, ObjectVersion, User, UserIdentity};
use crate::{
    error::Result, ActionId, ComponentId, Error, FedVersionId, ObjectId, Schema, UserId,
    VersionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Content and attribution of a version about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub data: Option<Value>,
    pub schema: Option<Schema>,
    pub user_id: Option<UserId>,
    pub utc_datetime: DateTime<Utc>,
    pub version_component_id: Option<ComponentId>,
    pub fed_version_id: Option<FedVersionId>,
    /// Hash the metadata with the automerge identity instead of the user's
    pub automerged: bool,
}

impl NewVersion {
    /// A version edited on this instance.
    pub fn local(
        data: Value,
        schema: Schema,
        user_id: Option<UserId>,
        utc_datetime: DateTime<Utc>,
    ) -> Self {
        Self {
            data: Some(data),
            schema: Some(schema),
            user_id,
            utc_datetime,
            version_component_id: None,
            fed_version_id: None,
            automerged: false,
        }
    }

    /// Attribute the version to a federation component.
    pub fn attributed_to(mut self, component_id: ComponentId, fed_version_id: FedVersionId) -> Self {
        self.version_component_id = Some(component_id);
        self.fed_version_id = Some(fed_version_id);
        self
    }

    /// Mark the version as the result of an automerge.
    pub fn automerged(mut self) -> Self {
        self.automerged = true;
        self
    }
}

/// The main store holding all state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    components: BTreeMap<ComponentId, Component>,
    users: BTreeMap<UserId, User>,
    /// Versions by object, ordered by version id
    objects: BTreeMap<ObjectId, Vec<ObjectVersion>>,
    /// Conflict records in creation order
    conflicts: Vec<ObjectVersionConflict>,
    next_object_id: ObjectId,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a federation component.
    pub fn add_component(&mut self, component: Component) {
        self.components.insert(component.id, component);
    }

    /// Get a component by ID.
    pub fn component(&self, id: ComponentId) -> Result<&Component> {
        self.components
            .get(&id)
            .ok_or(Error::ComponentDoesNotExist(id))
    }

    /// Register a user.
    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Get a user by ID.
    pub fn user(&self, id: UserId) -> Result<&User> {
        self.users.get(&id).ok_or(Error::UserDoesNotExist(id))
    }

    /// Resolve the identity a user's edits are hashed with.
    ///
    /// Federated users are identified by their home component's UUID and
    /// their id there; everybody else is anonymous.
    pub fn user_identity(&self, user_id: Option<UserId>) -> Result<UserIdentity> {
        let Some(user_id) = user_id else {
            return Ok(UserIdentity::Anonymous);
        };
        let user = self.user(user_id)?;
        match (user.component_id, user.fed_id) {
            (Some(component_id), Some(fed_id)) => Ok(UserIdentity::Federated {
                component_uuid: self.component(component_id)?.uuid,
                remote_user_id: fed_id,
            }),
            _ => Ok(UserIdentity::Anonymous),
        }
    }

    /// Create a new object, returning its first version.
    pub fn create_object(
        &mut self,
        action_id: Option<ActionId>,
        version: NewVersion,
    ) -> Result<ObjectVersion> {
        let object_id = self.next_object_id;
        let first = self.build_version(object_id, 0, action_id, version)?;
        self.next_object_id += 1;
        self.objects.insert(object_id, vec![first.clone()]);

        tracing::info!(object_id, "created object");
        Ok(first)
    }

    /// Append a new version to an existing object.
    pub fn update_object(&mut self, object_id: ObjectId, version: NewVersion) -> Result<ObjectVersion> {
        let current = self.get_object(object_id, None)?;
        let version_id = current.version_id + 1;
        let action_id = current.action_id;

        let next = self.build_version(object_id, version_id, action_id, version)?;
        self.objects
            .get_mut(&object_id)
            .ok_or(Error::ObjectDoesNotExist(object_id))?
            .push(next.clone());

        tracing::info!(
            object_id,
            version_id,
            component_id = ?next.version_component_id,
            "created object version"
        );
        Ok(next)
    }

    fn build_version(
        &self,
        object_id: ObjectId,
        version_id: VersionId,
        action_id: Option<ActionId>,
        version: NewVersion,
    ) -> Result<ObjectVersion> {
        let identity = if version.automerged {
            UserIdentity::Automerged
        } else {
            self.user_identity(version.user_id)?
        };
        if let Some(component_id) = version.version_component_id {
            self.component(component_id)?;
        }

        let hash_data = calculate_data_hash(
            version.data.as_ref(),
            version.schema.as_ref(),
            Some(object_id),
        );
        let hash_metadata = calculate_metadata_hash(&identity, &version.utc_datetime);

        Ok(ObjectVersion {
            object_id,
            version_id,
            action_id,
            data: version.data,
            schema: version.schema,
            user_id: version.user_id,
            utc_datetime: version.utc_datetime,
            version_component_id: version.version_component_id,
            fed_version_id: version.fed_version_id,
            hash_data,
            hash_metadata,
        })
    }

    /// Get a specific version of an object, or the current one.
    pub fn get_object(
        &self,
        object_id: ObjectId,
        version_id: Option<VersionId>,
    ) -> Result<&ObjectVersion> {
        let versions = self.get_object_versions(object_id)?;
        match version_id {
            None => versions.last().ok_or(Error::ObjectDoesNotExist(object_id)),
            Some(version_id) => versions
                .iter()
                .find(|v| v.version_id == version_id)
                .ok_or(Error::ObjectVersionDoesNotExist {
                    object_id,
                    version_id,
                }),
        }
    }

    /// Get all versions of an object, oldest first.
    pub fn get_object_versions(&self, object_id: ObjectId) -> Result<&[ObjectVersion]> {
        self.objects
            .get(&object_id)
            .map(Vec::as_slice)
            .ok_or(Error::ObjectDoesNotExist(object_id))
    }

    /// Check if an object exists.
    pub fn contains(&self, object_id: ObjectId) -> bool {
        self.objects.contains_key(&object_id)
    }

    /// Current versions of all objects whose data passes the filter.
    ///
    /// Deleted objects are skipped.
    pub fn get_objects<F>(&self, filter: F) -> Vec<&ObjectVersion>
    where
        F: Fn(&Value) -> bool,
    {
        self.objects
            .values()
            .filter_map(|versions| versions.last())
            .filter(|v| v.data.as_ref().is_some_and(&filter))
            .collect()
    }

    /// Count of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store has no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn conflicts(&self) -> &[ObjectVersionConflict] {
        &self.conflicts
    }

    pub(crate) fn conflicts_mut(&mut self) -> &mut Vec<ObjectVersionConflict> {
        &mut self.conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    fn test_schema() -> Schema {
        Schema::from_json(json!({
            "type": "object",
            "properties": {"name": {"type": "text"}}
        }))
        .unwrap()
    }

    fn named(name: &str) -> Value {
        json!({"name": {"_type": "text", "text": name}})
    }

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap()
    }

    fn test_store() -> Store {
        let mut store = Store::new();
        store.add_component(Component::new(1, Uuid::new_v4()));
        store.add_user(User::local(1));
        store.add_user(User::federated(2, 1, 10));
        store
    }

    #[test]
    fn create_and_update_object() {
        let mut store = test_store();
        let first = store
            .create_object(Some(4), NewVersion::local(named("a"), test_schema(), Some(1), at(0)))
            .unwrap();
        assert_eq!(first.version_id, 0);
        assert!(first.hash_data.is_some());

        let second = store
            .update_object(
                first.object_id,
                NewVersion::local(named("b"), test_schema(), Some(1), at(1)),
            )
            .unwrap();
        assert_eq!(second.version_id, 1);
        assert_eq!(second.action_id, Some(4));
        assert_ne!(first.hash_data, second.hash_data);

        assert_eq!(store.get_object(first.object_id, None).unwrap().version_id, 1);
        assert_eq!(
            store.get_object(first.object_id, Some(0)).unwrap().data,
            Some(named("a"))
        );
        assert_eq!(store.get_object_versions(first.object_id).unwrap().len(), 2);
    }

    #[test]
    fn object_ids_are_sequential() {
        let mut store = test_store();
        for expected in 0..3 {
            let v = store
                .create_object(None, NewVersion::local(named("x"), test_schema(), None, at(0)))
                .unwrap();
            assert_eq!(v.object_id, expected);
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn missing_objects_and_versions() {
        let mut store = test_store();
        assert_eq!(store.get_object(9, None), Err(Error::ObjectDoesNotExist(9)));
        assert!(matches!(
            store.update_object(9, NewVersion::local(named("a"), test_schema(), None, at(0))),
            Err(Error::ObjectDoesNotExist(9))
        ));

        let v = store
            .create_object(None, NewVersion::local(named("a"), test_schema(), None, at(0)))
            .unwrap();
        assert_eq!(
            store.get_object(v.object_id, Some(5)),
            Err(Error::ObjectVersionDoesNotExist {
                object_id: v.object_id,
                version_id: 5
            })
        );
    }

    #[test]
    fn user_identity_resolution() {
        let store = test_store();
        assert_eq!(store.user_identity(None).unwrap(), UserIdentity::Anonymous);
        assert_eq!(store.user_identity(Some(1)).unwrap(), UserIdentity::Anonymous);
        assert!(matches!(
            store.user_identity(Some(2)).unwrap(),
            UserIdentity::Federated { remote_user_id: 10, .. }
        ));
        assert_eq!(store.user_identity(Some(3)), Err(Error::UserDoesNotExist(3)));
    }

    #[test]
    fn unknown_component_is_rejected() {
        let mut store = test_store();
        let version =
            NewVersion::local(named("a"), test_schema(), None, at(0)).attributed_to(99, 1);
        assert_eq!(
            store.create_object(None, version),
            Err(Error::ComponentDoesNotExist(99))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn get_objects_filters_current_versions() {
        let mut store = test_store();
        let a = store
            .create_object(None, NewVersion::local(named("a"), test_schema(), None, at(0)))
            .unwrap();
        store
            .create_object(None, NewVersion::local(named("b"), test_schema(), None, at(0)))
            .unwrap();
        store
            .update_object(
                a.object_id,
                NewVersion::local(named("b"), test_schema(), None, at(1)),
            )
            .unwrap();

        let matches = store.get_objects(|data| data["name"]["text"] == "b");
        assert_eq!(matches.len(), 2);
        assert!(store.get_objects(|data| data["name"]["text"] == "a").is_empty());
    }

    #[test]
    fn deleted_objects_are_not_listed() {
        let mut store = test_store();
        let a = store
            .create_object(None, NewVersion::local(named("a"), test_schema(), None, at(0)))
            .unwrap();
        let mut deletion = NewVersion::local(named("a"), test_schema(), None, at(1));
        deletion.data = None;
        deletion.schema = None;
        let deleted = store.update_object(a.object_id, deletion).unwrap();
        assert!(deleted.is_deletion());
        assert_eq!(deleted.hash_data, None);
        assert!(store.get_objects(|_| true).is_empty());
    }

    #[test]
    fn store_serialization() {
        let mut store = test_store();
        store
            .create_object(None, NewVersion::local(named("a"), test_schema(), Some(2), at(0)))
            .unwrap();
        let json = serde_json::to_string(&store).unwrap();
        let parsed: Store = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get_object(0, None).unwrap(), store.get_object(0, None).unwrap());
    }
}
