//! Object versions, federation components and users.

use crate::{ActionId, ComponentId, FedVersionId, ObjectId, Schema, UserId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A remote SampleDB instance exchanging objects with this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: ComponentId,
    pub uuid: Uuid,
    pub name: Option<String>,
}

impl Component {
    pub fn new(id: ComponentId, uuid: Uuid) -> Self {
        Self {
            id,
            uuid,
            name: None,
        }
    }

    /// Builder-style method to set a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A user, either local or imported from a federation component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Id of the user on its home component
    pub fed_id: Option<i64>,
    /// Home component of a federated user
    pub component_id: Option<ComponentId>,
}

impl User {
    /// Create a user of this instance.
    pub fn local(id: UserId) -> Self {
        Self {
            id,
            fed_id: None,
            component_id: None,
        }
    }

    /// Create a user imported from a component.
    pub fn federated(id: UserId, component_id: ComponentId, fed_id: i64) -> Self {
        Self {
            id,
            fed_id: Some(fed_id),
            component_id: Some(component_id),
        }
    }
}

/// Authorship used when hashing edit metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserIdentity {
    /// A user known to a federation component
    Federated {
        component_uuid: Uuid,
        remote_user_id: i64,
    },
    /// Produced by automatically merging a conflict
    Automerged,
    /// A local edit
    Anonymous,
}

/// One version of an object.
///
/// `data` and `schema` are `None` for a deletion marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectVersion {
    pub object_id: ObjectId,
    pub version_id: VersionId,
    pub action_id: Option<ActionId>,
    pub data: Option<serde_json::Value>,
    pub schema: Option<Schema>,
    pub user_id: Option<UserId>,
    pub utc_datetime: DateTime<Utc>,
    /// Component whose edit this version is attributed to
    pub version_component_id: Option<ComponentId>,
    /// Version id on that component
    pub fed_version_id: Option<FedVersionId>,
    pub hash_data: Option<String>,
    pub hash_metadata: String,
}

impl ObjectVersion {
    /// Whether this version marks the object as deleted.
    pub fn is_deletion(&self) -> bool {
        self.data.is_none()
    }

    /// Whether this version was imported from a component.
    pub fn is_imported(&self) -> bool {
        self.version_component_id.is_some()
    }
}
