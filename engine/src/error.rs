//! Error types for the SampleDB engine.
//!
//! Search problems never surface here; they are reported as
//! [`Diagnostics`](crate::search::Diagnostics) instead.

use crate::federation::conflicts::SolvingStrategy;
use crate::{ComponentId, FedVersionId, ObjectId, UserId, VersionId};
use thiserror::Error;

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("object does not exist: {0}")]
    ObjectDoesNotExist(ObjectId),

    #[error("object {object_id} has no version {version_id}")]
    ObjectVersionDoesNotExist {
        object_id: ObjectId,
        version_id: VersionId,
    },

    #[error("component does not exist: {0}")]
    ComponentDoesNotExist(ComponentId),

    #[error("user does not exist: {0}")]
    UserDoesNotExist(UserId),

    #[error(
        "no conflict for object {object_id} with version {fed_version_id} from component {component_id}"
    )]
    ObjectVersionConflictDoesNotExist {
        object_id: ObjectId,
        fed_version_id: FedVersionId,
        component_id: ComponentId,
    },

    // Conflict errors
    #[error(
        "conflict for object {object_id} with version {fed_version_id} from component {component_id} is no longer active"
    )]
    ConflictAlreadySolved {
        object_id: ObjectId,
        fed_version_id: FedVersionId,
        component_id: ComponentId,
    },

    #[error("failed solving conflict by strategy {strategy}: {reason}")]
    FailedSolvingByStrategy {
        strategy: SolvingStrategy,
        reason: String,
    },

    // Input errors
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
