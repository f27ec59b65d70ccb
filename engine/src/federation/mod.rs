//! Federation between SampleDB instances.
//!
//! Imported object versions are compared with the local ones by content
//! hashes ([`hash`]). When both sides edited an object, a conflict record is
//! kept ([`conflicts`]) until it is solved by taking one side or by merging
//! both ([`merge`]).

pub mod conflicts;
pub mod hash;
pub mod import;
pub mod merge;

pub use conflicts::{
    automerge_conflict, create_object_version_conflict, get_active_object_version_conflicts,
    get_object_version_conflict, get_object_version_conflicts, solve_conflict_by_strategy,
    AutomergeResult, ConflictKey, ImportedVersion, ObjectVersionConflict, SolvingStrategy,
};
pub use hash::{calculate_data_hash, calculate_metadata_hash};
pub use import::{import_object_version, ImportOutcome};
pub use merge::{MergeError, MergedValue};
