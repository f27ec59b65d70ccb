//! # SampleDB Engine
//!
//! Object search and federation conflict handling for SampleDB.
//!
//! This crate holds the two parts of SampleDB with real algorithmic content.
//! Everything around them (web routes, permissions, persistence) is left to
//! the caller, which hands in schemas and object data and gets back filtered
//! objects, diagnostics or new object versions.
//!
//! ## Design Principles
//!
//! - **No IO**: Searching and merging are pure computations over loaded data
//! - **Explicit configuration**: Unit definitions live in a [`SearchConfig`]
//!   value, not in process-wide state
//! - **Degrade, don't fail**: A broken search query yields diagnostics and no
//!   results, never an error
//!
//! ## Core Concepts
//!
//! ### Advanced Search
//!
//! Queries such as `length >= 2cm and not #archived` are tokenized, parsed
//! into a [`Node`] tree and compiled against the action's [`Schema`] into a
//! [`Filter`]. Supported are:
//! - `and`/`&&`, `or`/`||`, `not`/`!`
//! - `==`, `!=`, `<`, `<=`, `>`, `>=` and `on`, `before`, `after` for dates
//! - `in` for text containment
//! - Text (`"..."`), quantities (`20mm`), dates (`2021-12-31`), tags
//!   (`#tag`), `True`/`False` and attribute paths (`array_attr.?.bool_attr`)
//!
//! Problems are reported as [`Diagnostics`] with character offsets.
//!
//! ### Federation Conflicts
//!
//! Versions imported from other instances are compared with local ones by
//! content hash. Diverging edits become an [`ObjectVersionConflict`] which is
//! solved by a [`SolvingStrategy`]:
//! - [`SolvingStrategy::Automerge`] - merge changes to different fields
//! - [`SolvingStrategy::ApplyLocal`] - keep the local data
//! - [`SolvingStrategy::ApplyImported`] - take the imported data
//!
//! ## Quick Start
//!
//! ```rust
//! use sampledb_engine::{NewVersion, Schema, SearchConfig, SearchEngine, Store};
//! use chrono::Utc;
//! use serde_json::json;
//!
//! // 1. Define a schema
//! let schema = Schema::from_json(json!({
//!     "type": "object",
//!     "properties": {
//!         "name": {"type": "text"},
//!         "length": {"type": "quantity", "units": "mm"}
//!     }
//! }))
//! .unwrap();
//!
//! // 2. Store an object
//! let mut store = Store::new();
//! let data = json!({
//!     "name": {"_type": "text", "text": "Sample 1"},
//!     "length": {
//!         "_type": "quantity",
//!         "magnitude_in_base_units": 0.02,
//!         "units": "mm",
//!         "dimensionality": "[length]"
//!     }
//! });
//! store
//!     .create_object(Some(1), NewVersion::local(data, schema.clone(), None, Utc::now()))
//!     .unwrap();
//!
//! // 3. Search
//! let engine = SearchEngine::new(SearchConfig::new());
//! let results = engine.search(&store, "length == 2cm", false, &schema);
//! assert!(results.use_advanced_search);
//! assert!(results.diagnostics.is_empty());
//! assert_eq!(results.objects.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod federation;
pub mod object;
pub mod schema;
pub mod search;
pub mod store;
pub mod units;

// Re-export main types at crate root
pub use config::{ConfigError, SearchConfig};
pub use error::Error;
pub use federation::{
    automerge_conflict, calculate_data_hash, calculate_metadata_hash,
    create_object_version_conflict, get_active_object_version_conflicts,
    get_object_version_conflict, get_object_version_conflicts, import_object_version,
    solve_conflict_by_strategy, AutomergeResult, ConflictKey, ImportOutcome, ImportedVersion,
    MergedValue, ObjectVersionConflict, SolvingStrategy,
};
pub use object::{Component, ObjectVersion, User, UserIdentity};
pub use schema::{PathSegment, PropertySchema, Schema};
pub use search::{
    evaluate, wrap_filter_func, Diagnostic, Diagnostics, Filter, FilterFunc, Node, Predicate,
    SearchEngine, SearchMode, SearchResults, Severity,
};
pub use store::{NewVersion, Store};
pub use units::{Dimensionality, Quantity, UnitRegistry};

/// Type aliases for clarity
pub type ObjectId = i64;
pub type VersionId = i64;
pub type ActionId = i64;
pub type UserId = i64;
pub type ComponentId = i64;
pub type FedVersionId = i64;
