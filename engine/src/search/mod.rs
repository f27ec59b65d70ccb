//! Object search.
//!
//! A search string is either a plain text searched for anywhere in the
//! object data, or an advanced query such as
//! `length >= 2cm and (#sample or array_attr.?.bool_attr)`. Advanced queries
//! go through [`parser`] and [`compiler`] and end up as a [`Filter`]; problems
//! are reported as [`Diagnostics`] with character offsets, never as errors.

pub mod compiler;
pub mod diagnostics;
pub mod filter;
pub mod parser;
pub mod token;
pub mod tree;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use filter::Filter;
pub use tree::Node;

use crate::config::SearchConfig;
use crate::object::ObjectVersion;
use crate::schema::Schema;
use crate::store::Store;
use crate::units::UnitRegistry;
use serde_json::Value;
use std::sync::Arc;

/// How a predicate decides whether object data matches.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
    /// Empty search
    MatchAll,
    /// Substring search over all text in the data
    FullText { needle: String, case_sensitive: bool },
    Advanced(Filter),
}

/// A compiled search, applicable to object data.
#[derive(Debug, Clone)]
pub struct Predicate {
    mode: SearchMode,
    units: Arc<UnitRegistry>,
}

impl Predicate {
    pub fn mode(&self) -> &SearchMode {
        &self.mode
    }

    /// Check whether object data matches. Never fails.
    pub fn matches(&self, data: &Value) -> bool {
        match &self.mode {
            SearchMode::MatchAll => true,
            SearchMode::FullText {
                needle,
                case_sensitive,
            } => {
                if *case_sensitive {
                    contains_text(data, needle, &|text: &str| text.to_string())
                } else {
                    contains_text(data, &needle.to_lowercase(), &str::to_lowercase)
                }
            }
            SearchMode::Advanced(filter) => filter.matches(data, &self.units),
        }
    }
}

/// A predicate together with the diagnostics produced while building it.
#[derive(Debug, Clone)]
pub struct FilterFunc {
    pub predicate: Predicate,
    pub diagnostics: Diagnostics,
}

/// Split a [`FilterFunc`] into its predicate and diagnostics.
///
/// Evaluating a [`Predicate`] cannot produce diagnostics, so everything a
/// search reports is already collected when the filter is built.
pub fn wrap_filter_func(filter_func: FilterFunc) -> (Predicate, Diagnostics) {
    (filter_func.predicate, filter_func.diagnostics)
}

/// Objects whose data matches the predicate. Deletions never match.
pub fn evaluate<'a, I>(predicate: &Predicate, objects: I) -> Vec<&'a ObjectVersion>
where
    I: IntoIterator<Item = &'a ObjectVersion>,
{
    objects
        .into_iter()
        .filter(|object| object.data.as_ref().is_some_and(|data| predicate.matches(data)))
        .collect()
}

/// Outcome of [`SearchEngine::search`].
#[derive(Debug)]
pub struct SearchResults<'s> {
    pub objects: Vec<&'s ObjectVersion>,
    pub diagnostics: Diagnostics,
    pub tree: Option<Node>,
    pub use_advanced_search: bool,
}

/// Entry point for searches, owning the immutable configuration.
#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Parse an advanced query.
    pub fn parse(&self, query: &str) -> (Option<Node>, Diagnostics) {
        parser::parse(query, &self.config.units)
    }

    /// Compile a parsed query against a schema.
    pub fn compile(&self, tree: &Node, schema: &Schema) -> (Predicate, Diagnostics) {
        let (filter, diagnostics) = compiler::compile(tree, schema, &self.config.units);
        tracing::debug!(%filter, diagnostics = diagnostics.len(), "compiled search query");
        (self.predicate(SearchMode::Advanced(filter)), diagnostics)
    }

    /// Build the predicate for a search string.
    ///
    /// With `use_advanced_search` the query is always treated as an advanced
    /// query. Otherwise it is used as an advanced query only if that works
    /// without any diagnostics, and as a full-text search if not. Returns the
    /// filter, the parsed tree (advanced only) and whether the advanced mode
    /// was used.
    pub fn generate_filter_func(
        &self,
        query: &str,
        use_advanced_search: bool,
        schema: &Schema,
    ) -> (FilterFunc, Option<Node>, bool) {
        let query = query.trim();
        if query.is_empty() {
            let filter_func = FilterFunc {
                predicate: self.predicate(SearchMode::MatchAll),
                diagnostics: Diagnostics::new(),
            };
            return (filter_func, None, use_advanced_search);
        }

        let (tree, mut diagnostics) = self.parse(query);
        let advanced = match &tree {
            Some(tree) if !diagnostics.has_errors() => {
                let (predicate, compile_diagnostics) = self.compile(tree, schema);
                diagnostics.extend(compile_diagnostics);
                Some(predicate)
            }
            _ => None,
        };

        if use_advanced_search {
            let predicate = match advanced {
                Some(predicate) if !diagnostics.has_errors() => predicate,
                _ => self.predicate(SearchMode::Advanced(Filter::Constant(false))),
            };
            return (
                FilterFunc {
                    predicate,
                    diagnostics,
                },
                tree,
                true,
            );
        }

        // Without diagnostics the tree holds an operator, a tag or a bool
        // attribute, none of which mean the same as a substring search.
        match advanced {
            Some(predicate) if diagnostics.is_empty() => {
                tracing::debug!(query, "using advanced search");
                (
                    FilterFunc {
                        predicate,
                        diagnostics,
                    },
                    tree,
                    true,
                )
            }
            _ => {
                tracing::debug!(
                    query,
                    diagnostics = diagnostics.len(),
                    "falling back to full-text search"
                );
                let predicate = self.predicate(SearchMode::FullText {
                    needle: query.to_string(),
                    case_sensitive: self.config.fulltext_case_sensitive,
                });
                (
                    FilterFunc {
                        predicate,
                        diagnostics: Diagnostics::new(),
                    },
                    None,
                    false,
                )
            }
        }
    }

    /// Search the current versions of all objects in a store.
    pub fn search<'s>(
        &self,
        store: &'s Store,
        query: &str,
        use_advanced_search: bool,
        schema: &Schema,
    ) -> SearchResults<'s> {
        let (filter_func, tree, use_advanced_search) =
            self.generate_filter_func(query, use_advanced_search, schema);
        let (predicate, diagnostics) = wrap_filter_func(filter_func);
        let objects = store.get_objects(|data| predicate.matches(data));
        SearchResults {
            objects,
            diagnostics,
            tree,
            use_advanced_search,
        }
    }

    fn predicate(&self, mode: SearchMode) -> Predicate {
        Predicate {
            mode,
            units: Arc::clone(&self.config.units),
        }
    }
}

/// Whether any string in the data contains `needle`, skipping `_type` tags.
fn contains_text(data: &Value, needle: &str, normalize: &dyn Fn(&str) -> String) -> bool {
    match data {
        Value::String(text) => normalize(text).contains(needle),
        Value::Array(items) => items.iter().any(|item| contains_text(item, needle, normalize)),
        Value::Object(fields) => fields
            .iter()
            .filter(|(key, _)| key.as_str() != "_type")
            .any(|(_, value)| contains_text(value, needle, normalize)),
        _ => false,
    }
}
