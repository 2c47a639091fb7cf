//! Prefetch lookups.
//!
//! A lookup names a relation path from the root model, e.g. `"books__read_by"`
//! (or `"books.read_by"`). Wrapping it in a [`LookupSpec`] lets the caller
//! supply a custom queryset for the final segment and store the result under a
//! different attribute:
//!
//! ```rust
//! use prax_prefetch_core::{LookupSpec, QuerySet, Filter};
//!
//! let lookup = LookupSpec::new("houses__rooms")
//!     .queryset(QuerySet::new("Room").r#where(Filter::eq("name", "Kitchen")))
//!     .to_attr("kitchens");
//!
//! assert_eq!(lookup.prefetch_through(), "houses__rooms");
//! assert_eq!(lookup.prefetch_to(), "houses__kitchens");
//! ```

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::error::{QueryError, QueryResult};
use crate::queryset::QuerySet;

/// Separator between lookup segments.
pub const LOOKUP_SEP: &str = "__";

type Segments = SmallVec<[SmolStr; 4]>;

/// One prefetch lookup: a relation path, an optional queryset for its last
/// segment and an optional attribute to store the result under.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupSpec {
    through: Segments,
    to: Segments,
    queryset: Option<QuerySet>,
    to_attr: Option<SmolStr>,
}

impl LookupSpec {
    /// Create a lookup from a `__`- or `.`-separated path.
    pub fn new(lookup: impl AsRef<str>) -> Self {
        let through: Segments = lookup
            .as_ref()
            .split(LOOKUP_SEP)
            .flat_map(|part| part.split('.'))
            .map(SmolStr::new)
            .collect();
        Self {
            to: through.clone(),
            through,
            queryset: None,
            to_attr: None,
        }
    }

    /// Use a custom queryset for the final segment.
    pub fn queryset(mut self, queryset: QuerySet) -> Self {
        self.queryset = Some(queryset);
        self
    }

    /// Store the final segment's result under `name` instead of the relation's cache.
    pub fn to_attr(mut self, name: impl Into<SmolStr>) -> Self {
        let name = name.into();
        if let Some(last) = self.to.last_mut() {
            *last = name.clone();
        }
        self.to_attr = Some(name);
        self
    }

    /// Reject empty paths and empty segments.
    pub fn validate(&self) -> QueryResult<()> {
        if self.through.iter().any(|s| s.is_empty()) {
            return Err(QueryError::invalid_lookup(
                self.prefetch_through(),
                "lookup paths must not contain empty segments",
            ));
        }
        if self
            .to_attr
            .as_ref()
            .is_some_and(|a| a.is_empty() || a.contains(LOOKUP_SEP) || a.contains('.'))
        {
            return Err(QueryError::invalid_lookup(
                self.prefetch_through(),
                "to_attr must be a single non-empty attribute name",
            ));
        }
        Ok(())
    }

    /// The path as written.
    pub fn prefetch_through(&self) -> String {
        self.through.join(LOOKUP_SEP)
    }

    /// The path with its final segment replaced by `to_attr`.
    pub fn prefetch_to(&self) -> String {
        self.to.join(LOOKUP_SEP)
    }

    /// Segments of the path as written.
    pub fn through_segments(&self) -> &[SmolStr] {
        &self.through
    }

    /// Segments of the storage path.
    pub fn to_segments(&self) -> &[SmolStr] {
        &self.to
    }

    /// Number of relation levels.
    pub fn levels(&self) -> usize {
        self.through.len()
    }

    /// Whether `level` is the final segment.
    pub fn is_leaf(&self, level: usize) -> bool {
        level + 1 == self.through.len()
    }

    /// Storage path up to and including `level`.
    pub fn current_prefetch_to(&self, level: usize) -> String {
        self.to[..=level].join(LOOKUP_SEP)
    }

    /// Storage name at `level`, and whether it is an explicit `to_attr`.
    pub fn current_to_attr(&self, level: usize) -> (&SmolStr, bool) {
        (&self.to[level], self.to_attr.is_some() && self.is_leaf(level))
    }

    /// The custom queryset, which only applies to the final segment.
    pub fn current_queryset(&self, level: usize) -> Option<&QuerySet> {
        if self.is_leaf(level) {
            self.queryset.as_ref()
        } else {
            None
        }
    }

    /// The custom queryset, if any.
    pub fn get_queryset(&self) -> Option<&QuerySet> {
        self.queryset.as_ref()
    }

    /// The explicit `to_attr`, if any.
    pub fn get_to_attr(&self) -> Option<&SmolStr> {
        self.to_attr.as_ref()
    }

    /// Re-root this lookup under `prefix`, a storage path of the parent level.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if prefix.is_empty() {
            return self;
        }
        let head: Segments = prefix.split(LOOKUP_SEP).map(SmolStr::new).collect();
        self.through.insert_many(0, head.iter().cloned());
        self.to.insert_many(0, head);
        self
    }
}

impl From<&str> for LookupSpec {
    fn from(lookup: &str) -> Self {
        Self::new(lookup)
    }
}

impl From<String> for LookupSpec {
    fn from(lookup: String) -> Self {
        Self::new(lookup)
    }
}

impl From<&LookupSpec> for LookupSpec {
    fn from(lookup: &LookupSpec) -> Self {
        lookup.clone()
    }
}

/// Shorthand for [`LookupSpec::new`].
pub fn prefetch(lookup: impl AsRef<str>) -> LookupSpec {
    LookupSpec::new(lookup)
}
