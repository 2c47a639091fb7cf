//! Batched relation loaders.
//!
//! Every relation attribute on a model is backed by a [`Prefetcher`]. Given a
//! batch of parent records it issues one query per key chunk and returns the
//! fetched rows keyed by the value that links them back to their parent.

use std::fmt;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::lookup::LookupSpec;
use crate::queryset::QuerySet;
use crate::record::Record;
use crate::schema::Schema;
use crate::session::Session;
use crate::value::{KeyPart, RelKey, Value, rel_key};

use super::spec::{RelationKind, RelationSpec};

/// Rows fetched for one batch of parents.
#[derive(Debug, Default)]
pub struct PrefetchBatch {
    /// Fetched records in query order, each with the key of the parent it belongs to.
    pub rows: Vec<(RelKey, Record)>,
    /// Lookups the related queryset asked to run on the fetched records.
    pub lookups: Vec<LookupSpec>,
    /// Attribute on each fetched record that should point back at its parent.
    pub back_reference: Option<SmolStr>,
}

impl PrefetchBatch {
    /// An empty batch carrying the queryset's follow-up lookups.
    pub fn empty(lookups: Vec<LookupSpec>, back_reference: Option<SmolStr>) -> Self {
        Self {
            rows: Vec::new(),
            lookups,
            back_reference,
        }
    }

    /// Fetched records in query order.
    pub fn records(&self) -> Vec<Record> {
        self.rows.iter().map(|(_, r)| r.clone()).collect()
    }
}

/// Loads one relation attribute for many parents at once.
pub trait Prefetcher: Send + Sync + fmt::Debug {
    /// The relation this loader serves.
    fn spec(&self) -> &RelationSpec;

    /// Cache key the relation's results are stored under.
    fn cache_name(&self) -> &str {
        &self.spec().name
    }

    /// Whether the relation yields at most one record.
    fn is_single(&self) -> bool {
        self.spec().kind.is_single()
    }

    /// Model of the fetched records, if fixed.
    fn target_model(&self) -> Option<&str> {
        self.spec().related_model.as_deref()
    }

    /// Key of `record` on the parent side, `None` when it cannot have related rows.
    fn instance_key(&self, schema: &Schema, record: &Record) -> Option<RelKey>;

    /// Fetch related rows for `instances`, optionally through a custom queryset.
    fn fetch(
        &self,
        session: &Session,
        instances: &[Record],
        queryset: Option<&QuerySet>,
    ) -> QueryResult<PrefetchBatch>;

    /// Whether reading a missing related record of `record` raises rather than yielding `None`.
    fn missing_is_error(&self, record: &Record) -> bool {
        let spec = self.spec();
        match spec.kind {
            RelationKind::ForwardManyToOne | RelationKind::ForwardOneToOne => {
                !spec.nullable && record.get(&spec.local_column).is_some_and(|v| !v.is_null())
            }
            RelationKind::ReverseOneToOne => true,
            _ => false,
        }
    }
}

/// Resolve the queryset a prefetch runs against.
///
/// A custom queryset must target the relation's model. Without one, the
/// target's default lookups are carried when the relation goes through the
/// default manager and the session follows default prefetches.
pub(crate) fn effective_queryset(
    session: &Session,
    spec: &RelationSpec,
    target: &str,
    queryset: Option<&QuerySet>,
) -> QueryResult<QuerySet> {
    match queryset {
        Some(qs) if qs.model() != target => Err(QueryError::queryset_mismatch(
            spec.qualified_name(),
            target,
            qs.model(),
        )),
        Some(qs) => Ok(qs.clone()),
        None => {
            let qs = QuerySet::new(target);
            let follow = spec.kind.uses_default_manager()
                && session.config().prefetch.follow_default_prefetches;
            if follow {
                let defaults = session.schema().model(target)?.default_prefetch().to_vec();
                Ok(qs.prefetch_related(defaults))
            } else {
                Ok(qs)
            }
        }
    }
}

/// Distinct non-null values in first-seen order.
pub(crate) fn distinct_keys(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut seen: IndexMap<KeyPart, Value> = IndexMap::new();
    for value in values {
        if let Some(part) = value.key_part() {
            seen.entry(part).or_insert(value);
        }
    }
    seen.into_values().collect()
}

/// Loader for relations matched on a single key column, directly or through a join table.
#[derive(Debug, Clone)]
pub struct KeyedPrefetcher {
    spec: RelationSpec,
}

impl KeyedPrefetcher {
    /// Create a loader for `spec`.
    pub fn new(spec: RelationSpec) -> Self {
        Self { spec }
    }

    fn back_reference(&self) -> Option<SmolStr> {
        match self.spec.kind {
            RelationKind::ReverseManyToOne
            | RelationKind::ReverseOneToOne
            | RelationKind::ForwardOneToOne => self.spec.remote_relation.clone(),
            _ => None,
        }
    }
}

impl Prefetcher for KeyedPrefetcher {
    fn spec(&self) -> &RelationSpec {
        &self.spec
    }

    fn instance_key(&self, _schema: &Schema, record: &Record) -> Option<RelKey> {
        record.get(&self.spec.local_column).and_then(|v| rel_key(&v))
    }

    fn fetch(
        &self,
        session: &Session,
        instances: &[Record],
        queryset: Option<&QuerySet>,
    ) -> QueryResult<PrefetchBatch> {
        let spec = &self.spec;
        let target = spec.related_model.as_deref().ok_or_else(|| {
            QueryError::internal(format!("{} has no related model", spec.qualified_name()))
        })?;
        let qs = effective_queryset(session, spec, target, queryset)?;
        let lookups = qs.prefetch_lookups().to_vec();

        let keys = distinct_keys(instances.iter().filter_map(|r| r.get(&spec.local_column)));
        if keys.is_empty() {
            trace!(relation = %spec.qualified_name(), "no keys to prefetch");
            return Ok(PrefetchBatch::empty(lookups, self.back_reference()));
        }

        let base = qs.to_query(session.schema())?;
        let mut rows = Vec::new();
        for chunk in keys.chunks(session.max_in_list()) {
            let query = match &spec.join_table {
                Some(join) => base
                    .clone()
                    .through(join.clone(), spec.remote_column.clone(), chunk.to_vec()),
                None => base.clone().constrain(&spec.remote_column, chunk.to_vec()),
            };

            for row in session.execute(&query)? {
                let key = match (&spec.join_table, &row.via) {
                    (Some(_), Some(via)) => rel_key(via),
                    (Some(_), None) => {
                        return Err(QueryError::internal(format!(
                            "join-table row for {} is missing its source key",
                            spec.qualified_name()
                        )));
                    }
                    (None, _) => row.record.get(&spec.remote_column).and_then(|v| rel_key(&v)),
                };
                if let Some(key) = key {
                    rows.push((key, row.record));
                }
            }
        }

        Ok(PrefetchBatch {
            rows,
            lookups,
            back_reference: self.back_reference(),
        })
    }
}
