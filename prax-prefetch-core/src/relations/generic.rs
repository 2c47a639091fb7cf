//! Loaders for generic (content-type keyed) relations.

use indexmap::IndexMap;
use smallvec::smallvec;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::filter::Filter;
use crate::queryset::QuerySet;
use crate::record::Record;
use crate::schema::Schema;
use crate::session::Session;
use crate::value::{KeyPart, RelKey, Value, rel_key};

use super::loader::{PrefetchBatch, Prefetcher, distinct_keys, effective_queryset};
use super::spec::{GenericKeySpec, RelationSpec};

fn generic_columns(spec: &RelationSpec) -> QueryResult<&GenericKeySpec> {
    spec.generic.as_ref().ok_or_else(|| {
        QueryError::internal(format!("{} has no generic key columns", spec.qualified_name()))
    })
}

/// Loader for a generic foreign key: a polymorphic pointer stored as a
/// (content type, object id) column pair.
///
/// Instances are grouped by content type and each group is fetched from its
/// own model, with the object ids converted to that model's key type.
#[derive(Debug, Clone)]
pub struct GenericForeignKeyPrefetcher {
    spec: RelationSpec,
}

impl GenericForeignKeyPrefetcher {
    /// Create a loader for `spec`.
    pub fn new(spec: RelationSpec) -> Self {
        Self { spec }
    }

    /// Content type and coerced object id of `record`.
    fn pointer(&self, schema: &Schema, record: &Record) -> Option<(SmolStr, Value)> {
        let columns = self.spec.generic.as_ref()?;
        let ct = record.get(&columns.ct_field)?;
        let ct = SmolStr::new(ct.as_str()?);
        let model = schema.get_model(&ct)?;
        let id = model.pk_type().coerce(&record.get(&columns.id_field)?);
        (!id.is_null()).then_some((ct, id))
    }
}

impl Prefetcher for GenericForeignKeyPrefetcher {
    fn spec(&self) -> &RelationSpec {
        &self.spec
    }

    fn instance_key(&self, schema: &Schema, record: &Record) -> Option<RelKey> {
        let (ct, id) = self.pointer(schema, record)?;
        Some(smallvec![KeyPart::Str(ct), id.key_part()?])
    }

    fn fetch(
        &self,
        session: &Session,
        instances: &[Record],
        queryset: Option<&QuerySet>,
    ) -> QueryResult<PrefetchBatch> {
        if queryset.is_some() {
            return Err(QueryError::new(
                ErrorCode::QuerySetMismatch,
                format!(
                    "Custom queryset can't be used for the generic foreign key {}.",
                    self.spec.qualified_name()
                ),
            )
            .with_lookup(self.spec.name.as_str()));
        }
        let schema = session.schema();
        let columns = generic_columns(&self.spec)?;

        let mut by_type: IndexMap<SmolStr, Vec<Value>> = IndexMap::new();
        for record in instances {
            if let Some((ct, id)) = self.pointer(schema, record) {
                by_type.entry(ct).or_default().push(id);
            } else if let Some(ct) = record.get(&columns.ct_field).filter(|v| !v.is_null()) {
                if ct.as_str().and_then(|s| schema.get_model(s)).is_none() {
                    warn!(content_type = %ct, relation = %self.spec.qualified_name(), "unknown content type");
                }
            }
        }

        let mut rows = Vec::new();
        for (ct, ids) in by_type {
            let model = schema.model(&ct)?;
            let ids = distinct_keys(ids);
            debug!(content_type = %ct, ids = ids.len(), "fetching generic targets");

            let base = QuerySet::new(ct.clone()).to_query(schema)?;
            for chunk in ids.chunks(session.max_in_list()) {
                let query = base.clone().constrain(model.pk_field(), chunk.to_vec());
                for row in session.execute(&query)? {
                    if let Some(pk) = row.record.pk().key_part() {
                        rows.push((smallvec![KeyPart::Str(ct.clone()), pk], row.record));
                    }
                }
            }
        }

        Ok(PrefetchBatch {
            rows,
            lookups: Vec::new(),
            back_reference: None,
        })
    }

    fn missing_is_error(&self, _record: &Record) -> bool {
        false
    }
}

/// Loader for the reverse side of a generic foreign key, e.g. all tags
/// pointing at a bookmark.
#[derive(Debug, Clone)]
pub struct GenericRelationPrefetcher {
    spec: RelationSpec,
}

impl GenericRelationPrefetcher {
    /// Create a loader for `spec`.
    pub fn new(spec: RelationSpec) -> Self {
        Self { spec }
    }
}

impl Prefetcher for GenericRelationPrefetcher {
    fn spec(&self) -> &RelationSpec {
        &self.spec
    }

    fn instance_key(&self, _schema: &Schema, record: &Record) -> Option<RelKey> {
        rel_key(&record.pk())
    }

    fn fetch(
        &self,
        session: &Session,
        instances: &[Record],
        queryset: Option<&QuerySet>,
    ) -> QueryResult<PrefetchBatch> {
        let spec = &self.spec;
        let schema = session.schema();
        let columns = generic_columns(spec)?;
        let target = spec.related_model.as_deref().ok_or_else(|| {
            QueryError::internal(format!("{} has no related model", spec.qualified_name()))
        })?;
        let qs = effective_queryset(session, spec, target, queryset)?;
        let lookups = qs.prefetch_lookups().to_vec();

        let owner = schema.model(&spec.model)?;
        let id_type = schema
            .model(target)?
            .field(&columns.id_field)
            .map(|f| f.ty)
            .unwrap_or(owner.pk_type());

        let keys = distinct_keys(instances.iter().map(|r| id_type.coerce(&r.pk())));
        if keys.is_empty() {
            return Ok(PrefetchBatch::empty(lookups, None));
        }

        let base = qs
            .to_query(schema)?
            .and_where(Filter::eq(columns.ct_field.as_str(), spec.model.as_str()));
        let mut rows = Vec::new();
        for chunk in keys.chunks(session.max_in_list()) {
            let query = base.clone().constrain(&columns.id_field, chunk.to_vec());
            for row in session.execute(&query)? {
                let key = row
                    .record
                    .get(&columns.id_field)
                    .map(|id| owner.pk_type().coerce(&id))
                    .and_then(|id| rel_key(&id));
                if let Some(key) = key {
                    rows.push((key, row.record));
                }
            }
        }

        Ok(PrefetchBatch {
            rows,
            lookups,
            back_reference: None,
        })
    }
}
