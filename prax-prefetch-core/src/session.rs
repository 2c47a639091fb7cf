//! The entry point: a schema, a query engine and configuration.
//!
//! ```rust
//! use std::sync::Arc;
//! use prax_prefetch_core::prelude::*;
//!
//! let schema = Arc::new(
//!     Schema::builder()
//!         .model(ModelSchema::new("House").column("address", FieldType::String))
//!         .model(ModelSchema::new("Room").column("name", FieldType::String))
//!         .foreign_key(ForeignKey::new("Room", "house", "House").related_name("rooms"))
//!         .build()
//!         .unwrap(),
//! );
//! let db = Arc::new(InMemoryEngine::new(schema.clone()));
//! let house = db.insert("House", [("address", Value::from("1 Main St"))]).unwrap();
//! db.insert("Room", [("name", Value::from("Kitchen")), ("house_id", house.pk())]).unwrap();
//!
//! let session = Session::new(schema, db.clone());
//! let houses = session
//!     .fetch(&QuerySet::new("House").prefetch_related(["rooms"]))
//!     .unwrap();
//!
//! assert_eq!(db.query_count(), 2);
//! assert_eq!(session.related_many(&houses[0], "rooms").unwrap().len(), 1);
//! assert_eq!(db.query_count(), 2);
//! ```

use std::sync::Arc;

use tracing::{debug, trace};

use crate::attach::attach;
use crate::config::PrefetchConfig;
use crate::engine::QueryEngine;
use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::executor;
use crate::filter::Filter;
use crate::lookup::LookupSpec;
use crate::queryset::{PrefetchQuery, QuerySet, Row};
use crate::record::{Cached, Record};
use crate::relations::Prefetcher;
use crate::schema::{Descriptor, Schema};
use crate::value::Value;

/// Result of reading an attribute.
#[derive(Debug, Clone)]
pub enum Attr {
    /// A column or computed scalar.
    Value(Value),
    /// A single-valued relation.
    One(Option<Record>),
    /// A multi-valued relation.
    Many(Vec<Record>),
}

impl Attr {
    /// Related records, empty for scalars and missing relations.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Value(_) | Self::One(None) => Vec::new(),
            Self::One(Some(record)) => vec![record],
            Self::Many(records) => records,
        }
    }

    /// The scalar, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// Loads records and resolves their relations.
#[derive(Clone)]
pub struct Session {
    schema: Arc<Schema>,
    engine: Arc<dyn QueryEngine>,
    config: PrefetchConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("models", &self.schema.models().count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session with default configuration.
    pub fn new(schema: Arc<Schema>, engine: Arc<dyn QueryEngine>) -> Self {
        Self::with_config(schema, engine, PrefetchConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(schema: Arc<Schema>, engine: Arc<dyn QueryEngine>, config: PrefetchConfig) -> Self {
        Self {
            schema,
            engine,
            config,
        }
    }

    /// The schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The configuration.
    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Largest number of keys bound in one query.
    pub fn max_in_list(&self) -> usize {
        self.config.prefetch.max_in_list.unwrap_or(usize::MAX).max(1)
    }

    /// Queryset over all records of `model`, carrying its default prefetch lookups.
    pub fn all(&self, model: &str) -> QueryResult<QuerySet> {
        let defaults = self.schema.model(model)?.default_prefetch().to_vec();
        Ok(QuerySet::new(model).prefetch_related(defaults))
    }

    /// Run one compiled query.
    pub fn execute(&self, query: &PrefetchQuery) -> QueryResult<Vec<Row>> {
        let (sql, params) = query.to_sql();
        if self.config.debug.log_queries {
            debug!(sql = %sql, params = params.len(), "prefetch query");
        } else {
            trace!(sql = %sql, params = params.len(), "prefetch query");
        }
        self.engine.fetch(query).map_err(|e| {
            if e.context.sql.is_some() { e } else { e.with_sql(sql) }
        })
    }

    /// Load a queryset, then run its prefetch lookups on the result.
    pub fn fetch(&self, queryset: &QuerySet) -> QueryResult<Vec<Record>> {
        let query = queryset.to_query(&self.schema)?;
        let records: Vec<Record> = self.execute(&query)?.into_iter().map(|row| row.record).collect();
        executor::run(
            self,
            &records,
            Some(queryset.model()),
            queryset.prefetch_lookups().to_vec(),
        )?;
        Ok(records)
    }

    /// First record of a queryset, with its prefetches run.
    pub fn first(&self, queryset: &QuerySet) -> QueryResult<Option<Record>> {
        Ok(self.fetch(&queryset.clone().limit(1))?.into_iter().next())
    }

    /// Records of `queryset` whose primary key is in `pks`, keyed by primary key.
    pub fn in_bulk(
        &self,
        queryset: &QuerySet,
        pks: impl IntoIterator<Item = Value>,
    ) -> QueryResult<Vec<(Value, Record)>> {
        let model = self.schema.model(queryset.model())?;
        let pks: Vec<Value> = pks.into_iter().collect();
        if pks.is_empty() {
            return Ok(Vec::new());
        }
        let scoped = queryset
            .clone()
            .r#where(Filter::In(model.pk_field().to_string(), pks));
        Ok(self
            .fetch(&scoped)?
            .into_iter()
            .map(|record| (record.pk(), record))
            .collect())
    }

    /// Run prefetch lookups on records that are already loaded.
    ///
    /// Records may belong to different models. Relations already cached on a
    /// record are reused rather than fetched again.
    pub fn prefetch_related_objects<I, L>(&self, records: &[Record], lookups: I) -> QueryResult<()>
    where
        I: IntoIterator<Item = L>,
        L: Into<LookupSpec>,
    {
        let lookups: Vec<LookupSpec> = lookups.into_iter().map(Into::into).collect();
        let root = records.first().map(|r| r.model());
        let homogeneous = root.filter(|m| records.iter().all(|r| r.model() == *m));
        executor::run(self, records, homogeneous, lookups)
    }

    fn prefetcher(&self, record: &Record, name: &str) -> QueryResult<&Arc<dyn Prefetcher>> {
        self.schema
            .relation(record.model(), name)
            .ok_or_else(|| no_attribute(record.model(), name))
    }

    /// Read a single-valued relation, from the cache when present.
    pub fn related_one(&self, record: &Record, name: &str) -> QueryResult<Option<Record>> {
        let prefetcher = self.prefetcher(record, name)?;
        if !prefetcher.is_single() {
            return Err(QueryError::invalid_lookup(
                name,
                format!("{} is multi-valued; use related_many", prefetcher.spec().qualified_name()),
            ));
        }
        let cached = match record.cached(prefetcher.cache_name()) {
            Some(cached) => cached,
            None => self.load(prefetcher.as_ref(), record)?,
        };
        match cached {
            Cached::One(related) => Ok(Some(related)),
            Cached::Many(records) => Ok(records.into_iter().next()),
            Cached::Missing if prefetcher.missing_is_error(record) => {
                Err(QueryError::does_not_exist(record.model(), name))
            }
            Cached::Missing => Ok(None),
        }
    }

    /// Read a multi-valued relation, from the cache when present.
    pub fn related_many(&self, record: &Record, name: &str) -> QueryResult<Vec<Record>> {
        let prefetcher = self.prefetcher(record, name)?;
        if prefetcher.is_single() {
            return Err(QueryError::invalid_lookup(
                name,
                format!("{} is single-valued; use related_one", prefetcher.spec().qualified_name()),
            ));
        }
        let cached = match record.cached(prefetcher.cache_name()) {
            Some(cached) => cached,
            None => self.load(prefetcher.as_ref(), record)?,
        };
        Ok(cached.records())
    }

    /// Fetch one relation for one record and cache it.
    fn load(&self, prefetcher: &dyn Prefetcher, record: &Record) -> QueryResult<Cached> {
        trace!(relation = %prefetcher.spec().qualified_name(), record = ?record, "live relation read");
        let instances = std::slice::from_ref(record);
        let batch = prefetcher.fetch(self, instances, None)?;
        attach(&self.schema, prefetcher, instances, &batch, None);
        if !batch.lookups.is_empty() {
            let children = batch.records();
            let model = prefetcher.target_model();
            executor::run(self, &children, model, batch.lookups)?;
        }
        record
            .cached(prefetcher.cache_name())
            .ok_or_else(|| QueryError::internal("relation was not cached after loading"))
    }

    /// Read any attribute: column, `to_attr` result, relation or computed value.
    pub fn attr(&self, record: &Record, name: &str) -> QueryResult<Attr> {
        match self.schema.describe(record.model(), name) {
            Descriptor::Relation(prefetcher) if prefetcher.is_single() => {
                self.related_one(record, name).map(Attr::One)
            }
            Descriptor::Relation(_) => self.related_many(record, name).map(Attr::Many),
            Descriptor::Field(_) => Ok(Attr::Value(record.get(name).unwrap_or_default())),
            Descriptor::Computed(computed) => match record.cached(name) {
                Some(cached) => Ok(alias_attr(cached)),
                None => computed.call(self, record),
            },
            Descriptor::Missing => match record.cached(name) {
                Some(cached) => Ok(alias_attr(cached)),
                None => Err(no_attribute(record.model(), name)),
            },
        }
    }
}

pub(crate) fn alias_attr(cached: Cached) -> Attr {
    match cached {
        Cached::One(record) => Attr::One(Some(record)),
        Cached::Many(records) => Attr::Many(records),
        Cached::Missing => Attr::One(None),
    }
}

fn no_attribute(model: &str, name: &str) -> QueryError {
    QueryError::new(
        ErrorCode::AttributeNotFound,
        format!("'{}' object has no attribute '{}'", model, name),
    )
    .with_model(model)
    .with_field(name)
}
