//! An in-memory [`QueryEngine`] that evaluates compiled queries against
//! tables held in process and records every SQL statement it is asked to run.
//!
//! Useful for tests and examples that need to count queries:
//!
//! ```rust
//! use std::sync::Arc;
//! use prax_prefetch_core::prelude::*;
//!
//! let schema = Arc::new(
//!     Schema::builder()
//!         .model(ModelSchema::new("Book").column("title", FieldType::String))
//!         .model(ModelSchema::new("Author").column("name", FieldType::String))
//!         .many_to_many(ManyToMany::new("Book", "authors", "Author").related_name("books"))
//!         .build()
//!         .unwrap(),
//! );
//! let db = InMemoryEngine::new(schema);
//! let book = db.insert("Book", [("title", Value::from("Poems"))]).unwrap();
//! let author = db.insert("Author", [("name", Value::from("Charlotte"))]).unwrap();
//! db.link("Book", "authors", &book, &author).unwrap();
//!
//! assert_eq!(db.join_rows("book_authors"), 1);
//! assert_eq!(db.query_count(), 0);
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::engine::QueryEngine;
use crate::error::{QueryError, QueryResult};
use crate::lookup::LOOKUP_SEP;
use crate::queryset::{PrefetchQuery, Row};
use crate::record::{Cached, Record};
use crate::relations::RelationKind;
use crate::schema::{ModelSchema, Schema};
use crate::types::{NullsOrder, OrderBy, SortOrder};
use crate::value::{FieldType, Value};

type Columns = IndexMap<SmolStr, Value>;

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<SmolStr, Vec<Columns>>,
    links: HashMap<SmolStr, Vec<Columns>>,
    sequences: HashMap<SmolStr, i64>,
    log: Vec<String>,
}

/// In-memory tables plus a log of executed SQL.
#[derive(Debug)]
pub struct InMemoryEngine {
    schema: Arc<Schema>,
    tables: RwLock<Tables>,
}

fn same_key(a: &Value, b: &Value) -> bool {
    match (a.key_part(), b.key_part()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl InMemoryEngine {
    /// Create an empty store for `schema`.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// The schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Insert a row and return a fresh record for it.
    ///
    /// Undeclared columns are rejected; omitted ones are null. An integer
    /// primary key left null is assigned the next value of the model's sequence.
    pub fn insert<K>(&self, model: &str, values: impl IntoIterator<Item = (K, Value)>) -> QueryResult<Record>
    where
        K: Into<SmolStr>,
    {
        let schema = self.schema.model(model)?;
        let mut row: Columns = schema.fields().map(|f| (f.name.clone(), Value::Null)).collect();
        for (column, value) in values {
            let column = column.into();
            let Some(field) = schema.field(&column) else {
                return Err(QueryError::database(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    column,
                    schema.table()
                )));
            };
            row.insert(column, field.ty.coerce(&value));
        }

        let mut tables = self.tables.write();
        let sequence = tables.sequences.entry(schema.name().clone()).or_insert(0);
        let pk = schema.pk_field();
        match row.get(pk) {
            Some(Value::Int(id)) => *sequence = (*sequence).max(*id),
            Some(Value::Null) | None if schema.pk_type() == FieldType::Int => {
                *sequence += 1;
                row.insert(pk.clone(), Value::Int(*sequence));
            }
            Some(Value::Null) | None => {
                return Err(QueryError::database(format!(
                    "null value in column \"{}\" of relation \"{}\"",
                    pk,
                    schema.table()
                )));
            }
            Some(_) => {}
        }

        let table = tables.rows.entry(schema.name().clone()).or_default();
        if let Some(key) = row.get(pk) {
            if table.iter().any(|r| r.get(pk).is_some_and(|v| same_key(v, key))) {
                return Err(QueryError::database(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    schema.table()
                )));
            }
        }
        table.push(row.clone());
        Ok(hydrate(schema, &row))
    }

    /// Change one column of a stored row, and on `record` itself.
    pub fn update(&self, record: &Record, column: &str, value: Value) -> QueryResult<()> {
        let schema = self.schema.model(record.model())?;
        let ty = schema
            .field(column)
            .map(|f| f.ty)
            .ok_or_else(|| QueryError::database(format!("column \"{}\" does not exist", column)))?;
        let value = ty.coerce(&value);
        let pk = record.pk();

        let mut tables = self.tables.write();
        let row = tables
            .rows
            .get_mut(schema.name())
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get(schema.pk_field()).is_some_and(|v| same_key(v, &pk)))
            })
            .ok_or_else(|| QueryError::database(format!("{} {} is not stored", record.model(), pk)))?;
        row.insert(SmolStr::new(column), value.clone());
        record.set(column, value);
        Ok(())
    }

    /// Delete the row with primary key `pk`. Returns whether a row was removed.
    pub fn delete(&self, model: &str, pk: &Value) -> QueryResult<bool> {
        let schema = self.schema.model(model)?;
        let mut tables = self.tables.write();
        let Some(rows) = tables.rows.get_mut(schema.name()) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| !r.get(schema.pk_field()).is_some_and(|v| same_key(v, pk)));
        Ok(rows.len() != before)
    }

    /// Add a join-table row linking `from` to `to` through relation `model.relation`.
    pub fn link(&self, model: &str, relation: &str, from: &Record, to: &Record) -> QueryResult<()> {
        let spec = self
            .schema
            .relation(model, relation)
            .map(|p| p.spec())
            .ok_or_else(|| QueryError::configuration(format!("{} has no relation '{}'", model, relation)))?;
        let join = match (&spec.join_table, spec.kind) {
            (Some(join), RelationKind::ManyToMany) => join,
            _ => {
                return Err(QueryError::configuration(format!(
                    "{} is not a many-to-many relation",
                    spec.qualified_name()
                )));
            }
        };

        let source = from.get(&spec.local_column).unwrap_or_default();
        let target = to.get(&spec.remote_column).unwrap_or_default();
        if source.is_null() || target.is_null() {
            return Err(QueryError::database(format!(
                "cannot link {} with a null key",
                spec.qualified_name()
            )));
        }

        let mut link = Columns::new();
        link.insert(join.source_column.clone(), source);
        link.insert(join.target_column.clone(), target);
        self.tables
            .write()
            .links
            .entry(join.table_name.clone())
            .or_default()
            .push(link);
        Ok(())
    }

    /// Number of rows in join table `table`.
    pub fn join_rows(&self, table: &str) -> usize {
        self.tables.read().links.get(table).map_or(0, Vec::len)
    }

    /// Number of queries run since creation or the last reset.
    pub fn query_count(&self) -> usize {
        self.tables.read().log.len()
    }

    /// SQL of the queries run since creation or the last reset.
    pub fn queries(&self) -> Vec<String> {
        self.tables.read().log.clone()
    }

    /// Clear the query log.
    pub fn reset_queries(&self) {
        self.tables.write().log.clear();
    }

    fn select_related(
        &self,
        tables: &Tables,
        record: &Record,
        segments: &[&str],
    ) -> QueryResult<()> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(());
        };
        if let Some(cached) = record.cached(first) {
            if let Cached::One(related) = cached {
                self.select_related(tables, &related, rest)?;
            }
            return Ok(());
        }

        let spec = self
            .schema
            .relation(record.model(), first)
            .map(|p| p.spec())
            .ok_or_else(|| QueryError::internal(format!("{} has no relation '{}'", record.model(), first)))?;
        let target = spec
            .related_model
            .as_deref()
            .ok_or_else(|| QueryError::internal(format!("{} has no related model", spec.qualified_name())))?;
        let target_schema = self.schema.model(target)?;

        let key = record.get(&spec.local_column).unwrap_or_default();
        let row = tables.rows.get(target).and_then(|rows| {
            rows.iter()
                .find(|r| r.get(&spec.remote_column).is_some_and(|v| same_key(v, &key)))
        });

        match row {
            Some(row) => {
                let related = hydrate(target_schema, row);
                if let (RelationKind::ReverseOneToOne | RelationKind::ForwardOneToOne, Some(back)) =
                    (spec.kind, &spec.remote_relation)
                {
                    related.set_back_reference(back.clone(), record);
                }
                record.set_cached(spec.name.clone(), Cached::One(related.clone()));
                self.select_related(tables, &related, rest)
            }
            None => {
                record.set_cached(spec.name.clone(), Cached::Missing);
                Ok(())
            }
        }
    }
}

fn hydrate(schema: &ModelSchema, row: &Columns) -> Record {
    Record::new(schema.name().clone(), schema.pk_field().clone(), row.clone())
}

fn compare(a: &Record, b: &Record, order: &OrderBy) -> Ordering {
    for field in order.fields() {
        let left = a.get(&field.column).unwrap_or_default();
        let right = b.get(&field.column).unwrap_or_default();
        let ordering = match (left.is_null(), right.is_null(), field.nulls) {
            (true, false, Some(NullsOrder::Last)) => Ordering::Greater,
            (false, true, Some(NullsOrder::Last)) => Ordering::Less,
            (true, false, Some(NullsOrder::First)) => Ordering::Less,
            (false, true, Some(NullsOrder::First)) => Ordering::Greater,
            _ => match field.order {
                SortOrder::Asc => left.sort_cmp(&right),
                SortOrder::Desc => right.sort_cmp(&left),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl QueryEngine for InMemoryEngine {
    fn fetch(&self, query: &PrefetchQuery) -> QueryResult<Vec<Row>> {
        let (sql, _) = query.to_sql();
        self.tables.write().log.push(sql);

        let schema = self.schema.model(&query.model)?;
        let tables = self.tables.read();
        let empty = Vec::new();
        let source = tables.rows.get(&query.model).unwrap_or(&empty);

        let mut rows: Vec<Row> = match &query.through {
            None => source
                .iter()
                .map(|columns| hydrate(schema, columns))
                .filter(|record| query.filter.matches(record))
                .map(Row::new)
                .collect(),
            Some(through) => {
                let links = tables.links.get(&through.join.table_name).unwrap_or(&empty);
                let mut rows = Vec::new();
                for link in links {
                    let from = link.get(&through.join.source_column).cloned().unwrap_or_default();
                    if !through.keys.iter().any(|k| same_key(k, &from)) {
                        continue;
                    }
                    let to = link.get(&through.join.target_column).cloned().unwrap_or_default();
                    let target = source.iter().find(|columns| {
                        columns
                            .get(&through.target_column)
                            .is_some_and(|v| same_key(v, &to))
                    });
                    if let Some(columns) = target {
                        let record = hydrate(schema, columns);
                        if query.filter.matches(&record) {
                            rows.push(Row::via(record, from));
                        }
                    }
                }
                rows
            }
        };

        rows.sort_by(|a, b| compare(&a.record, &b.record, &query.order_by));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        for join in &query.select_related {
            let segments: Vec<&str> = join.path.split(LOOKUP_SEP).collect();
            for row in &rows {
                self.select_related(&tables, &row.record, &segments)?;
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::queryset::QuerySet;
    use crate::relations::{ForeignKey, ManyToMany};

    fn engine() -> InMemoryEngine {
        let schema = Schema::builder()
            .model(ModelSchema::new("House").column("address", FieldType::String))
            .model(ModelSchema::new("Room").column("name", FieldType::String))
            .model(ModelSchema::new("Person").column("name", FieldType::String))
            .foreign_key(ForeignKey::new("Room", "house", "House").related_name("rooms"))
            .foreign_key(ForeignKey::one_to_one("House", "main_room", "Room").nullable().related_name("main_room_of"))
            .many_to_many(ManyToMany::new("Person", "houses", "House").related_name("occupants"))
            .build()
            .unwrap();
        InMemoryEngine::new(Arc::new(schema))
    }

    #[test]
    fn test_insert_assigns_sequence() {
        let db = engine();
        let a = db.insert("House", [("address", Value::from("A"))]).unwrap();
        let b = db.insert("House", [("id", Value::Int(10)), ("address", Value::from("B"))]).unwrap();
        let c = db.insert("House", [("address", Value::from("C"))]).unwrap();
        assert_eq!(a.pk(), Value::Int(1));
        assert_eq!(b.pk(), Value::Int(10));
        assert_eq!(c.pk(), Value::Int(11));
        assert_eq!(c.get("main_room_id"), Some(Value::Null));
    }

    #[test]
    fn test_insert_rejects_unknown_column() {
        let db = engine();
        let err = db.insert("House", [("colour", Value::from("red"))]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Database);
    }

    #[test]
    fn test_filter_order_and_log() {
        let db = engine();
        for address in ["b", "a", "c"] {
            db.insert("House", [("address", Value::from(address))]).unwrap();
        }
        let query = QuerySet::new("House")
            .r#where(Filter::NotEquals("address".into(), Value::from("c")))
            .order_by(crate::types::OrderByField::asc("address"))
            .to_query(db.schema())
            .unwrap();
        let rows = db.fetch(&query).unwrap();

        let addresses: Vec<Value> = rows.iter().filter_map(|r| r.record.get("address")).collect();
        assert_eq!(addresses, vec![Value::from("a"), Value::from("b")]);
        assert_eq!(db.query_count(), 1);
        db.reset_queries();
        assert!(db.queries().is_empty());
    }

    #[test]
    fn test_through_rows_carry_source_key() {
        let db = engine();
        let person = db.insert("Person", [("name", Value::from("Joe"))]).unwrap();
        let house = db.insert("House", [("address", Value::from("A"))]).unwrap();
        db.link("Person", "houses", &person, &house).unwrap();

        let spec = db.schema().relation("Person", "houses").unwrap().spec().clone();
        let query = QuerySet::new("House")
            .to_query(db.schema())
            .unwrap()
            .through(spec.join_table.unwrap(), spec.remote_column, vec![person.pk()]);
        let rows = db.fetch(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].via, Some(person.pk()));
    }

    #[test]
    fn test_select_related_populates_cache() {
        let db = engine();
        let house = db.insert("House", [("address", Value::from("A"))]).unwrap();
        let room = db.insert("Room", [("name", Value::from("Hall")), ("house_id", house.pk())]).unwrap();
        db.update(&house, "main_room_id", room.pk()).unwrap();
        db.insert("House", [("address", Value::from("B"))]).unwrap();

        let query = QuerySet::new("House")
            .select_related(["main_room", "main_room__house"])
            .to_query(db.schema())
            .unwrap();
        let rows = db.fetch(&query).unwrap();

        let main_room = rows[0].record.cached("main_room").unwrap().records();
        assert_eq!(main_room, vec![room]);
        assert!(main_room[0].is_cached("house"));
        assert!(matches!(rows[1].record.cached("main_room"), Some(Cached::Missing)));
    }

    #[test]
    fn test_link_requires_many_to_many() {
        let db = engine();
        let house = db.insert("House", [("address", Value::from("A"))]).unwrap();
        let room = db.insert("Room", [("name", Value::from("Hall")), ("house_id", house.pk())]).unwrap();
        assert!(db.link("Room", "house", &room, &house).is_err());
        assert!(db.delete("Room", &room.pk()).unwrap());
        assert!(!db.delete("Room", &room.pk()).unwrap());
    }
}
