//! Querysets and the concrete queries they compile to.
//!
//! A [`QuerySet`] is the caller-facing description of which records to load:
//! a model, a filter, an ordering, `select_related` joins and nested prefetch
//! lookups. [`QuerySet::to_query`] resolves it against a [`Schema`] into a
//! [`PrefetchQuery`], which the prefetch machinery narrows to a key set with
//! [`PrefetchQuery::constrain`] or [`PrefetchQuery::through`] before handing it
//! to a [`QueryEngine`](crate::QueryEngine).

use std::fmt::Write;

use smol_str::SmolStr;

use crate::error::{QueryError, QueryResult};
use crate::filter::Filter;
use crate::lookup::{LOOKUP_SEP, LookupSpec};
use crate::record::Record;
use crate::relations::{JoinTableSpec, RelationKind};
use crate::schema::Schema;
use crate::types::{OrderBy, OrderByField};
use crate::value::Value;

/// A lazily described set of records of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySet {
    model: SmolStr,
    filter: Filter,
    order_by: Option<OrderBy>,
    select_related: Vec<SmolStr>,
    prefetch: Vec<LookupSpec>,
    limit: Option<usize>,
}

impl QuerySet {
    /// All records of `model`.
    pub fn new(model: impl Into<SmolStr>) -> Self {
        Self {
            model: model.into(),
            filter: Filter::None,
            order_by: None,
            select_related: Vec::new(),
            prefetch: Vec::new(),
            limit: None,
        }
    }

    /// Model the queryset loads.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Add a filter, AND-ed with any existing one.
    pub fn r#where(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = std::mem::take(&mut self.filter).and_then(filter.into());
        self
    }

    /// Replace the ordering. An empty ordering falls back to the model's.
    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    /// Load single-valued relations in the same query.
    pub fn select_related<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        for path in paths {
            let path = path.into();
            if !self.select_related.contains(&path) {
                self.select_related.push(path);
            }
        }
        self
    }

    /// Append prefetch lookups to run after the records load.
    pub fn prefetch_related<I, L>(mut self, lookups: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LookupSpec>,
    {
        self.prefetch.extend(lookups.into_iter().map(Into::into));
        self
    }

    /// Drop all prefetch lookups, including the model's defaults.
    pub fn clear_prefetch_related(mut self) -> Self {
        self.prefetch.clear();
        self
    }

    /// Prefetch lookups in registration order.
    pub fn prefetch_lookups(&self) -> &[LookupSpec] {
        &self.prefetch
    }

    /// The filter.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Cap the number of rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compile against `schema`.
    pub fn to_query(&self, schema: &Schema) -> QueryResult<PrefetchQuery> {
        let model = schema.model(&self.model)?;

        let order_by = match &self.order_by {
            Some(order) if !order.is_empty() => order.clone(),
            _ if !model.ordering().is_empty() => model.ordering().clone(),
            _ => OrderBy::Field(OrderByField::asc(model.pk_field().to_string())),
        };

        let mut joins: Vec<SelectJoin> = Vec::new();
        for path in &self.select_related {
            resolve_select(schema, &self.model, path, &mut joins)?;
        }

        Ok(PrefetchQuery {
            model: self.model.clone(),
            table: model.table().clone(),
            filter: self.filter.clone(),
            order_by,
            select_related: joins,
            through: None,
            limit: self.limit,
        })
    }
}

fn resolve_select(
    schema: &Schema,
    root: &SmolStr,
    path: &str,
    joins: &mut Vec<SelectJoin>,
) -> QueryResult<()> {
    let mut owner = root.clone();
    let mut owner_alias = schema.model(root)?.table().clone();
    let mut prefix = String::new();

    for segment in path.split(LOOKUP_SEP) {
        if !prefix.is_empty() {
            prefix.push_str(LOOKUP_SEP);
        }
        prefix.push_str(segment);

        let spec = schema
            .relation(&owner, segment)
            .map(|p| p.spec())
            .ok_or_else(|| {
                QueryError::invalid_lookup(
                    path,
                    format!("'{}' is not a relation on {}", segment, owner),
                )
            })?;

        let target = match (&spec.related_model, spec.kind) {
            (
                Some(target),
                RelationKind::ForwardManyToOne
                | RelationKind::ForwardOneToOne
                | RelationKind::ReverseOneToOne,
            ) => target.clone(),
            _ => {
                return Err(QueryError::invalid_lookup(
                    path,
                    format!("select_related cannot follow multi-valued or generic relation '{}'", segment),
                ));
            }
        };

        let alias = SmolStr::new(format!("T{}", joins.len() + 1));
        if !joins.iter().any(|j| j.path == prefix) {
            let table = schema.model(&target)?.table().clone();
            joins.push(SelectJoin {
                path: prefix.clone(),
                owner: owner.clone(),
                relation: spec.name.clone(),
                table,
                alias: alias.clone(),
                on: format!(
                    "{}.{} = {}.{}",
                    owner_alias, spec.local_column, alias, spec.remote_column
                ),
            });
            owner_alias = alias;
        } else if let Some(existing) = joins.iter().find(|j| j.path == prefix) {
            owner_alias = existing.alias.clone();
        }
        owner = target;
    }
    Ok(())
}

/// A single-valued relation joined into the main query.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectJoin {
    /// Full path from the root model, e.g. `house__owner`.
    pub path: String,
    /// Model owning the relation.
    pub owner: SmolStr,
    /// Relation attribute on `owner`.
    pub relation: SmolStr,
    /// Joined table.
    pub table: SmolStr,
    /// Table alias.
    pub alias: SmolStr,
    /// Join condition.
    pub on: String,
}

/// Join-table restriction of a many-to-many prefetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Through {
    /// Join table, oriented from the parent side.
    pub join: JoinTableSpec,
    /// Column of the queried model that the join table's target column references.
    pub target_column: SmolStr,
    /// Parent keys matched against the join table's source column.
    pub keys: Vec<Value>,
}

/// A compiled query.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchQuery {
    /// Model being loaded.
    pub model: SmolStr,
    /// Its table.
    pub table: SmolStr,
    /// Row filter.
    pub filter: Filter,
    /// Effective ordering.
    pub order_by: OrderBy,
    /// Joined single-valued relations.
    pub select_related: Vec<SelectJoin>,
    /// Join-table restriction for many-to-many prefetches.
    pub through: Option<Through>,
    /// Row cap.
    pub limit: Option<usize>,
}

impl PrefetchQuery {
    /// Restrict to rows whose `column` is one of `keys`.
    pub fn constrain(mut self, column: &str, keys: Vec<Value>) -> Self {
        self.filter = Filter::In(column.to_string(), keys).and_then(std::mem::take(&mut self.filter));
        self
    }

    /// Restrict to rows linked through `join` from one of `keys`.
    pub fn through(mut self, join: JoinTableSpec, target_column: SmolStr, keys: Vec<Value>) -> Self {
        self.through = Some(Through {
            join,
            target_column,
            keys,
        });
        self
    }

    /// AND an extra filter onto the query.
    pub fn and_where(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and_then(filter);
        self
    }

    /// Render as parameterized SQL.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::with_capacity(128);
        let mut params = Vec::new();

        let _ = write!(sql, "SELECT {}.*", self.table);
        for join in &self.select_related {
            let _ = write!(sql, ", {}.*", join.alias);
        }
        if let Some(through) = &self.through {
            let _ = write!(
                sql,
                ", {}.{} AS _prefetch_related_val",
                through.join.table_name, through.join.source_column
            );
        }
        let _ = write!(sql, " FROM {}", self.table);
        if let Some(through) = &self.through {
            let _ = write!(
                sql,
                " INNER JOIN {jt} ON ({table}.{col} = {jt}.{target})",
                jt = through.join.table_name,
                table = self.table,
                col = through.target_column,
                target = through.join.target_column,
            );
        }
        for join in &self.select_related {
            let _ = write!(sql, " LEFT OUTER JOIN {} {} ON ({})", join.table, join.alias, join.on);
        }

        let mut clauses = Vec::new();
        if let Some(through) = &self.through {
            let placeholders: Vec<String> = (1..=through.keys.len()).map(|i| format!("${}", i)).collect();
            clauses.push(format!(
                "{}.{} IN ({})",
                through.join.table_name,
                through.join.source_column,
                placeholders.join(", ")
            ));
            params.extend(through.keys.iter().cloned());
        }
        if !self.filter.is_none() {
            let (clause, filter_params) = self.filter.to_sql(params.len());
            clauses.push(clause);
            params.extend(filter_params);
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            self.order_by.write_sql(&mut sql);
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {}", limit);
        }

        (sql, params)
    }
}

/// A row returned by a [`QueryEngine`](crate::QueryEngine).
#[derive(Debug, Clone)]
pub struct Row {
    /// The hydrated record.
    pub record: Record,
    /// Join-table source key, set for many-to-many prefetches.
    pub via: Option<Value>,
}

impl Row {
    /// A plain row.
    pub fn new(record: Record) -> Self {
        Self { record, via: None }
    }

    /// A row reached through a join table.
    pub fn via(record: Record, key: Value) -> Self {
        Self {
            record,
            via: Some(key),
        }
    }
}
