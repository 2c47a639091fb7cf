//! The query collaborator behind prefetch resolution.

use crate::error::QueryResult;
use crate::queryset::{PrefetchQuery, Row};

/// Executes batched relation queries and returns hydrated rows.
///
/// Implementations must return a fresh [`Record`](crate::Record) per row so
/// that each query result owns its own prefetch cache, and must fill
/// [`Row::via`] with the join-table key when [`PrefetchQuery::through`] is set.
/// Timeouts and cancellation are the implementation's concern.
pub trait QueryEngine: Send + Sync {
    /// Run one query.
    fn fetch(&self, query: &PrefetchQuery) -> QueryResult<Vec<Row>>;
}

impl<E: QueryEngine + ?Sized> QueryEngine for std::sync::Arc<E> {
    fn fetch(&self, query: &PrefetchQuery) -> QueryResult<Vec<Row>> {
        (**self).fetch(query)
    }
}
