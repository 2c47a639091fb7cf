//! Distribute fetched rows onto the parents they were fetched for.

use std::collections::HashMap;

use smol_str::SmolStr;
use tracing::trace;

use crate::record::{Cached, Record};
use crate::relations::{PrefetchBatch, Prefetcher};
use crate::schema::Schema;
use crate::value::RelKey;

/// Store each parent's related rows in its cache.
///
/// Rows go under `to_attr` when given, else under the relation's cache name.
/// Single-valued relations store their first match, or [`Cached::Missing`].
/// Every parent gets an entry, including parents with no related rows.
pub(crate) fn attach(
    schema: &Schema,
    prefetcher: &dyn Prefetcher,
    instances: &[Record],
    batch: &PrefetchBatch,
    to_attr: Option<&SmolStr>,
) {
    let mut by_key: HashMap<&RelKey, Vec<Record>> = HashMap::new();
    for (key, record) in &batch.rows {
        by_key.entry(key).or_default().push(record.clone());
    }

    let cache_key = to_attr
        .cloned()
        .unwrap_or_else(|| SmolStr::new(prefetcher.cache_name()));

    for instance in instances {
        let related = prefetcher
            .instance_key(schema, instance)
            .and_then(|key| by_key.get(&key).cloned())
            .unwrap_or_default();

        if let Some(back) = &batch.back_reference {
            for child in &related {
                child.set_back_reference(back.clone(), instance);
            }
        }

        let value = if prefetcher.is_single() {
            match related.into_iter().next() {
                Some(record) => Cached::One(record),
                None => Cached::Missing,
            }
        } else {
            Cached::Many(related)
        };
        instance.set_cached(cache_key.clone(), value);
    }

    trace!(
        relation = %prefetcher.spec().qualified_name(),
        cache = %cache_key,
        parents = instances.len(),
        rows = batch.rows.len(),
        "attached prefetched rows"
    );
}
