//! Prefetch lookup resolution.
//!
//! Each lookup is walked level by level from the root records. At every level
//! the current records are grouped by model; for each group the segment is
//! resolved to a relation (fetched in one batched query for all records not
//! already holding it), or to a plain attribute (traversed record by record).
//! The records produced by a level become the parents of the next one.

use std::collections::HashSet;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::attach::attach;
use crate::error::{QueryError, QueryResult};
use crate::lookup::LookupSpec;
use crate::record::Record;
use crate::relations::Prefetcher;
use crate::schema::{Descriptor, Schema};
use crate::session::{Attr, Session, alias_attr};
use crate::tree::{LookupTree, NodeId};

/// Resolve `lookups` over `instances`.
///
/// `root_model` names the model of the instances when known; it lets lookups
/// over an empty result still be checked against the schema.
pub(crate) fn run(
    session: &Session,
    instances: &[Record],
    root_model: Option<&str>,
    lookups: Vec<LookupSpec>,
) -> QueryResult<()> {
    if lookups.is_empty() {
        return Ok(());
    }

    let mut tree = LookupTree::new(lookups)?;
    let roots = distinct(instances.iter().cloned());

    while let Some(spec) = tree.pop() {
        if tree.already_done(&spec)? {
            trace!(lookup = %spec.prefetch_to(), "lookup already resolved");
            continue;
        }
        resolve(session, &mut tree, &roots, root_model, &spec).map_err(|e| {
            e.with_context(format!("Resolving prefetch lookup '{}'", spec.prefetch_through()))
        })?;
    }
    Ok(())
}

fn distinct(records: impl IntoIterator<Item = Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.identity()))
        .collect()
}

fn by_model(records: &[Record]) -> IndexMap<SmolStr, Vec<Record>> {
    let mut groups: IndexMap<SmolStr, Vec<Record>> = IndexMap::new();
    for record in records {
        groups
            .entry(SmolStr::new(record.model()))
            .or_default()
            .push(record.clone());
    }
    groups
}

fn common_model(records: &[Record]) -> Option<SmolStr> {
    let first = records.first()?.model();
    records
        .iter()
        .all(|r| r.model() == first)
        .then(|| SmolStr::new(first))
}

/// Model reached by following `attr` from `model`, when the schema knows it.
fn static_target(schema: &Schema, model: &str, attr: &str) -> Option<SmolStr> {
    match schema.describe(model, attr) {
        Descriptor::Relation(prefetcher) => prefetcher.target_model().map(SmolStr::new),
        Descriptor::Computed(computed) => computed.target().map(SmolStr::new),
        Descriptor::Field(_) | Descriptor::Missing => None,
    }
}

fn check_to_attr(schema: &Schema, model: &str, to_attr: &str) -> QueryResult<()> {
    if schema.model(model)?.has_field(to_attr) {
        return Err(QueryError::to_attr_conflict(model, to_attr));
    }
    Ok(())
}

/// Whether `record` already holds the values this level would store.
/// With a `to_attr` that is the alias, whatever the relation caches itself.
fn is_fetched(record: &Record, prefetcher: &dyn Prefetcher, to_attr: &str, as_attr: bool) -> bool {
    if as_attr {
        record.is_cached(to_attr)
    } else {
        record.is_cached(prefetcher.cache_name())
    }
}

/// Read `attr` for traversal: cached values first, then a live read.
/// Missing single-valued relations yield nothing.
fn traverse(session: &Session, record: &Record, attr: &str) -> QueryResult<Option<Attr>> {
    if let Some(cached) = record.cached(attr) {
        return Ok(Some(alias_attr(cached)));
    }
    match session.attr(record, attr) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_does_not_exist() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check one level of a lookup against the schema alone, for a level with no
/// records. Returns the model the next level starts from, if known.
fn validate_level(
    schema: &Schema,
    tree: &LookupTree,
    spec: &LookupSpec,
    level: usize,
    node: NodeId,
    model: Option<&str>,
) -> QueryResult<Option<SmolStr>> {
    let Some(model) = model else {
        return Ok(None);
    };
    let attr = &spec.through_segments()[level];
    let (to_attr, as_attr) = spec.current_to_attr(level);

    match schema.describe(model, attr) {
        Descriptor::Relation(prefetcher) => {
            if as_attr {
                check_to_attr(schema, model, to_attr)?;
            }
            Ok(prefetcher.target_model().map(SmolStr::new))
        }
        Descriptor::Missing if tree.is_alias(node) => Ok(None),
        Descriptor::Missing => Err(QueryError::attribute_not_found(
            model,
            attr.as_str(),
            spec.prefetch_through(),
        )),
        Descriptor::Field(_) | Descriptor::Computed(_) if spec.is_leaf(level) => Err(
            QueryError::not_prefetchable(spec.prefetch_through(), attr.as_str()),
        ),
        Descriptor::Field(_) => Ok(None),
        Descriptor::Computed(computed) => Ok(computed.target().map(SmolStr::new)),
    }
}

#[derive(Clone, Copy)]
enum Step<'a> {
    Fetch(&'a std::sync::Arc<dyn Prefetcher>),
    Traverse,
}

fn resolve(
    session: &Session,
    tree: &mut LookupTree,
    roots: &[Record],
    root_model: Option<&str>,
    spec: &LookupSpec,
) -> QueryResult<()> {
    let schema = session.schema();
    let validate_empty = session.config().prefetch.validate_empty_levels;
    let lookup = spec.prefetch_through();

    let mut frontier: Vec<Record> = roots.to_vec();
    let mut origin: Option<SmolStr> = common_model(&frontier).or_else(|| root_model.map(SmolStr::new));

    for level in 0..spec.levels() {
        let node = tree.node(spec, level);
        let through_attr = &spec.through_segments()[level];

        if frontier.is_empty() {
            if !validate_empty {
                break;
            }
            match validate_level(schema, tree, spec, level, node, origin.as_deref())? {
                Some(next) => {
                    origin = Some(next);
                    continue;
                }
                None => break,
            }
        }

        let level_model = common_model(&frontier).or(origin.take());

        if let Some(done) = tree.done(node) {
            frontier = done.to_vec();
            origin = common_model(&frontier).or_else(|| {
                level_model
                    .as_deref()
                    .and_then(|m| static_target(schema, m, through_attr))
            });
            continue;
        }

        let (to_attr, as_attr) = spec.current_to_attr(level);
        let leaf = spec.is_leaf(level);
        let mut next: Vec<Record> = Vec::new();
        let mut fetched = false;
        let mut discovered: Vec<LookupSpec> = Vec::new();
        let mut scalar = false;

        let mut groups = Vec::new();
        for (model, group) in by_model(&frontier) {
            let step = match schema.describe(&model, through_attr) {
                Descriptor::Relation(prefetcher) => Step::Fetch(prefetcher),
                Descriptor::Field(_) | Descriptor::Computed(_) => Step::Traverse,
                Descriptor::Missing if group[0].is_cached(through_attr) => Step::Traverse,
                Descriptor::Missing => {
                    return Err(QueryError::attribute_not_found(
                        model.as_str(),
                        through_attr.as_str(),
                        &lookup,
                    ));
                }
            };

            let (to_fetch, ready): (Vec<Record>, Vec<Record>) = match step {
                Step::Traverse if leaf => {
                    return Err(QueryError::not_prefetchable(&lookup, through_attr.as_str()));
                }
                Step::Traverse => (Vec::new(), group),
                Step::Fetch(prefetcher) => group
                    .into_iter()
                    .partition(|r| !is_fetched(r, prefetcher.as_ref(), to_attr, as_attr)),
            };

            if as_attr && matches!(step, Step::Fetch(_)) && !to_fetch.is_empty() {
                check_to_attr(schema, &model, to_attr)?;
            }
            groups.push((model, step, to_fetch, ready));
        }

        for (model, step, to_fetch, ready) in groups {
            if let (Step::Fetch(prefetcher), false) = (step, to_fetch.is_empty()) {
                let batch = prefetcher.fetch(session, &to_fetch, spec.current_queryset(level))?;
                attach(schema, prefetcher.as_ref(), &to_fetch, &batch, as_attr.then_some(to_attr));

                debug!(
                    lookup = %lookup,
                    level = level,
                    relation = %prefetcher.spec().qualified_name(),
                    parents = to_fetch.len(),
                    rows = batch.rows.len(),
                    "prefetched relation"
                );

                let seen_before = tree.follow(&model, prefetcher.cache_name());
                if !(seen_before && tree.is_auto(spec)) {
                    let prefix = spec.current_prefetch_to(level);
                    discovered.extend(batch.lookups.iter().map(|l| l.clone().with_prefix(&prefix)));
                }
                fetched = true;
                next.extend(batch.records());
            }

            if leaf {
                continue;
            }
            for record in &ready {
                match traverse(session, record, through_attr)? {
                    Some(Attr::Value(_)) => scalar = true,
                    Some(value) => next.extend(value.into_records()),
                    None => {}
                }
            }
        }

        let next = distinct(next);
        origin = common_model(&next).or_else(|| {
            level_model
                .as_deref()
                .and_then(|m| static_target(schema, m, through_attr))
        });

        if fetched {
            tree.mark_done(node, next.clone());
            if !discovered.is_empty() {
                trace!(lookup = %lookup, count = discovered.len(), "queued related queryset lookups");
                tree.push_auto(discovered)?;
            }
        }

        if scalar {
            trace!(lookup = %lookup, level = level, "lookup reached a plain value");
            break;
        }
        frontier = next;
    }
    Ok(())
}
