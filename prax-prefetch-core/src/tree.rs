//! Work queue and storage-path trie for one prefetch run.
//!
//! Lookups are popped in registration order. Lookups discovered while
//! fetching (a related queryset's own prefetches) are pushed to the front so
//! they run before the remaining caller lookups, in their own declared order.
//!
//! Each storage path (`houses`, `houses__rooms_lst`, ...) owns a node that
//! remembers the records fetched for it, so a later lookup sharing a prefix
//! continues from those records instead of querying again. A node also keeps
//! the queryset it was first reached with, so a later lookup bringing a
//! different one is rejected whether or not anything was fetched.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{QueryError, QueryResult};
use crate::lookup::LookupSpec;
use crate::queryset::QuerySet;
use crate::record::Record;

pub(crate) type NodeId = usize;

#[derive(Debug, Default)]
struct Node {
    children: IndexMap<SmolStr, NodeId>,
    done: Option<Vec<Record>>,
    seen: Option<Option<QuerySet>>,
    aliased: bool,
}

#[derive(Debug)]
pub(crate) struct LookupTree {
    nodes: Vec<Node>,
    queue: VecDeque<LookupSpec>,
    auto_paths: HashSet<String>,
    followed: HashSet<(SmolStr, SmolStr)>,
}

impl LookupTree {
    /// Plan `lookups`, validating each.
    pub fn new(lookups: impl IntoIterator<Item = LookupSpec>) -> QueryResult<Self> {
        let mut tree = Self {
            nodes: vec![Node::default()],
            queue: VecDeque::new(),
            auto_paths: HashSet::new(),
            followed: HashSet::new(),
        };
        for spec in lookups {
            spec.validate()?;
            tree.register(&spec);
            tree.queue.push_back(spec);
        }
        Ok(tree)
    }

    fn register(&mut self, spec: &LookupSpec) {
        let terminal = self.path(spec.to_segments());
        if spec.get_to_attr().is_some() {
            self.nodes[terminal].aliased = true;
        }
    }

    fn path(&mut self, segments: &[SmolStr]) -> NodeId {
        let mut current = 0;
        for segment in segments {
            current = match self.nodes[current].children.get(segment) {
                Some(&child) => child,
                None => {
                    let id = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[current].children.insert(segment.clone(), id);
                    id
                }
            };
        }
        current
    }

    /// Next lookup to run.
    pub fn pop(&mut self) -> Option<LookupSpec> {
        self.queue.pop_front()
    }

    /// Queue lookups discovered while fetching, ahead of everything else.
    pub fn push_auto(&mut self, lookups: Vec<LookupSpec>) -> QueryResult<()> {
        for spec in lookups.iter() {
            spec.validate()?;
        }
        for spec in lookups.into_iter().rev() {
            self.register(&spec);
            self.auto_paths.insert(spec.prefetch_to());
            self.queue.push_front(spec);
        }
        Ok(())
    }

    /// Node of `spec`'s storage path at `level`.
    pub fn node(&mut self, spec: &LookupSpec, level: usize) -> NodeId {
        self.path(&spec.to_segments()[..=level])
    }

    /// Check whether `spec` is already satisfied, and claim its storage path.
    ///
    /// A lookup reaching a path an earlier lookup already reached with another
    /// queryset is ambiguous. A lookup whose full storage path was fetched is
    /// skipped.
    pub fn already_done(&mut self, spec: &LookupSpec) -> QueryResult<bool> {
        let terminal = self.node(spec, spec.levels() - 1);
        if let (Some(seen), Some(qs)) = (&self.nodes[terminal].seen, spec.get_queryset()) {
            if seen.as_ref() != Some(qs) {
                return Err(QueryError::ambiguous_lookup(spec.prefetch_to()));
            }
        }
        for level in 0..spec.levels() {
            let node = self.node(spec, level);
            if self.nodes[node].seen.is_none() {
                self.nodes[node].seen = Some(spec.current_queryset(level).cloned());
            }
        }
        Ok(self.nodes[terminal].done.is_some())
    }

    /// Records fetched for `node`, if any.
    pub fn done(&self, node: NodeId) -> Option<&[Record]> {
        self.nodes[node].done.as_deref()
    }

    /// Remember the records fetched for `node`.
    pub fn mark_done(&mut self, node: NodeId, records: Vec<Record>) {
        self.nodes[node].done = Some(records);
    }

    /// Whether `node` is the storage path of some `to_attr`.
    pub fn is_alias(&self, node: NodeId) -> bool {
        self.nodes[node].aliased
    }

    /// Whether `spec` was queued by a related queryset rather than the caller.
    pub fn is_auto(&self, spec: &LookupSpec) -> bool {
        self.auto_paths.contains(&spec.prefetch_to())
    }

    /// Record that relation `model.name` has been fetched in this run.
    /// Returns whether it had been before.
    pub fn follow(&mut self, model: &str, name: &str) -> bool {
        !self.followed.insert((SmolStr::new(model), SmolStr::new(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_order() {
        let mut tree = LookupTree::new([LookupSpec::new("a"), LookupSpec::new("b")]).unwrap();
        assert_eq!(tree.pop().unwrap().prefetch_to(), "a");

        tree.push_auto(vec![LookupSpec::new("a__x"), LookupSpec::new("a__y")]).unwrap();
        let order: Vec<String> = std::iter::from_fn(|| tree.pop())
            .map(|spec| spec.prefetch_to())
            .collect();
        assert_eq!(order, vec!["a__x", "a__y", "b"]);
        assert!(tree.is_auto(&LookupSpec::new("a__x")));
        assert!(!tree.is_auto(&LookupSpec::new("b")));
    }

    #[test]
    fn test_done_and_ambiguity() {
        let plain = LookupSpec::new("houses");
        let custom = LookupSpec::new("houses").queryset(QuerySet::new("House"));
        let mut tree = LookupTree::new([plain.clone(), custom.clone()]).unwrap();

        assert!(!tree.already_done(&plain).unwrap());
        let node = tree.node(&plain, 0);
        tree.mark_done(node, Vec::new());
        assert!(tree.already_done(&plain).unwrap());

        let err = tree.already_done(&custom).unwrap_err();
        assert!(err.is_value_error());
        assert!(err.message.contains("'houses' lookup was already seen"));
    }

    #[test]
    fn test_ambiguity_without_fetch() {
        let mut tree = LookupTree::new(Vec::new()).unwrap();
        assert!(!tree.already_done(&LookupSpec::new("houses__rooms")).unwrap());

        let custom = LookupSpec::new("houses").queryset(QuerySet::new("House"));
        assert!(tree.already_done(&custom).unwrap_err().is_value_error());
    }

    #[test]
    fn test_identical_custom_lookup_is_skipped() {
        let custom = LookupSpec::new("houses").queryset(QuerySet::new("House"));
        let mut tree = LookupTree::new([custom.clone()]).unwrap();
        assert!(!tree.already_done(&custom).unwrap());
        let node = tree.node(&custom, 0);
        tree.mark_done(node, Vec::new());
        assert!(tree.already_done(&custom).unwrap());
        assert!(tree.already_done(&LookupSpec::new("houses")).unwrap());
    }

    #[test]
    fn test_alias_nodes() {
        let mut tree =
            LookupTree::new([LookupSpec::new("houses").to_attr("houses_lst")]).unwrap();
        let alias = tree.node(&LookupSpec::new("houses_lst"), 0);
        let plain = tree.node(&LookupSpec::new("houses"), 0);
        assert!(tree.is_alias(alias));
        assert!(!tree.is_alias(plain));
    }

    #[test]
    fn test_follow() {
        let mut tree = LookupTree::new(Vec::new()).unwrap();
        assert!(!tree.follow("Teacher", "qualifications"));
        assert!(tree.follow("Teacher", "qualifications"));
    }

    #[test]
    fn test_invalid_lookup_rejected() {
        assert!(LookupTree::new([LookupSpec::new("a____b")]).is_err());
    }
}
