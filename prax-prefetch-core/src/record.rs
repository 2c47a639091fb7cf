//! Hydrated records and their per-record prefetch cache.
//!
//! A [`Record`] is a cheap-clone handle: clones share the same column values
//! and the same cache, so attaching a prefetched relation to one handle makes
//! it visible through every other handle to the same row instance.
//!
//! Back-references (a child pointing at the parent it was fetched for) are
//! held weakly so parent and child caches never form an `Arc` cycle.

use indexmap::IndexMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::value::Value;

/// A resolved relation value stored in a record's cache.
#[derive(Clone)]
pub enum Cached {
    /// A single related record.
    One(Record),
    /// An ordered list of related records.
    Many(Vec<Record>),
    /// A single-valued relation known to have no related row.
    Missing,
}

impl Cached {
    /// The records held by this entry, in order.
    pub fn records(&self) -> Vec<Record> {
        match self {
            Self::One(record) => vec![record.clone()],
            Self::Many(records) => records.clone(),
            Self::Missing => Vec::new(),
        }
    }
}

impl fmt::Debug for Cached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(record) => write!(f, "One({:?})", record),
            Self::Many(records) => f.debug_tuple("Many").field(records).finish(),
            Self::Missing => f.write_str("Missing"),
        }
    }
}

enum Slot {
    Value(Cached),
    Back(Weak<RecordInner>),
}

struct RecordInner {
    model: SmolStr,
    pk_field: SmolStr,
    fields: RwLock<IndexMap<SmolStr, Value>>,
    cache: RwLock<IndexMap<SmolStr, Slot>>,
}

/// Handle to a hydrated row.
#[derive(Clone)]
pub struct Record(Arc<RecordInner>);

impl Record {
    /// Create a record for `model` whose primary key lives in `pk_field`.
    pub fn new(
        model: impl Into<SmolStr>,
        pk_field: impl Into<SmolStr>,
        fields: IndexMap<SmolStr, Value>,
    ) -> Self {
        Self(Arc::new(RecordInner {
            model: model.into(),
            pk_field: pk_field.into(),
            fields: RwLock::new(fields),
            cache: RwLock::new(IndexMap::new()),
        }))
    }

    /// Create a record from `(column, value)` pairs.
    pub fn from_pairs<K, V>(
        model: impl Into<SmolStr>,
        pk_field: impl Into<SmolStr>,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<SmolStr>,
        V: Into<Value>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(model, pk_field, fields)
    }

    /// Model name.
    pub fn model(&self) -> &str {
        &self.0.model
    }

    /// Name of the primary key column.
    pub fn pk_field(&self) -> &str {
        &self.0.pk_field
    }

    /// Primary key value.
    pub fn pk(&self) -> Value {
        self.get(&self.0.pk_field).unwrap_or_default()
    }

    /// Column value, `None` when the column is not loaded.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.fields.read().get(field).cloned()
    }

    /// Set a column value on this instance.
    pub fn set(&self, field: impl Into<SmolStr>, value: impl Into<Value>) {
        self.0.fields.write().insert(field.into(), value.into());
    }

    /// Snapshot of all column values.
    pub fn fields(&self) -> IndexMap<SmolStr, Value> {
        self.0.fields.read().clone()
    }

    /// Cached relation value under `key`.
    ///
    /// A back-reference whose parent has been dropped reads as absent.
    pub fn cached(&self, key: &str) -> Option<Cached> {
        match self.0.cache.read().get(key)? {
            Slot::Value(value) => Some(value.clone()),
            Slot::Back(weak) => weak.upgrade().map(|inner| Cached::One(Record(inner))),
        }
    }

    /// Whether a live value is cached under `key`.
    pub fn is_cached(&self, key: &str) -> bool {
        self.cached(key).is_some()
    }

    /// Store a relation value under `key`, replacing any previous value.
    pub fn set_cached(&self, key: impl Into<SmolStr>, value: Cached) {
        self.0.cache.write().insert(key.into(), Slot::Value(value));
    }

    /// Store a weak reference to `parent` under `key`.
    pub fn set_back_reference(&self, key: impl Into<SmolStr>, parent: &Record) {
        self.0
            .cache
            .write()
            .insert(key.into(), Slot::Back(Arc::downgrade(&parent.0)));
    }

    /// Drop the cached value under `key`. Returns whether one was present.
    pub fn remove_cached(&self, key: &str) -> bool {
        self.0.cache.write().shift_remove(key).is_some()
    }

    /// Drop every cached relation value.
    pub fn clear_cache(&self) {
        self.0.cache.write().clear();
    }

    /// Keys currently present in the cache, in insertion order.
    pub fn cached_keys(&self) -> Vec<SmolStr> {
        self.0.cache.read().keys().cloned().collect()
    }

    /// Whether two handles point at the same row instance.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared instance, usable as an identity key.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for Record {
    /// Same model and same non-null primary key. Unsaved rows compare by identity.
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let pk = self.pk();
        !pk.is_null() && self.model() == other.model() && pk == other.pk()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: {}>", self.model(), self.pk())
    }
}
