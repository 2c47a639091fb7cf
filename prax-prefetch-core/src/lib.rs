//! # prax-prefetch-core
//!
//! Batched loading of related records for the Prax ORM.
//!
//! This crate resolves `prefetch_related` lookups over a set of loaded records:
//! - One query per relation level, however many parent records there are
//! - Forward and reverse foreign keys, one-to-one, many-to-many and generic relations
//! - Custom querysets per lookup, with results stored under a separate attribute
//! - Nested lookups through plain attributes and computed properties
//! - Prefetches declared on a related queryset run as part of the same pass
//!
//! ## Schemas
//!
//! Declare models and the relations between them:
//!
//! ```rust
//! use prax_prefetch_core::prelude::*;
//!
//! let schema = Schema::builder()
//!     .model(ModelSchema::new("Author").column("name", FieldType::String))
//!     .model(ModelSchema::new("Book").column("title", FieldType::String))
//!     .foreign_key(ForeignKey::new("Book", "first_author", "Author").related_name("first_time_authors"))
//!     .many_to_many(ManyToMany::new("Book", "authors", "Author").related_name("books"))
//!     .build()
//!     .unwrap();
//!
//! // Both sides of every relation are installed.
//! assert!(schema.relation("Author", "books").is_some());
//! assert!(schema.relation("Author", "first_time_authors").is_some());
//! ```
//!
//! ## Lookups
//!
//! Lookups name a path of relations separated by `__`:
//!
//! ```rust
//! use prax_prefetch_core::{Filter, LookupSpec, QuerySet, Value};
//!
//! // Plain path
//! let lookup = LookupSpec::new("books__authors");
//! assert_eq!(lookup.levels(), 2);
//!
//! // Custom queryset stored under its own attribute
//! let lookup = LookupSpec::new("books")
//!     .queryset(QuerySet::new("Book").r#where(Filter::Equals("title".into(), Value::from("Poems"))))
//!     .to_attr("poems");
//! assert_eq!(lookup.prefetch_to(), "poems");
//! ```
//!
//! ## Prefetching
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
//! for address in ["1 Main St", "2 Main St"] {
//!     let house = db.insert("House", [("address", Value::from(address))]).unwrap();
//!     db.insert("Room", [("name", Value::from("Kitchen")), ("house_id", house.pk())]).unwrap();
//! }
//!
//! let session = Session::new(schema, db.clone());
//! let houses = session.fetch(&QuerySet::new("House")).unwrap();
//! session.prefetch_related_objects(&houses, ["rooms__house"]).unwrap();
//!
//! // One query for the houses and one for all of their rooms. Each room
//! // already points back at its house, so `house` needs no query.
//! assert_eq!(db.query_count(), 2);
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use prax_prefetch_core::{ErrorKind, QueryError};
//!
//! let err = QueryError::ambiguous_lookup("houses");
//! assert_eq!(err.kind(), ErrorKind::Value);
//! ```

mod attach;
mod executor;
mod tree;

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod logging;
pub mod lookup;
pub mod memory;
pub mod queryset;
pub mod record;
pub mod relations;
pub mod schema;
pub mod session;
pub mod types;
pub mod value;

pub use config::{DebugConfig, PrefetchConfig, PrefetchSettings};
pub use engine::QueryEngine;
pub use error::{ErrorCode, ErrorContext, ErrorKind, QueryError, QueryResult, Suggestion};
pub use filter::Filter;
pub use lookup::{LOOKUP_SEP, LookupSpec, prefetch};
pub use memory::InMemoryEngine;
pub use queryset::{PrefetchQuery, QuerySet, Row, SelectJoin, Through};
pub use record::{Cached, Record};
pub use relations::{
    ForeignKey, GenericForeignKey, GenericForeignKeyPrefetcher, GenericKeySpec, GenericRelation,
    GenericRelationPrefetcher, JoinTableSpec, KeyedPrefetcher, ManyToMany, PrefetchBatch,
    Prefetcher, RelationKind, RelationSpec,
};
pub use schema::{ComputedAttr, ComputedFn, Descriptor, FieldDef, ModelSchema, Schema, SchemaBuilder};
pub use session::{Attr, Session};
pub use types::{NullsOrder, OrderBy, OrderByField, SortOrder};
pub use value::{FieldType, KeyPart, RelKey, Value, rel_key};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, init_with_config, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::PrefetchConfig;
    pub use crate::engine::QueryEngine;
    pub use crate::error::{ErrorKind, QueryError, QueryResult};
    pub use crate::filter::Filter;
    pub use crate::lookup::{LookupSpec, prefetch};
    pub use crate::memory::InMemoryEngine;
    pub use crate::queryset::QuerySet;
    pub use crate::record::{Cached, Record};
    pub use crate::relations::{ForeignKey, GenericForeignKey, GenericRelation, ManyToMany};
    pub use crate::schema::{ModelSchema, Schema};
    pub use crate::session::{Attr, Session};
    pub use crate::types::{OrderBy, OrderByField};
    pub use crate::value::{FieldType, Value};
}
