//! # Prax Prefetch
//!
//! Batched loading of related records, the `prefetch_related` way.
//!
//! Prax Prefetch provides:
//! - A schema of models, foreign keys, many-to-many and generic relations
//! - Lookups such as `books__authors` resolved with one query per level
//! - Custom querysets per lookup, stored on the relation or under a new attribute
//! - A pluggable query engine, with an in-memory engine for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use prax_prefetch::prelude::*;
//!
//! let schema = Arc::new(
//!     Schema::builder()
//!         .model(ModelSchema::new("Author").column("name", FieldType::String))
//!         .model(ModelSchema::new("Book").column("title", FieldType::String))
//!         .many_to_many(ManyToMany::new("Book", "authors", "Author").related_name("books"))
//!         .build()?,
//! );
//! let db = Arc::new(InMemoryEngine::new(schema.clone()));
//! let book = db.insert("Book", [("title", Value::from("Poems"))])?;
//! let author = db.insert("Author", [("name", Value::from("Charlotte"))])?;
//! db.link("Book", "authors", &book, &author)?;
//!
//! let session = Session::new(schema, db.clone());
//! let books = session.fetch(&QuerySet::new("Book").prefetch_related(["authors"]))?;
//! assert_eq!(session.related_many(&books[0], "authors")?, vec![author]);
//! assert_eq!(db.query_count(), 2);
//! # Ok::<(), QueryError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Schemas, querysets and the prefetch engine.
pub mod query {
    pub use prax_prefetch_core::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use prax_prefetch_core::prelude::*;
}

// Re-export key types at the crate root
pub use prax_prefetch_core::{
    InMemoryEngine, LookupSpec, QueryEngine, QueryError, QueryResult, QuerySet, Record, Schema,
    Session, prefetch,
};
