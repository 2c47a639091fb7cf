//! Relation declarations and the prefetchers that load them in batches.
//!
//! Relations are declared once on a [`SchemaBuilder`](crate::schema::SchemaBuilder):
//!
//! - [`ForeignKey`] for many-to-one and one-to-one links, plus their reverse side
//! - [`ManyToMany`] through a join table, on both sides
//! - [`GenericForeignKey`] pointing at any model by content type and id
//! - [`GenericRelation`] as the reverse of a generic foreign key
//!
//! Each declared side is installed on its model as a [`Prefetcher`], which
//! knows how to fetch the related rows for a whole batch of parents and how
//! to key them back onto each parent.
//!
//! ## Example
//!
//! ```rust
//! use prax_prefetch_core::prelude::*;
//!
//! let schema = Schema::builder()
//!     .model(ModelSchema::new("Author").column("name", FieldType::String))
//!     .model(ModelSchema::new("Book").column("title", FieldType::String))
//!     .foreign_key(ForeignKey::new("Book", "author", "Author").related_name("books"))
//!     .build()
//!     .unwrap();
//!
//! let books = schema.relation("Author", "books").unwrap();
//! assert!(!books.is_single());
//! assert_eq!(books.target_model(), Some("Book"));
//! ```

mod declare;
mod generic;
mod loader;
mod spec;

pub use declare::{ForeignKey, GenericForeignKey, GenericRelation, ManyToMany};
pub use generic::{GenericForeignKeyPrefetcher, GenericRelationPrefetcher};
pub use loader::{KeyedPrefetcher, PrefetchBatch, Prefetcher};
pub use spec::{GenericKeySpec, JoinTableSpec, RelationKind, RelationSpec};
