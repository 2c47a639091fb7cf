//! Model metadata consulted by the prefetch engine.
//!
//! A [`Schema`] is built once from [`ModelSchema`] definitions and relation
//! declarations, then shared read-only by sessions and engines.
//!
//! ```rust
//! use prax_prefetch_core::{FieldType, ForeignKey, ModelSchema, Schema};
//!
//! let schema = Schema::builder()
//!     .model(ModelSchema::new("House").column("address", FieldType::String))
//!     .model(ModelSchema::new("Room").column("name", FieldType::String))
//!     .foreign_key(ForeignKey::new("Room", "house", "House").related_name("rooms"))
//!     .build()
//!     .unwrap();
//!
//! assert!(schema.relation("House", "rooms").is_some());
//! assert!(schema.model("Room").unwrap().field("house_id").is_some());
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{QueryError, QueryResult};
use crate::lookup::LookupSpec;
use crate::record::Record;
use crate::relations::{ForeignKey, GenericForeignKey, GenericRelation, ManyToMany, Prefetcher};
use crate::session::{Attr, Session};
use crate::types::OrderBy;
use crate::value::FieldType;

/// A stored column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Column name.
    pub name: SmolStr,
    /// Declared type.
    pub ty: FieldType,
    /// Whether the column accepts null.
    pub nullable: bool,
}

/// Signature of a computed attribute.
pub type ComputedFn = dyn Fn(&Session, &Record) -> QueryResult<Attr> + Send + Sync;

/// A derived attribute, evaluated on read. Prefetch lookups may traverse it.
#[derive(Clone)]
pub struct ComputedAttr {
    name: SmolStr,
    target: Option<SmolStr>,
    func: Arc<ComputedFn>,
}

impl ComputedAttr {
    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model of the records it yields, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Evaluate for `record`.
    pub fn call(&self, session: &Session, record: &Record) -> QueryResult<Attr> {
        (self.func)(session, record)
    }
}

impl fmt::Debug for ComputedAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedAttr")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Metadata for one model.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: SmolStr,
    table: SmolStr,
    pk: SmolStr,
    fields: IndexMap<SmolStr, FieldDef>,
    ordering: OrderBy,
    default_prefetch: Vec<LookupSpec>,
    computed: IndexMap<SmolStr, ComputedAttr>,
    relations: IndexMap<SmolStr, Arc<dyn Prefetcher>>,
}

impl ModelSchema {
    /// A model with an integer `id` primary key stored in the lowercased table.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        let name = name.into();
        let pk = SmolStr::new_static("id");
        let mut fields = IndexMap::new();
        fields.insert(
            pk.clone(),
            FieldDef {
                name: pk.clone(),
                ty: FieldType::Int,
                nullable: false,
            },
        );
        Self {
            table: SmolStr::new(name.to_lowercase()),
            name,
            pk,
            fields,
            ordering: OrderBy::none(),
            default_prefetch: Vec::new(),
            computed: IndexMap::new(),
            relations: IndexMap::new(),
        }
    }

    /// Override the table name.
    pub fn with_table(mut self, table: impl Into<SmolStr>) -> Self {
        self.table = table.into();
        self
    }

    /// Replace the primary key column.
    pub fn primary_key(mut self, name: impl Into<SmolStr>, ty: FieldType) -> Self {
        let name = name.into();
        self.fields.shift_remove(&self.pk);
        let mut fields = IndexMap::with_capacity(self.fields.len() + 1);
        fields.insert(
            name.clone(),
            FieldDef {
                name: name.clone(),
                ty,
                nullable: false,
            },
        );
        fields.extend(self.fields.drain(..));
        self.fields = fields;
        self.pk = name;
        self
    }

    /// Add a non-null column.
    pub fn column(self, name: impl Into<SmolStr>, ty: FieldType) -> Self {
        self.add_column(name.into(), ty, false)
    }

    /// Add a nullable column.
    pub fn nullable_column(self, name: impl Into<SmolStr>, ty: FieldType) -> Self {
        self.add_column(name.into(), ty, true)
    }

    fn add_column(mut self, name: SmolStr, ty: FieldType, nullable: bool) -> Self {
        self.fields.insert(name.clone(), FieldDef { name, ty, nullable });
        self
    }

    /// Default ordering of querysets over this model.
    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.ordering = order.into();
        self
    }

    /// Lookups the default manager prefetches on every related queryset.
    pub fn prefetch_by_default<I, L>(mut self, lookups: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LookupSpec>,
    {
        self.default_prefetch.extend(lookups.into_iter().map(Into::into));
        self
    }

    /// Add a computed attribute yielding records of `target` (or plain values when `None`).
    pub fn computed<F>(mut self, name: impl Into<SmolStr>, target: Option<&str>, func: F) -> Self
    where
        F: Fn(&Session, &Record) -> QueryResult<Attr> + Send + Sync + 'static,
    {
        let name = name.into();
        self.computed.insert(
            name.clone(),
            ComputedAttr {
                name,
                target: target.map(SmolStr::new),
                func: Arc::new(func),
            },
        );
        self
    }

    /// Model name.
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// Table name.
    pub fn table(&self) -> &SmolStr {
        &self.table
    }

    /// Primary key column.
    pub fn pk_field(&self) -> &SmolStr {
        &self.pk
    }

    /// Primary key type.
    pub fn pk_type(&self) -> FieldType {
        self.fields.get(&self.pk).map(|f| f.ty).unwrap_or_default()
    }

    /// Column by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// All columns in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    /// Default ordering; empty means primary key ascending.
    pub fn ordering(&self) -> &OrderBy {
        &self.ordering
    }

    /// Default manager prefetch lookups.
    pub fn default_prefetch(&self) -> &[LookupSpec] {
        &self.default_prefetch
    }

    /// Computed attribute by name.
    pub fn computed_attr(&self, name: &str) -> Option<&ComputedAttr> {
        self.computed.get(name)
    }

    /// Relation attribute by name.
    pub fn relation(&self, name: &str) -> Option<&Arc<dyn Prefetcher>> {
        self.relations.get(name)
    }

    /// All relation attributes.
    pub fn relations(&self) -> impl Iterator<Item = &Arc<dyn Prefetcher>> {
        self.relations.values()
    }

    /// Whether `name` is a column or relation of this model.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.relations.contains_key(name)
    }

    pub(crate) fn ensure_field(&mut self, name: SmolStr, ty: FieldType, nullable: bool) -> QueryResult<()> {
        match self.fields.get(&name) {
            Some(existing) if existing.ty != ty => Err(QueryError::schema(
                self.name.as_str(),
                format!("column '{}' is declared as {:?} but the relation needs {:?}", name, existing.ty, ty),
            )),
            Some(_) => Ok(()),
            None => {
                self.fields.insert(name.clone(), FieldDef { name, ty, nullable });
                Ok(())
            }
        }
    }

    pub(crate) fn add_relation(&mut self, prefetcher: Arc<dyn Prefetcher>) -> QueryResult<()> {
        let name = prefetcher.spec().name.clone();
        if self.has_field(&name) || self.computed.contains_key(&name) {
            return Err(QueryError::schema(
                self.name.as_str(),
                format!("relation '{}' clashes with an existing attribute", name),
            ));
        }
        self.relations.insert(name, prefetcher);
        Ok(())
    }
}

/// What an attribute name resolves to on a model.
#[derive(Debug, Clone, Copy)]
pub enum Descriptor<'a> {
    /// A prefetchable relation.
    Relation(&'a Arc<dyn Prefetcher>),
    /// A stored column.
    Field(&'a FieldDef),
    /// A computed attribute.
    Computed(&'a ComputedAttr),
    /// Nothing known to the schema.
    Missing,
}

/// All models of an application.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: IndexMap<SmolStr, ModelSchema>,
}

impl Schema {
    /// Start declaring a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Model by name.
    pub fn model(&self, name: &str) -> QueryResult<&ModelSchema> {
        self.models.get(name).ok_or_else(|| {
            QueryError::configuration(format!("Unknown model '{}'", name)).with_model(name)
        })
    }

    /// Model by name, if declared.
    pub fn get_model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    /// All models in declaration order.
    pub fn models(&self) -> impl Iterator<Item = &ModelSchema> {
        self.models.values()
    }

    /// Relation attribute `name` on `model`.
    pub fn relation(&self, model: &str, name: &str) -> Option<&Arc<dyn Prefetcher>> {
        self.models.get(model)?.relation(name)
    }

    /// Resolve attribute `attr` on `model`. Relations shadow columns.
    pub fn describe(&self, model: &str, attr: &str) -> Descriptor<'_> {
        let Some(schema) = self.models.get(model) else {
            return Descriptor::Missing;
        };
        if let Some(relation) = schema.relation(attr) {
            Descriptor::Relation(relation)
        } else if let Some(field) = schema.field(attr) {
            Descriptor::Field(field)
        } else if let Some(computed) = schema.computed_attr(attr) {
            Descriptor::Computed(computed)
        } else {
            Descriptor::Missing
        }
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    models: IndexMap<SmolStr, ModelSchema>,
    foreign_keys: Vec<ForeignKey>,
    many_to_many: Vec<ManyToMany>,
    generic_foreign_keys: Vec<GenericForeignKey>,
    generic_relations: Vec<GenericRelation>,
}

impl SchemaBuilder {
    /// Add a model.
    pub fn model(mut self, model: ModelSchema) -> Self {
        self.models.insert(model.name.clone(), model);
        self
    }

    /// Declare a foreign key or one-to-one key.
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Declare a many-to-many relation.
    pub fn many_to_many(mut self, m2m: ManyToMany) -> Self {
        self.many_to_many.push(m2m);
        self
    }

    /// Declare a generic foreign key.
    pub fn generic_foreign_key(mut self, gfk: GenericForeignKey) -> Self {
        self.generic_foreign_keys.push(gfk);
        self
    }

    /// Declare a generic relation.
    pub fn generic_relation(mut self, relation: GenericRelation) -> Self {
        self.generic_relations.push(relation);
        self
    }

    /// Install all declarations and validate the result.
    pub fn build(self) -> QueryResult<Schema> {
        let mut models = self.models;

        for gfk in self.generic_foreign_keys {
            gfk.install(&mut models)?;
        }
        for fk in self.foreign_keys {
            fk.install(&mut models)?;
        }
        for m2m in self.many_to_many {
            m2m.install(&mut models)?;
        }
        for relation in self.generic_relations {
            relation.install(&mut models)?;
        }

        for model in models.values() {
            for lookup in &model.default_prefetch {
                lookup.validate()?;
            }
            for computed in model.computed.values() {
                if let Some(target) = computed.target() {
                    if !models.contains_key(target) {
                        return Err(QueryError::schema(
                            model.name.as_str(),
                            format!("computed attribute '{}' targets unknown model {}", computed.name, target),
                        ));
                    }
                }
            }
        }

        Ok(Schema { models })
    }
}
