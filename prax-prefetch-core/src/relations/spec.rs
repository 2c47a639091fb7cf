//! Relation specification types.

use smol_str::SmolStr;

/// Kind of relation an attribute exposes, seen from the model that owns the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Foreign key held by this model (e.g., Room belongs to House).
    ForwardManyToOne,
    /// Unique foreign key held by this model (e.g., House has one main Room).
    ForwardOneToOne,
    /// Unique foreign key held by the other model (e.g., Room is main room of one House).
    ReverseOneToOne,
    /// Foreign key held by the other model (e.g., House has many Rooms).
    ReverseManyToOne,
    /// Join-table relation, either direction (e.g., Book has many Authors).
    ManyToMany,
    /// Polymorphic pointer stored as (content type, object id).
    GenericForeignKey,
    /// Reverse side of a generic foreign key (e.g., Bookmark has many TaggedItems).
    GenericRelation,
}

impl RelationKind {
    /// Check if this relation resolves to at most one record.
    pub fn is_single(&self) -> bool {
        matches!(
            self,
            Self::ForwardManyToOne
                | Self::ForwardOneToOne
                | Self::ReverseOneToOne
                | Self::GenericForeignKey
        )
    }

    /// Check if this relation resolves to a list of records.
    pub fn is_many(&self) -> bool {
        !self.is_single()
    }

    /// Check if the key column lives on the owning model.
    pub fn is_forward(&self) -> bool {
        matches!(
            self,
            Self::ForwardManyToOne | Self::ForwardOneToOne | Self::GenericForeignKey
        )
    }

    /// Related querysets for this kind go through the target's default manager,
    /// so the target's default prefetch lookups apply.
    pub fn uses_default_manager(&self) -> bool {
        matches!(
            self,
            Self::ReverseManyToOne | Self::ManyToMany | Self::GenericRelation
        )
    }
}

/// Specification for a relation attribute on a model.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSpec {
    /// Attribute name on the owning model, also the default cache key.
    pub name: SmolStr,
    /// Kind of relation.
    pub kind: RelationKind,
    /// Model owning the attribute.
    pub model: SmolStr,
    /// Related model; `None` for generic foreign keys.
    pub related_model: Option<SmolStr>,
    /// Column on the owning model supplying the lookup key.
    pub local_column: SmolStr,
    /// Column on the related model matched against the key.
    pub remote_column: SmolStr,
    /// Name of the opposite attribute on the related model, if any.
    pub remote_relation: Option<SmolStr>,
    /// Join table for many-to-many relations, oriented from this side.
    pub join_table: Option<JoinTableSpec>,
    /// Content-type and object-id columns for generic relations.
    pub generic: Option<GenericKeySpec>,
    /// Whether the key column accepts null.
    pub nullable: bool,
}

impl RelationSpec {
    /// Create a relation spec with key columns left to the builder methods.
    pub fn new(name: impl Into<SmolStr>, kind: RelationKind, model: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            kind,
            model: model.into(),
            related_model: None,
            local_column: SmolStr::new_static("id"),
            remote_column: SmolStr::new_static("id"),
            remote_relation: None,
            join_table: None,
            generic: None,
            nullable: false,
        }
    }

    /// Set the related model.
    pub fn related(mut self, model: impl Into<SmolStr>) -> Self {
        self.related_model = Some(model.into());
        self
    }

    /// Set the local and remote key columns.
    pub fn columns(mut self, local: impl Into<SmolStr>, remote: impl Into<SmolStr>) -> Self {
        self.local_column = local.into();
        self.remote_column = remote.into();
        self
    }

    /// Set the opposite attribute name.
    pub fn remote_relation(mut self, name: impl Into<SmolStr>) -> Self {
        self.remote_relation = Some(name.into());
        self
    }

    /// Set the join table.
    pub fn join_table(mut self, join_table: JoinTableSpec) -> Self {
        self.join_table = Some(join_table);
        self
    }

    /// Set the generic key columns.
    pub fn generic(mut self, generic: GenericKeySpec) -> Self {
        self.generic = Some(generic);
        self
    }

    /// Mark the key column nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// `Model.attr`, used in log lines and error context.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.model, self.name)
    }
}

/// Specification for a join table (many-to-many).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableSpec {
    /// Name of the join table.
    pub table_name: SmolStr,
    /// Column referencing the model that owns the attribute.
    pub source_column: SmolStr,
    /// Column referencing the related model.
    pub target_column: SmolStr,
}

impl JoinTableSpec {
    /// Create a new join table spec.
    pub fn new(
        table_name: impl Into<SmolStr>,
        source_column: impl Into<SmolStr>,
        target_column: impl Into<SmolStr>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }

    /// The same table seen from the other side.
    pub fn reversed(&self) -> Self {
        Self::new(
            self.table_name.clone(),
            self.target_column.clone(),
            self.source_column.clone(),
        )
    }
}

/// Columns holding the (content type, object id) pair of a generic foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericKeySpec {
    /// Column storing the target model name.
    pub ct_field: SmolStr,
    /// Column storing the target primary key.
    pub id_field: SmolStr,
}

impl GenericKeySpec {
    /// Create a generic key spec.
    pub fn new(ct_field: impl Into<SmolStr>, id_field: impl Into<SmolStr>) -> Self {
        Self {
            ct_field: ct_field.into(),
            id_field: id_field.into(),
        }
    }
}

impl Default for GenericKeySpec {
    fn default() -> Self {
        Self::new("content_type", "object_id")
    }
}
