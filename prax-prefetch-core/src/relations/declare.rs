//! Relation declarations.
//!
//! A declaration describes a relation once, from the model that holds it, and
//! installs both directions into the schema: a [`ForeignKey`] adds the
//! `<name>_id` column and the forward attribute to its owner plus the reverse
//! attribute (`<owner>_set`, or `<owner>` for one-to-one) to its target.

use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{QueryError, QueryResult};
use crate::schema::ModelSchema;
use crate::value::FieldType;

use super::generic::{GenericForeignKeyPrefetcher, GenericRelationPrefetcher};
use super::loader::{KeyedPrefetcher, Prefetcher};
use super::spec::{GenericKeySpec, JoinTableSpec, RelationKind, RelationSpec};

type Models = IndexMap<SmolStr, ModelSchema>;

fn model<'a>(models: &'a Models, name: &str, context: &str) -> QueryResult<&'a ModelSchema> {
    models.get(name).ok_or_else(|| {
        QueryError::schema(name, format!("unknown model referenced by {}", context))
    })
}

fn model_mut<'a>(models: &'a mut Models, name: &str) -> QueryResult<&'a mut ModelSchema> {
    models
        .get_mut(name)
        .ok_or_else(|| QueryError::schema(name, "unknown model"))
}

fn field_type(models: &Models, model_name: &str, field: &str) -> QueryResult<FieldType> {
    model(models, model_name, field)?
        .field(field)
        .map(|f| f.ty)
        .ok_or_else(|| QueryError::schema(model_name, format!("no field named '{}'", field)))
}

fn install(models: &mut Models, prefetcher: Arc<dyn Prefetcher>) -> QueryResult<()> {
    let owner = prefetcher.spec().model.clone();
    model_mut(models, &owner)?.add_relation(prefetcher)
}

fn default_reverse_name(owner: &str, single: bool) -> SmolStr {
    let owner = owner.to_lowercase();
    if single {
        SmolStr::new(owner)
    } else {
        SmolStr::new(format!("{}_set", owner))
    }
}

/// A foreign key (or one-to-one key) from `owner` to `target`.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    owner: SmolStr,
    name: SmolStr,
    target: SmolStr,
    related_name: Option<SmolStr>,
    to_field: Option<SmolStr>,
    nullable: bool,
    one_to_one: bool,
}

impl ForeignKey {
    /// Declare `owner.name` pointing at `target`.
    pub fn new(owner: impl Into<SmolStr>, name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            target: target.into(),
            related_name: None,
            to_field: None,
            nullable: false,
            one_to_one: false,
        }
    }

    /// Declare a one-to-one key.
    pub fn one_to_one(owner: impl Into<SmolStr>, name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self {
            one_to_one: true,
            ..Self::new(owner, name, target)
        }
    }

    /// Name of the reverse attribute on the target.
    pub fn related_name(mut self, name: impl Into<SmolStr>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Reference a target field other than its primary key.
    pub fn to_field(mut self, field: impl Into<SmolStr>) -> Self {
        self.to_field = Some(field.into());
        self
    }

    /// Allow the key column to be null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Column holding the key on the owner.
    pub fn column(&self) -> SmolStr {
        SmolStr::new(format!("{}_id", self.name))
    }

    pub(crate) fn install(self, models: &mut Models) -> QueryResult<()> {
        let context = format!("{}.{}", self.owner, self.name);
        model(models, &self.owner, &context)?;
        let target = model(models, &self.target, &context)?;
        let to_field = self.to_field.clone().unwrap_or_else(|| target.pk_field().clone());
        let key_type = field_type(models, &self.target, &to_field)?;

        let column = self.column();
        model_mut(models, &self.owner)?.ensure_field(column.clone(), key_type, self.nullable)?;

        let reverse = self
            .related_name
            .clone()
            .unwrap_or_else(|| default_reverse_name(&self.owner, self.one_to_one));
        let (forward_kind, reverse_kind) = if self.one_to_one {
            (RelationKind::ForwardOneToOne, RelationKind::ReverseOneToOne)
        } else {
            (RelationKind::ForwardManyToOne, RelationKind::ReverseManyToOne)
        };

        let forward = RelationSpec::new(self.name.clone(), forward_kind, self.owner.clone())
            .related(self.target.clone())
            .columns(column.clone(), to_field.clone())
            .remote_relation(reverse.clone())
            .nullable(self.nullable);
        let backward = RelationSpec::new(reverse, reverse_kind, self.target.clone())
            .related(self.owner.clone())
            .columns(to_field, column)
            .remote_relation(self.name.clone())
            .nullable(self.nullable);

        install(models, Arc::new(KeyedPrefetcher::new(forward)))?;
        install(models, Arc::new(KeyedPrefetcher::new(backward)))
    }
}

/// A many-to-many relation through a join table.
#[derive(Debug, Clone)]
pub struct ManyToMany {
    owner: SmolStr,
    name: SmolStr,
    target: SmolStr,
    related_name: Option<SmolStr>,
    through: Option<JoinTableSpec>,
    source_field: Option<SmolStr>,
    target_field: Option<SmolStr>,
}

impl ManyToMany {
    /// Declare `owner.name` linking to many `target` records.
    pub fn new(owner: impl Into<SmolStr>, name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            target: target.into(),
            related_name: None,
            through: None,
            source_field: None,
            target_field: None,
        }
    }

    /// Name of the reverse attribute on the target.
    pub fn related_name(mut self, name: impl Into<SmolStr>) -> Self {
        self.related_name = Some(name.into());
        self
    }

    /// Use an explicit join table: `source` references the owner, `target` the related model.
    pub fn through(
        mut self,
        table: impl Into<SmolStr>,
        source: impl Into<SmolStr>,
        target: impl Into<SmolStr>,
    ) -> Self {
        self.through = Some(JoinTableSpec::new(table, source, target));
        self
    }

    /// Model fields the join columns reference, when not the primary keys.
    pub fn keys(mut self, source_field: impl Into<SmolStr>, target_field: impl Into<SmolStr>) -> Self {
        self.source_field = Some(source_field.into());
        self.target_field = Some(target_field.into());
        self
    }

    pub(crate) fn install(self, models: &mut Models) -> QueryResult<()> {
        let context = format!("{}.{}", self.owner, self.name);
        let owner = model(models, &self.owner, &context)?;
        let target = model(models, &self.target, &context)?;

        let source_field = self.source_field.clone().unwrap_or_else(|| owner.pk_field().clone());
        let target_field = self.target_field.clone().unwrap_or_else(|| target.pk_field().clone());
        field_type(models, &self.owner, &source_field)?;
        field_type(models, &self.target, &target_field)?;

        let join = match self.through.clone() {
            Some(join) => join,
            None => {
                let owner_lower = self.owner.to_lowercase();
                let table = format!("{}_{}", owner.table(), self.name);
                if self.owner == self.target {
                    JoinTableSpec::new(table, format!("from_{}_id", owner_lower), format!("to_{}_id", owner_lower))
                } else {
                    JoinTableSpec::new(
                        table,
                        format!("{}_id", owner_lower),
                        format!("{}_id", self.target.to_lowercase()),
                    )
                }
            }
        };

        let reverse = self
            .related_name
            .clone()
            .unwrap_or_else(|| default_reverse_name(&self.owner, false));

        let forward = RelationSpec::new(self.name.clone(), RelationKind::ManyToMany, self.owner.clone())
            .related(self.target.clone())
            .columns(source_field.clone(), target_field.clone())
            .remote_relation(reverse.clone())
            .join_table(join.clone());
        let backward = RelationSpec::new(reverse, RelationKind::ManyToMany, self.target.clone())
            .related(self.owner.clone())
            .columns(target_field, source_field)
            .remote_relation(self.name.clone())
            .join_table(join.reversed());

        install(models, Arc::new(KeyedPrefetcher::new(forward)))?;
        install(models, Arc::new(KeyedPrefetcher::new(backward)))
    }
}

/// A polymorphic pointer stored in a (content type, object id) column pair.
#[derive(Debug, Clone)]
pub struct GenericForeignKey {
    owner: SmolStr,
    name: SmolStr,
    columns: GenericKeySpec,
}

impl GenericForeignKey {
    /// Declare `owner.name` over the default `content_type` / `object_id` columns.
    pub fn new(owner: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            columns: GenericKeySpec::default(),
        }
    }

    /// Use other columns for the pair.
    pub fn columns(mut self, ct_field: impl Into<SmolStr>, id_field: impl Into<SmolStr>) -> Self {
        self.columns = GenericKeySpec::new(ct_field, id_field);
        self
    }

    pub(crate) fn install(self, models: &mut Models) -> QueryResult<()> {
        let owner = model_mut(models, &self.owner)?;
        let existing = owner.field(&self.columns.ct_field).map(|f| f.nullable);
        let nullable = match existing {
            Some(nullable) => nullable,
            None => {
                owner.ensure_field(self.columns.ct_field.clone(), FieldType::String, false)?;
                false
            }
        };
        if owner.field(&self.columns.id_field).is_none() {
            owner.ensure_field(self.columns.id_field.clone(), FieldType::Int, nullable)?;
        }

        let spec = RelationSpec::new(self.name, RelationKind::GenericForeignKey, self.owner)
            .columns(self.columns.id_field.clone(), "id")
            .generic(self.columns)
            .nullable(nullable);
        install(models, Arc::new(GenericForeignKeyPrefetcher::new(spec)))
    }
}

/// The reverse side of a generic foreign key: every `target` record whose
/// pointer names this record.
#[derive(Debug, Clone)]
pub struct GenericRelation {
    owner: SmolStr,
    name: SmolStr,
    target: SmolStr,
    columns: GenericKeySpec,
}

impl GenericRelation {
    /// Declare `owner.name` collecting `target` records over the default columns.
    pub fn new(owner: impl Into<SmolStr>, name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            target: target.into(),
            columns: GenericKeySpec::default(),
        }
    }

    /// Match on other pointer columns of the target.
    pub fn columns(mut self, ct_field: impl Into<SmolStr>, id_field: impl Into<SmolStr>) -> Self {
        self.columns = GenericKeySpec::new(ct_field, id_field);
        self
    }

    pub(crate) fn install(self, models: &mut Models) -> QueryResult<()> {
        let context = format!("{}.{}", self.owner, self.name);
        let owner = model(models, &self.owner, &context)?;
        let pk = owner.pk_field().clone();
        field_type(models, &self.target, &self.columns.ct_field)?;
        field_type(models, &self.target, &self.columns.id_field)?;

        let spec = RelationSpec::new(self.name, RelationKind::GenericRelation, self.owner)
            .related(self.target)
            .columns(pk, self.columns.id_field.clone())
            .generic(self.columns);
        install(models, Arc::new(GenericRelationPrefetcher::new(spec)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> Models {
        let mut models = Models::new();
        for name in ["Author", "Book", "TaggedItem"] {
            models.insert(SmolStr::new(name), ModelSchema::new(name));
        }
        models
    }

    #[test]
    fn test_foreign_key_installs_both_sides() {
        let mut models = models();
        ForeignKey::new("Author", "first_book", "Book")
            .related_name("first_time_authors")
            .install(&mut models)
            .unwrap();

        let author = &models["Author"];
        assert!(author.field("first_book_id").is_some());
        let forward = author.relation("first_book").unwrap();
        assert_eq!(forward.spec().kind, RelationKind::ForwardManyToOne);
        assert_eq!(forward.spec().local_column, "first_book_id");

        let reverse = models["Book"].relation("first_time_authors").unwrap();
        assert_eq!(reverse.spec().remote_column, "first_book_id");
        assert_eq!(reverse.spec().remote_relation.as_deref(), Some("first_book"));
    }

    #[test]
    fn test_default_reverse_names() {
        let mut models = models();
        ForeignKey::one_to_one("Author", "favorite", "Book").install(&mut models).unwrap();
        ManyToMany::new("Book", "authors", "Author").install(&mut models).unwrap();

        assert!(models["Book"].relation("author").is_some());
        let reverse = models["Author"].relation("book_set").unwrap();
        let join = reverse.spec().join_table.as_ref().unwrap();
        assert_eq!(join.table_name, "book_authors");
        assert_eq!(join.source_column, "author_id");
    }

    #[test]
    fn test_self_referential_join_columns() {
        let mut models = models();
        ManyToMany::new("Author", "friends", "Author").install(&mut models).unwrap();
        let join = models["Author"].relation("friends").unwrap().spec().join_table.clone().unwrap();
        assert_eq!(join.source_column, "from_author_id");
        assert_eq!(join.target_column, "to_author_id");
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut models = models();
        let err = ForeignKey::new("Author", "pub", "Publisher").install(&mut models).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_generic_relation_requires_columns() {
        let mut models = models();
        assert!(GenericRelation::new("Book", "tags", "TaggedItem").install(&mut models).is_err());

        GenericForeignKey::new("TaggedItem", "content_object").install(&mut models).unwrap();
        GenericRelation::new("Book", "tags", "TaggedItem").install(&mut models).unwrap();
        assert!(models["Book"].relation("tags").is_some());
    }
}
