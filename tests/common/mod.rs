//! Shared models and fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use prax_prefetch::prelude::*;

/// Schema covering every model the integration tests use.
pub fn schema() -> Schema {
    Schema::builder()
        // Library
        .model(ModelSchema::new("Book").column("title", FieldType::String))
        .model(ModelSchema::new("Author").column("name", FieldType::String))
        .model(ModelSchema::new("Reader").column("name", FieldType::String))
        .model(ModelSchema::new("Bio"))
        .model(ModelSchema::new("BookWithYear").column("published_year", FieldType::Int))
        .model(ModelSchema::new("AuthorAddress").column("address", FieldType::String))
        .model(ModelSchema::new("Author2").column("name", FieldType::String))
        .foreign_key(ForeignKey::new("Author", "first_book", "Book").related_name("first_time_authors"))
        .many_to_many(ManyToMany::new("Book", "authors", "Author").related_name("books"))
        .many_to_many(ManyToMany::new("Reader", "books_read", "Book").related_name("read_by"))
        .foreign_key(ForeignKey::one_to_one("Bio", "author", "Author"))
        .many_to_many(ManyToMany::new("Bio", "books", "Book").related_name("bios"))
        .foreign_key(ForeignKey::one_to_one("BookWithYear", "book", "Book").related_name("bookwithyear"))
        .foreign_key(
            ForeignKey::new("AuthorAddress", "author", "Author")
                .to_field("name")
                .related_name("addresses"),
        )
        .many_to_many(
            ManyToMany::new("Author", "favorite_authors", "Author")
                .related_name("favors_me")
                .through("prefetch_related_favoriteauthors", "author_id", "likes_author_id")
                .keys("name", "name"),
        )
        .foreign_key(ForeignKey::new("Author2", "first_book", "Book").related_name("first_time_authors2"))
        .many_to_many(ManyToMany::new("Author2", "favorite_books", "Book").related_name("favorite_books_of"))
        // Houses
        .model(
            ModelSchema::new("Person")
                .column("name", FieldType::String)
                .computed("primary_house", Some("House"), |session, person| {
                    let mut best: Option<(usize, Record)> = None;
                    for house in session.related_many(person, "houses")? {
                        let rooms = session.related_many(&house, "rooms")?.len();
                        match &best {
                            Some((most, _)) if *most >= rooms => {}
                            _ => best = Some((rooms, house)),
                        }
                    }
                    Ok(Attr::One(best.map(|(_, house)| house)))
                })
                .computed("all_houses", Some("House"), |session, person| {
                    session.related_many(person, "houses").map(Attr::Many)
                }),
        )
        .model(
            ModelSchema::new("House")
                .column("name", FieldType::String)
                .column("address", FieldType::String),
        )
        .model(ModelSchema::new("Room").column("name", FieldType::String))
        .foreign_key(ForeignKey::new("House", "owner", "Person").nullable().related_name("owned_houses"))
        .foreign_key(ForeignKey::one_to_one("House", "main_room", "Room").nullable().related_name("main_room_of"))
        .foreign_key(ForeignKey::new("Room", "house", "House").related_name("rooms"))
        .many_to_many(ManyToMany::new("Person", "houses", "House").related_name("occupants"))
        // Generic relations
        .model(
            ModelSchema::new("TaggedItem")
                .column("tag", FieldType::String)
                .nullable_column("created_by_ct", FieldType::String)
                .nullable_column("created_by_fkey", FieldType::Int)
                .nullable_column("favorite_ct", FieldType::String)
                .nullable_column("favorite_fkey", FieldType::String),
        )
        .model(ModelSchema::new("Bookmark").column("url", FieldType::String))
        .model(
            ModelSchema::new("Comment")
                .column("comment", FieldType::String)
                .column("object_pk", FieldType::String),
        )
        .generic_foreign_key(GenericForeignKey::new("TaggedItem", "content_object"))
        .generic_foreign_key(GenericForeignKey::new("TaggedItem", "created_by").columns("created_by_ct", "created_by_fkey"))
        .generic_foreign_key(GenericForeignKey::new("TaggedItem", "favorite").columns("favorite_ct", "favorite_fkey"))
        .generic_foreign_key(GenericForeignKey::new("Comment", "content_object").columns("content_type", "object_pk"))
        .generic_relation(GenericRelation::new("Bookmark", "tags", "TaggedItem"))
        .generic_relation(GenericRelation::new("Book", "tags", "TaggedItem"))
        .generic_relation(GenericRelation::new("Reader", "tags", "TaggedItem"))
        .generic_relation(
            GenericRelation::new("Bookmark", "favorite_tags", "TaggedItem").columns("favorite_ct", "favorite_fkey"),
        )
        // Default manager prefetches
        .model(ModelSchema::new("Qualification").column("name", FieldType::String))
        .model(
            ModelSchema::new("Teacher")
                .column("name", FieldType::String)
                .prefetch_by_default(["qualifications"]),
        )
        .model(ModelSchema::new("Department").column("name", FieldType::String))
        .many_to_many(ManyToMany::new("Teacher", "qualifications", "Qualification"))
        .many_to_many(ManyToMany::new("Department", "teachers", "Teacher"))
        // Nullable self reference
        .model(ModelSchema::new("Employee").column("name", FieldType::String))
        .foreign_key(ForeignKey::new("Employee", "boss", "Employee").nullable().related_name("serfs"))
        // Explicit primary keys
        .model(
            ModelSchema::new("LessonEntry")
                .column("name1", FieldType::String)
                .column("name2", FieldType::String),
        )
        .model(ModelSchema::new("WordEntry").column("name", FieldType::String))
        .foreign_key(ForeignKey::new("WordEntry", "lesson_entry", "LessonEntry"))
        .build()
        .expect("test schema is valid")
}

/// A session over a fresh in-memory database.
pub struct Db {
    pub schema: Arc<Schema>,
    pub engine: Arc<InMemoryEngine>,
    pub session: Session,
}

impl Db {
    pub fn new() -> Self {
        Self::with_config(PrefetchConfig::default())
    }

    pub fn with_config(config: PrefetchConfig) -> Self {
        let schema = Arc::new(schema());
        let engine = Arc::new(InMemoryEngine::new(schema.clone()));
        let session = Session::with_config(schema.clone(), engine.clone(), config);
        Self {
            schema,
            engine,
            session,
        }
    }

    pub fn insert<const N: usize>(&self, model: &str, values: [(&str, Value); N]) -> Record {
        self.engine.insert(model, values).expect("insert succeeds")
    }

    pub fn update(&self, record: &Record, column: &str, value: Value) {
        self.engine.update(record, column, value).expect("update succeeds");
    }

    pub fn link(&self, model: &str, relation: &str, from: &Record, to: &[&Record]) {
        for target in to {
            self.engine.link(model, relation, from, target).expect("link succeeds");
        }
    }

    /// Run `f` and return its result with the number of queries it issued.
    pub fn counting<T>(&self, f: impl FnOnce() -> T) -> (T, usize) {
        let before = self.engine.query_count();
        let result = f();
        (result, self.engine.query_count() - before)
    }

    pub fn fetch(&self, queryset: QuerySet) -> Vec<Record> {
        self.session.fetch(&queryset).expect("fetch succeeds")
    }

    pub fn many(&self, record: &Record, relation: &str) -> Vec<Record> {
        self.session.related_many(record, relation).expect("relation readable")
    }

    pub fn one(&self, record: &Record, relation: &str) -> Option<Record> {
        self.session.related_one(record, relation).expect("relation readable")
    }

    pub fn attr_records(&self, record: &Record, name: &str) -> Vec<Record> {
        self.session.attr(record, name).expect("attribute readable").into_records()
    }
}

/// A string column of each record.
pub fn strings(records: &[Record], column: &str) -> Vec<String> {
    records
        .iter()
        .map(|r| match r.get(column) {
            Some(Value::String(s)) => s.to_string(),
            other => panic!("{:?} has no string {}: {:?}", r, column, other),
        })
        .collect()
}

/// Tag `target` through the `content_object` pointer.
pub fn tag(db: &Db, tag: &str, target: &Record) -> Record {
    db.insert(
        "TaggedItem",
        [
            ("tag", Value::from(tag)),
            ("content_type", Value::from(target.model())),
            ("object_id", target.pk()),
        ],
    )
}

/// A record and whatever was reached from it.
#[derive(Debug, PartialEq)]
pub struct Reached {
    pub record: Record,
    pub related: Vec<Reached>,
}

/// Follow each attribute path from every record, skipping single-valued
/// relations that do not exist.
pub fn traverse(session: &Session, records: &[Record], paths: &[&[&str]]) -> Vec<Reached> {
    records
        .iter()
        .map(|record| {
            let mut related = Vec::new();
            for path in paths {
                let Some((first, rest)) = path.split_first() else {
                    continue;
                };
                match session.attr(record, first) {
                    Ok(value) => related.extend(traverse(session, &value.into_records(), &[rest])),
                    Err(e) if e.is_does_not_exist() => continue,
                    Err(e) => panic!("traversing {} failed: {}", first, e),
                }
            }
            Reached {
                record: record.clone(),
                related,
            }
        })
        .collect()
}

/// Books, authors and readers.
pub struct Library {
    pub db: Db,
    pub books: Vec<Record>,
    pub authors: Vec<Record>,
    pub readers: Vec<Record>,
}

impl Library {
    pub fn new() -> Self {
        Self::with_db(Db::new())
    }

    pub fn with_db(db: Db) -> Self {
        let books: Vec<Record> = ["Poems", "Jane Eyre", "Wuthering Heights", "Sense and Sensibility"]
            .into_iter()
            .map(|title| db.insert("Book", [("title", Value::from(title))]))
            .collect();

        let authors: Vec<Record> = [
            ("Charlotte", &books[0]),
            ("Anne", &books[0]),
            ("Emily", &books[0]),
            ("Jane", &books[3]),
        ]
        .into_iter()
        .map(|(name, first)| {
            db.insert("Author", [("name", Value::from(name)), ("first_book_id", first.pk())])
        })
        .collect();

        db.link("Book", "authors", &books[0], &[&authors[0], &authors[1], &authors[2]]);
        db.link("Book", "authors", &books[1], &[&authors[0]]);
        db.link("Book", "authors", &books[2], &[&authors[2]]);
        db.link("Book", "authors", &books[3], &[&authors[3]]);

        let readers: Vec<Record> = ["Amy", "Belinda"]
            .into_iter()
            .map(|name| db.insert("Reader", [("name", Value::from(name))]))
            .collect();
        db.link("Reader", "books_read", &readers[0], &[&books[0], &books[3]]);
        db.link("Reader", "books_read", &readers[1], &[&books[1], &books[3]]);

        db.engine.reset_queries();
        Self {
            db,
            books,
            authors,
            readers,
        }
    }
}

/// People, their houses and the rooms in them.
pub struct Estate {
    pub db: Db,
    pub people: Vec<Record>,
    pub houses: Vec<Record>,
    pub rooms: Vec<Vec<Record>>,
}

impl Estate {
    /// Two people with two houses each; every house has three rooms.
    pub fn new() -> Self {
        Self::build(&[3, 3, 3, 3])
    }

    /// Like [`Estate::new`] with the given number of rooms per house.
    pub fn build(room_counts: &[usize; 4]) -> Self {
        let db = Db::new();
        let people = vec![
            db.insert("Person", [("name", Value::from("Joe"))]),
            db.insert("Person", [("name", Value::from("Mary"))]),
        ];
        let addresses = ["123 Main St", "45 Side St", "6 Downing St", "7 Regents St"];

        let mut houses = Vec::new();
        let mut rooms = Vec::new();
        for (i, address) in addresses.into_iter().enumerate() {
            let owner = &people[i / 2];
            let house = db.insert(
                "House",
                [
                    ("name", Value::from(format!("House {}", i + 1))),
                    ("address", Value::from(address)),
                    ("owner_id", owner.pk()),
                ],
            );
            let house_rooms: Vec<Record> = ["Dining room", "Lounge", "Kitchen"]
                .into_iter()
                .take(room_counts[i])
                .map(|name| db.insert("Room", [("name", Value::from(name)), ("house_id", house.pk())]))
                .collect();
            db.update(&house, "main_room_id", house_rooms[0].pk());
            db.link("Person", "houses", owner, &[&house]);
            houses.push(house);
            rooms.push(house_rooms);
        }

        db.engine.reset_queries();
        Self {
            db,
            people,
            houses,
            rooms,
        }
    }
}
