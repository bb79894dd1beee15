//! In-memory catalog of the database a query compilation targets.
//!
//! The catalog holds table and column metadata plus the directed
//! relationships between tables. It is populated once, by schema
//! introspection or by hand in tests, and is read-only afterwards;
//! compilations only perform lookups. Lookups are case-sensitive, callers
//! lowercase identifiers before asking.

use std::collections::HashMap;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("table '{0}' is not in the database catalog")]
    TableNotFound(String),

    #[error("no relationship between '{child}' and '{parent}'")]
    RelationshipNotFound { child: String, parent: String },
}

/// Column metadata as introspection populates it. The compiler core only
/// consults existence, the rest travels along for the embedding service.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
}

/// Table metadata. `primary_key` and `tsv_column` stay `None` for tables
/// without a single-column key or a full-text search vector; queries that
/// need them (`id` lookups, `search`) fail at emission time instead.
#[derive(Debug, Clone, Default)]
pub struct TableInfo {
    pub name: String,
    pub columns: HashMap<String, ColumnInfo>,
    pub primary_key: Option<String>,
    pub tsv_column: Option<String>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        TableInfo {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let name = name.into();

        self.columns.insert(
            name.clone(),
            ColumnInfo {
                name,
                data_type: data_type.into(),
                not_null: false,
            },
        );

        self
    }

    pub fn with_primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    pub fn with_tsv_column(mut self, name: impl Into<String>) -> Self {
        self.tsv_column = Some(name.into());
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
}

/// How a child table joins into its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    BelongsTo,
    OneToMany,
    OneToManyThrough,
}

/// One directed relationship edge.
///
/// For `BelongsTo` and `OneToMany` the join predicate is
/// `child.col1 = parent.col2`. For `OneToManyThrough` the `through` table
/// bridges the two: `child.col1 = through.col2` and
/// `through.col_t = parent.col1`.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub kind: RelKind,
    pub col1: String,
    pub col2: String,
    pub through: Option<String>,
    pub col_t: Option<String>,
}

impl Relationship {
    pub fn belongs_to(col1: impl Into<String>, col2: impl Into<String>) -> Self {
        Relationship {
            kind: RelKind::BelongsTo,
            col1: col1.into(),
            col2: col2.into(),
            through: None,
            col_t: None,
        }
    }

    pub fn one_to_many(col1: impl Into<String>, col2: impl Into<String>) -> Self {
        Relationship {
            kind: RelKind::OneToMany,
            col1: col1.into(),
            col2: col2.into(),
            through: None,
            col_t: None,
        }
    }

    pub fn one_to_many_through(
        through: impl Into<String>,
        col1: impl Into<String>,
        col2: impl Into<String>,
        col_t: impl Into<String>,
    ) -> Self {
        Relationship {
            kind: RelKind::OneToManyThrough,
            col1: col1.into(),
            col2: col2.into(),
            through: Some(through.into()),
            col_t: Some(col_t.into()),
        }
    }
}

/// The catalog itself: tables by name and relationships keyed by the
/// directed `(child, parent)` pair.
///
/// The key is directional on purpose. `user.posts` and `post.user` are
/// different edges with different join shapes, so looking up
/// `(child, parent)` must never fall back to the reversed pair.
#[derive(Debug, Default)]
pub struct DbSchema {
    tables: HashMap<String, TableInfo>,
    rel_map: HashMap<(String, String), Relationship>,
}

impl DbSchema {
    pub fn new() -> Self {
        DbSchema::default()
    }

    pub fn add_table(&mut self, table: TableInfo) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn add_relationship(
        &mut self,
        child: impl Into<String>,
        parent: impl Into<String>,
        rel: Relationship,
    ) {
        self.rel_map.insert((child.into(), parent.into()), rel);
    }

    pub fn get_table(&self, name: &str) -> Result<&TableInfo> {
        self.tables
            .get(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn relationship(&self, child: &str, parent: &str) -> Option<&Relationship> {
        self.rel_map
            .get(&(child.to_string(), parent.to_string()))
    }

    pub fn get_relationship(&self, child: &str, parent: &str) -> Result<&Relationship> {
        self.relationship(child, parent)
            .ok_or_else(|| CatalogError::RelationshipNotFound {
                child: child.to_string(),
                parent: parent.to_string(),
            })
    }
}
