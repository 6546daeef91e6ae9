//! Static table descriptors for the synced tables.
//!
//! `TABLES` is listed in dependency order: a table only references tables
//! that appear before it. Export and import both walk this list.
//!
//! Some export sources serialize keys camelCased alongside (or instead of)
//! the snake_case column name. Each field declares that alternate spelling
//! so normalization is a table lookup rather than key guessing.

use tracing::warn;

use crate::sync::types::Record;

/// A declared column and its alternate serialized spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub alias: Option<&'static str>,
}

const fn field(name: &'static str) -> FieldSpec {
    FieldSpec { name, alias: None }
}

const fn aliased(name: &'static str, alias: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        alias: Some(alias),
    }
}

/// Descriptor for one synced table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    /// Natural key used for conflict detection.
    pub conflict_key: &'static [&'static str],
    /// Tables this one holds foreign keys into.
    pub depends_on: &'static [&'static str],
}

/// Synced tables in dependency order.
pub const TABLES: &[TableSchema] = &[
    TableSchema {
        name: "keywords",
        fields: &[
            field("id"),
            field("term"),
            aliased("is_active", "isActive"),
            aliased("created_at", "createdAt"),
        ],
        conflict_key: &["term"],
        depends_on: &[],
    },
    TableSchema {
        name: "authors",
        fields: &[
            field("id"),
            field("platform"),
            aliased("platform_id", "platformId"),
            field("handle"),
            aliased("display_name", "displayName"),
            aliased("follower_count", "followerCount"),
            aliased("created_at", "createdAt"),
        ],
        conflict_key: &["platform", "platform_id"],
        depends_on: &[],
    },
    TableSchema {
        name: "content_items",
        fields: &[
            field("id"),
            aliased("author_id", "authorId"),
            field("platform"),
            aliased("platform_id", "platformId"),
            field("body"),
            field("url"),
            aliased("posted_at", "postedAt"),
            field("classification"),
            field("confidence"),
            aliased("created_at", "createdAt"),
        ],
        conflict_key: &["platform", "platform_id"],
        depends_on: &["authors"],
    },
    TableSchema {
        name: "engagement_snapshots",
        fields: &[
            field("id"),
            aliased("content_item_id", "contentItemId"),
            field("likes"),
            field("shares"),
            field("replies"),
            field("views"),
            aliased("captured_at", "capturedAt"),
        ],
        conflict_key: &["id"],
        depends_on: &["content_items"],
    },
];

/// Look up a table descriptor by name.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static TableSchema> {
    TABLES.iter().find(|t| t.name == name)
}

/// Whether a table name is in the registry.
#[must_use]
pub fn is_known(name: &str) -> bool {
    lookup(name).is_some()
}

/// Registry table names in dependency order.
#[must_use]
pub fn table_names() -> Vec<&'static str> {
    TABLES.iter().map(|t| t.name).collect()
}

/// Check that every dependency is listed before its dependent.
///
/// Returns the first offending `(table, dependency)` pair.
pub fn check_dependency_order(tables: &[TableSchema]) -> Result<(), (&'static str, &'static str)> {
    for (i, table) in tables.iter().enumerate() {
        for dep in table.depends_on {
            if !tables[..i].iter().any(|t| t.name == *dep) {
                return Err((table.name, *dep));
            }
        }
    }
    Ok(())
}

impl TableSchema {
    /// Whether `column` is declared for this table.
    #[must_use]
    pub fn has_field(&self, column: &str) -> bool {
        self.fields.iter().any(|f| f.name == column)
    }

    /// Normalize a record to canonical column names.
    ///
    /// - canonical and alias both present: the alias is dropped
    /// - only the alias present: it is renamed to the canonical name
    /// - undeclared fields are dropped
    ///
    /// Returns the number of undeclared fields removed.
    pub fn normalize(&self, record: &mut Record) -> usize {
        for spec in self.fields {
            let Some(alias) = spec.alias else { continue };
            if let Some(value) = record.remove(alias) {
                if !record.contains_key(spec.name) {
                    record.insert(spec.name.to_string(), value);
                }
            }
        }

        let before = record.len();
        record.retain(|key, _| self.has_field(key));
        before - record.len()
    }

    /// Normalize every record, logging undeclared fields once per table.
    pub fn normalize_all(&self, records: &mut [Record]) {
        let dropped: usize = records.iter_mut().map(|r| self.normalize(r)).sum();
        if dropped > 0 {
            warn!(table = self.name, dropped, "Dropped undeclared fields during normalization");
        }
    }
}
