//! Schema catalog - table descriptors and column definitions
//!
//! Every table has an auto-incrementing `id` primary key, a type-checked
//! identity column, and (below the root) an integer foreign key to its parent
//! with `ON DELETE CASCADE ON UPDATE CASCADE`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// The four entity tables, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Authors,
    Collections,
    Cards,
    Tags,
}

impl Table {
    /// Get the SQL table name
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Authors => "authors",
            Table::Collections => "collections",
            Table::Cards => "cards",
            Table::Tags => "tags",
        }
    }

    /// Get all tables, parents before children
    pub fn all() -> &'static [Table] {
        &[Table::Authors, Table::Collections, Table::Cards, Table::Tags]
    }

    /// The table this one hangs off, if any
    pub fn parent(&self) -> Option<Table> {
        match self {
            Table::Authors => None,
            Table::Collections => Some(Table::Authors),
            Table::Cards => Some(Table::Collections),
            Table::Tags => Some(Table::Cards),
        }
    }

    /// Foreign-key column pointing at the parent table
    pub fn parent_key(&self) -> Option<&'static str> {
        match self {
            Table::Authors => None,
            Table::Collections => Some("author_id"),
            Table::Cards => Some("collection_id"),
            Table::Tags => Some("card_id"),
        }
    }

    /// User-facing column that identifies a row within its parent
    pub fn identity_column(&self) -> &'static str {
        match self {
            Table::Authors => "name",
            Table::Collections => "title",
            Table::Cards => "created_at",
            Table::Tags => "text",
        }
    }
}

impl FromStr for Table {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "authors" | "author" => Ok(Table::Authors),
            "collections" | "collection" => Ok(Table::Collections),
            "cards" | "card" => Ok(Table::Cards),
            "tags" | "tag" => Ok(Table::Tags),
            _ => Err(crate::Error::Validation(format!("Unknown table: {}", s))),
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a definition entry is a real column or a table-level constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Column,
    Constraint,
}

/// One entry of a table definition: `<name> <definition>`.
///
/// Table-level constraints (`FOREIGN KEY (x)`, `UNIQUE`) share the same shape so
/// the statement builder can render the whole definition in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub definition: String,
    pub kind: DefinitionKind,
}

impl ColumnDef {
    pub fn column(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            kind: DefinitionKind::Column,
        }
    }

    pub fn constraint(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            kind: DefinitionKind::Constraint,
        }
    }

    pub fn is_column(&self) -> bool {
        self.kind == DefinitionKind::Column
    }

    /// Render as it appears inside `CREATE TABLE (...)`
    pub fn render(&self) -> String {
        if self.definition.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.definition)
        }
    }
}

/// SQLite CHECK constraint pinning a column to one storage class
pub fn check_type(column: &str, data_type: &str) -> String {
    format!("CHECK(typeof({}) = '{}')", column, data_type)
}

/// REFERENCES clause cascading both deletes and key updates
pub fn references(table: Table, column: &str) -> String {
    format!(
        "REFERENCES {}({}) ON DELETE CASCADE ON UPDATE CASCADE",
        table.as_str(),
        column
    )
}

const PRIMARY_KEY: &str = "INTEGER PRIMARY KEY AUTOINCREMENT";

// Typed columns carry no declared type. A declared type gives the column an
// affinity, and SQLite would convert `5` to `'5'` before the CHECK runs.
fn text_column(name: &str, unique: bool) -> ColumnDef {
    let unique = if unique { "UNIQUE " } else { "" };
    ColumnDef::column(name, format!("{}NOT NULL {}", unique, check_type(name, "text")))
}

fn foreign_key_columns(parent: Table, key: &str) -> [ColumnDef; 2] {
    [
        ColumnDef::column(key, format!("NOT NULL {}", check_type(key, "integer"))),
        ColumnDef::constraint(format!("FOREIGN KEY ({})", key), references(parent, "id")),
    ]
}

fn standard_definition(table: Table) -> Vec<ColumnDef> {
    let mut defs = vec![ColumnDef::column("id", PRIMARY_KEY)];
    let identity = table.identity_column();

    match (table.parent(), table.parent_key()) {
        (Some(parent), Some(key)) => {
            defs.push(text_column(identity, false));
            defs.extend(foreign_key_columns(parent, key));
            defs.push(ColumnDef::constraint(
                "UNIQUE",
                format!("({}, {})", identity, key),
            ));
        }
        _ => defs.push(text_column(identity, true)),
    }

    defs
}

/// Immutable catalog of table definitions.
///
/// Changing a definition produces a new catalog; share it as `Arc<Catalog>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    tables: BTreeMap<Table, Vec<ColumnDef>>,
}

impl Catalog {
    /// Catalog with the standard four-table hierarchy
    pub fn new() -> Self {
        let tables = Table::all()
            .iter()
            .map(|&table| (table, standard_definition(table)))
            .collect();
        Self { tables }
    }

    /// Replace one table's definition, returning a new catalog
    pub fn with_definition(mut self, table: Table, defs: Vec<ColumnDef>) -> Self {
        self.tables.insert(table, defs);
        self
    }

    /// Full ordered definition, constraints included
    pub fn definition_of(&self, table: Table) -> &[ColumnDef] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Real column names in definition order, `id` included
    pub fn columns_of(&self, table: Table) -> Vec<&str> {
        self.definition_of(table)
            .iter()
            .filter(|def| def.is_column())
            .map(|def| def.name.as_str())
            .collect()
    }

    /// Columns a caller may set, i.e. everything but `id`
    pub fn editable_columns(&self, table: Table) -> Vec<&str> {
        self.columns_of(table)
            .into_iter()
            .filter(|&name| name != "id")
            .collect()
    }

    pub fn has_column(&self, table: Table, column: &str) -> bool {
        self.columns_of(table).contains(&column)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_of() {
        let catalog = Catalog::new();
        assert_eq!(catalog.columns_of(Table::Authors), vec!["id", "name"]);
        assert_eq!(
            catalog.columns_of(Table::Collections),
            vec!["id", "title", "author_id"]
        );
        assert_eq!(
            catalog.columns_of(Table::Cards),
            vec!["id", "created_at", "collection_id"]
        );
        assert_eq!(catalog.editable_columns(Table::Tags), vec!["text", "card_id"]);
    }

    #[test]
    fn test_definition_clauses() {
        let catalog = Catalog::new();
        let rendered: Vec<String> = catalog
            .definition_of(Table::Cards)
            .iter()
            .map(ColumnDef::render)
            .collect();

        assert_eq!(rendered[0], "id INTEGER PRIMARY KEY AUTOINCREMENT");
        assert_eq!(
            rendered[1],
            "created_at NOT NULL CHECK(typeof(created_at) = 'text')"
        );
        assert_eq!(
            rendered[3],
            "FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE ON UPDATE CASCADE"
        );
        assert_eq!(rendered[4], "UNIQUE (created_at, collection_id)");
    }

    #[test]
    fn test_author_name_globally_unique() {
        let catalog = Catalog::new();
        let name = &catalog.definition_of(Table::Authors)[1];
        assert!(name.definition.starts_with("UNIQUE NOT NULL"));
    }

    #[test]
    fn test_with_definition_leaves_original_untouched() {
        let original = Catalog::new();
        let changed = original
            .clone()
            .with_definition(Table::Tags, vec![ColumnDef::column("id", PRIMARY_KEY)]);

        assert_eq!(changed.columns_of(Table::Tags), vec!["id"]);
        assert_eq!(original.columns_of(Table::Tags), vec!["id", "text", "card_id"]);
    }

    #[test]
    fn test_table_parse() {
        assert_eq!("tags".parse::<Table>().unwrap(), Table::Tags);
        assert_eq!("Author".parse::<Table>().unwrap(), Table::Authors);
        assert!("logonyms".parse::<Table>().is_err());
        assert_eq!(Table::Cards.parent(), Some(Table::Collections));
        assert_eq!(Table::Authors.parent_key(), None);
    }
}
