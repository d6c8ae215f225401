//! Entity store - get-or-create and CRUD over the catalog tables

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::types::Value;
use tracing::{debug, info};

use super::executor::{self, ErrorMode, Rows};
use super::registry::{ConnectionHandle, ConnectionRegistry};
use super::schema::{Catalog, Table};
use super::statement::{self, WhereClause};
use crate::config::{self, IndexiaConfig};
use crate::entity::{self, Author, Card, Collection, Entity, Tag};
use crate::{Error, Result};

/// Inserts attempted by `get_or_create` before giving up
const MAX_INSERTS: u32 = 1;

/// Outcome of a get-or-create lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Matching rows already existed
    Found(Rows),
    /// No match existed; one row was inserted and read back
    Created(Rows),
}

impl Lookup {
    pub fn rows(&self) -> &Rows {
        match self {
            Lookup::Found(rows) | Lookup::Created(rows) => rows,
        }
    }

    pub fn into_rows(self) -> Rows {
        match self {
            Lookup::Found(rows) | Lookup::Created(rows) => rows,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Lookup::Created(_))
    }
}

/// SQLite-backed card store.
///
/// Owns the connection registry for its lifetime; dropping the store closes
/// every connection it opened.
#[derive(Debug)]
pub struct CardStore {
    db: PathBuf,
    catalog: Arc<Catalog>,
    read_mode: ErrorMode,
    registry: ConnectionRegistry,
}

impl CardStore {
    /// Store for `db`, or the default database path when `None`
    pub fn new(db: Option<PathBuf>) -> Self {
        Self {
            db: db.unwrap_or_else(config::default_database_path),
            catalog: Arc::new(Catalog::new()),
            read_mode: ErrorMode::Lenient,
            registry: ConnectionRegistry::new(),
        }
    }

    pub fn from_config(config: &IndexiaConfig) -> Self {
        Self::new(Some(config.database_path())).with_read_mode(config.read_mode())
    }

    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// How getters treat failed or mis-shaped reads
    pub fn with_read_mode(mut self, mode: ErrorMode) -> Self {
        self.read_mode = mode;
        self
    }

    pub fn db(&self) -> &Path {
        &self.db
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn read_mode(&self) -> ErrorMode {
        self.read_mode
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    // ========== Connections ==========

    /// Open another connection to the store's database
    pub fn open(&mut self) -> Result<ConnectionHandle> {
        let db = self.db.clone();
        self.registry.open(db)
    }

    /// Open a connection to some other database file
    pub fn open_db(&mut self, db: impl AsRef<Path>) -> Result<ConnectionHandle> {
        self.registry.open(db)
    }

    pub fn close(&mut self, db: impl AsRef<Path>) -> Result<()> {
        self.registry.close(db)
    }

    pub fn close_all(&mut self) -> Result<()> {
        self.registry.close_all()
    }

    // ========== Get-or-create ==========

    /// Create `table` if it does not exist yet
    pub fn ensure_table(&self, conn: &ConnectionHandle, table: Table) -> Result<()> {
        let create = statement::create_table(table.as_str(), self.catalog.definition_of(table))?;
        executor::execute(conn, &create, table.as_str())?;
        Ok(())
    }

    /// Return the rows matching `columns = values`, inserting one row first if none match
    pub fn get_or_create(
        &self,
        conn: &ConnectionHandle,
        table: Table,
        columns: &[&str],
        values: &[Value],
    ) -> Result<Lookup> {
        self.get_or_create_with(conn, table, columns, values, true)
    }

    /// `get_or_create`; with `retry` off an empty lookup fails without inserting
    pub fn get_or_create_with(
        &self,
        conn: &ConnectionHandle,
        table: Table,
        columns: &[&str],
        values: &[Value],
        retry: bool,
    ) -> Result<Lookup> {
        self.ensure_table(conn, table)?;

        let filter = statement::where_eq(columns, values)?;
        let select = statement::select(table.as_str(), &[], &filter);
        let max_inserts = if retry { MAX_INSERTS } else { 0 };
        let mut inserts = 0;

        loop {
            let rows = executor::run(conn, &select, None, ErrorMode::Strict)?;
            if !rows.is_empty() {
                return Ok(if inserts == 0 {
                    Lookup::Found(rows)
                } else {
                    Lookup::Created(rows)
                });
            }

            if inserts >= max_inserts {
                return Err(Error::NotFound {
                    table: table.to_string(),
                    predicate: filter.describe(),
                });
            }

            self.insert_row(conn, table, columns, values)?;
            inserts += 1;
        }
    }

    /// Bare single-row insert; only get-or-create creates rows
    pub(crate) fn insert_row(
        &self,
        conn: &ConnectionHandle,
        table: Table,
        columns: &[&str],
        values: &[Value],
    ) -> Result<usize> {
        let insert = statement::insert(table.as_str(), columns, &[values.to_vec()])?;
        let inserted = executor::execute(conn, &insert, table.as_str())?;
        debug!("Inserted {} row into {}", inserted, table);
        Ok(inserted)
    }

    fn add<E: Entity>(
        &self,
        conn: &ConnectionHandle,
        columns: &[&str],
        values: &[Value],
    ) -> Result<E> {
        let lookup = self.get_or_create(conn, E::TABLE, columns, values)?;
        E::single(lookup.rows())
    }

    pub fn add_author(&self, conn: &ConnectionHandle, name: &str) -> Result<Author> {
        self.add(conn, &["name"], &[Value::Text(name.to_string())])
    }

    pub fn add_collection(
        &self,
        conn: &ConnectionHandle,
        author: &Author,
        title: &str,
    ) -> Result<Collection> {
        self.add(
            conn,
            &["title", "author_id"],
            &[Value::Text(title.to_string()), Value::Integer(author.id)],
        )
    }

    /// Get or create a card; `created_at` must be `yyyy-mm-dd-HH-MM`
    pub fn add_card(
        &self,
        conn: &ConnectionHandle,
        collection: &Collection,
        created_at: &str,
    ) -> Result<Card> {
        entity::parse_card_timestamp(created_at)?;
        self.add(
            conn,
            &["created_at", "collection_id"],
            &[Value::Text(created_at.to_string()), Value::Integer(collection.id)],
        )
    }

    pub fn add_tag(&self, conn: &ConnectionHandle, card: &Card, text: &str) -> Result<Tag> {
        self.add(
            conn,
            &["text", "card_id"],
            &[Value::Text(text.to_string()), Value::Integer(card.id)],
        )
    }

    // ========== Read / update / delete ==========

    /// Rows with the given id; empty when absent
    pub fn get_by_id(&self, conn: &ConnectionHandle, table: Table, id: i64) -> Result<Rows> {
        let filter = statement::where_eq(&["id"], &[Value::Integer(id)])?;
        self.read(conn, table, &filter)
    }

    /// Typed `get_by_id`
    pub fn fetch<E: Entity>(&self, conn: &ConnectionHandle, id: i64) -> Result<Option<E>> {
        let rows = self.get_by_id(conn, E::TABLE, id)?;
        rows.first().map(E::from_row).transpose()
    }

    /// Delete by id and return the affected-row count; 0 means already gone
    pub fn delete(&self, conn: &ConnectionHandle, table: Table, id: i64) -> Result<usize> {
        let filter = statement::where_eq(&["id"], &[Value::Integer(id)])?;
        let delete = statement::delete(table.as_str(), &filter);
        let deleted = executor::execute(conn, &delete, table.as_str())?;
        info!("Deleted {} row(s) from {} where id = {}", deleted, table, id);
        Ok(deleted)
    }

    /// Set columns on matching rows and return the affected-row count
    pub fn update(
        &self,
        conn: &ConnectionHandle,
        table: Table,
        set_columns: &[&str],
        set_values: &[Value],
        where_columns: &[&str],
        where_values: &[Value],
    ) -> Result<usize> {
        if let Some(column) = set_columns
            .iter()
            .chain(where_columns)
            .find(|&&column| !self.catalog.has_column(table, column))
        {
            return Err(Error::Validation(format!(
                "{} has no column {}",
                table, column
            )));
        }

        let filter = statement::where_eq(where_columns, where_values)?;
        let update = statement::update(table.as_str(), set_columns, set_values, &filter)?;
        let updated = executor::execute(conn, &update, table.as_str())?;
        info!("Updated {} row(s) in {} where {}", updated, table, filter.describe());
        Ok(updated)
    }

    // ========== Getters ==========

    /// SELECT * under the store's read mode, shaped to the catalog's columns
    pub(crate) fn read(
        &self,
        conn: &ConnectionHandle,
        table: Table,
        filter: &WhereClause,
    ) -> Result<Rows> {
        let select = statement::select(table.as_str(), &[], filter);
        let expected = self.catalog.columns_of(table);
        executor::run(conn, &select, Some(expected.as_slice()), self.read_mode)
    }

    fn children<E: Entity>(
        &self,
        conn: &ConnectionHandle,
        parent: Option<(&str, i64)>,
        narrow: Option<(&str, &str)>,
    ) -> Result<Vec<E>> {
        let mut columns = Vec::new();
        let mut values = Vec::new();
        if let Some((key, id)) = parent {
            columns.push(key);
            values.push(Value::Integer(id));
        }
        if let Some((column, value)) = narrow {
            columns.push(column);
            values.push(Value::Text(value.to_string()));
        }

        let filter = if columns.is_empty() {
            WhereClause::default()
        } else {
            statement::where_eq(&columns, &values)?
        };
        E::from_rows(&self.read(conn, E::TABLE, &filter)?)
    }

    /// All authors, or only the one named `name`
    pub fn authors(&self, conn: &ConnectionHandle, name: Option<&str>) -> Result<Vec<Author>> {
        self.children(conn, None, name.map(|n| ("name", n)))
    }

    /// Collections of `author`, optionally narrowed to one title
    pub fn collections(
        &self,
        conn: &ConnectionHandle,
        author: &Author,
        title: Option<&str>,
    ) -> Result<Vec<Collection>> {
        self.children(
            conn,
            Some(("author_id", author.id)),
            title.map(|t| ("title", t)),
        )
    }

    /// Cards in `collection`, optionally narrowed to one timestamp
    pub fn cards(
        &self,
        conn: &ConnectionHandle,
        collection: &Collection,
        created_at: Option<&str>,
    ) -> Result<Vec<Card>> {
        self.children(
            conn,
            Some(("collection_id", collection.id)),
            created_at.map(|c| ("created_at", c)),
        )
    }

    /// Tags on `card`, optionally narrowed to one text
    pub fn tags(
        &self,
        conn: &ConnectionHandle,
        card: &Card,
        text: Option<&str>,
    ) -> Result<Vec<Tag>> {
        self.children(conn, Some(("card_id", card.id)), text.map(|t| ("text", t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CardStore, ConnectionHandle) {
        let dir = TempDir::new().unwrap();
        let mut store = CardStore::new(Some(dir.path().join("indexia.db")));
        let conn = store.open().unwrap();
        (dir, store, conn)
    }

    fn count(conn: &ConnectionHandle, table: &str) -> i64 {
        conn.with(|c| {
            Ok(c.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
        })
        .unwrap()
    }

    fn table_names(conn: &ConnectionHandle) -> Vec<String> {
        conn.with(|c| {
            let mut stmt = c.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name != 'sqlite_sequence' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(names)
        })
        .unwrap()
    }

    #[test]
    fn test_add_author_idempotent() {
        let (_dir, store, conn) = setup();

        let first = store.add_author(&conn, "ada").unwrap();
        let second = store.add_author(&conn, "ada").unwrap();
        assert_eq!(first, second);
        assert_eq!(count(&conn, "authors"), 1);
    }

    #[test]
    fn test_lookup_reports_creation() {
        let (_dir, store, conn) = setup();
        let values = [Value::Text("ada".into())];

        let created = store.get_or_create(&conn, Table::Authors, &["name"], &values).unwrap();
        assert!(created.was_created());
        let found = store.get_or_create(&conn, Table::Authors, &["name"], &values).unwrap();
        assert!(!found.was_created());
        assert_eq!(created.rows(), found.rows());
    }

    #[test]
    fn test_tables_created_lazily() {
        let (_dir, store, conn) = setup();
        assert!(table_names(&conn).is_empty());

        store.add_author(&conn, "ada").unwrap();
        assert_eq!(table_names(&conn), vec!["authors"]);
    }

    #[test]
    fn test_collection_unique_per_author() {
        let (_dir, store, conn) = setup();
        let ada = store.add_author(&conn, "ada").unwrap();
        let grace = store.add_author(&conn, "grace").unwrap();

        let first = store.add_collection(&conn, &ada, "notes").unwrap();
        let again = store.add_collection(&conn, &ada, "notes").unwrap();
        assert_eq!(first, again);

        let other = store.add_collection(&conn, &grace, "notes").unwrap();
        assert_ne!(first.id, other.id);
        assert_eq!(count(&conn, "collections"), 2);
    }

    #[test]
    fn test_get_by_id_roundtrip() {
        let (_dir, store, conn) = setup();
        let ada = store.add_author(&conn, "ada").unwrap();
        let notes = store.add_collection(&conn, &ada, "notes").unwrap();

        let rows = store.get_by_id(&conn, Table::Collections, notes.id).unwrap();
        assert_eq!(Collection::single(&rows).unwrap(), notes);
        assert_eq!(store.fetch::<Author>(&conn, ada.id).unwrap(), Some(ada));
        assert_eq!(store.fetch::<Author>(&conn, 99).unwrap(), None);
    }

    #[test]
    fn test_get_by_id_before_table_exists() {
        let (_dir, store, conn) = setup();
        let rows = store.get_by_id(&conn, Table::Tags, 1).unwrap();
        assert!(rows.is_empty());
        assert_eq!(rows.columns(), &["id", "text", "card_id"]);

        let strict =
            CardStore::new(Some(store.db().to_path_buf())).with_read_mode(ErrorMode::Strict);
        assert!(matches!(
            strict.get_by_id(&conn, Table::Tags, 1),
            Err(Error::Query(_))
        ));
    }

    #[test]
    fn test_end_to_end() {
        let (_dir, store, conn) = setup();

        let ada = store.add_author(&conn, "ada").unwrap();
        let notes = store.add_collection(&conn, &ada, "notes").unwrap();
        let card = store.add_card(&conn, &notes, "2024-01-01-00-00").unwrap();
        store.add_tag(&conn, &card, "idea").unwrap();

        let tags = store.tags(&conn, &card, None).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].text, "idea");
        assert_eq!(tags[0].card_id, card.id);

        assert_eq!(store.delete(&conn, Table::Authors, ada.id).unwrap(), 1);
        assert!(store.get_by_id(&conn, Table::Collections, notes.id).unwrap().is_empty());
    }

    #[test]
    fn test_cascade_delete() {
        let (_dir, store, conn) = setup();
        let ada = store.add_author(&conn, "ada").unwrap();
        let notes = store.add_collection(&conn, &ada, "notes").unwrap();
        let card = store.add_card(&conn, &notes, "2024-01-01-00-00").unwrap();
        let tag = store.add_tag(&conn, &card, "idea").unwrap();

        store.delete(&conn, Table::Authors, ada.id).unwrap();

        for table in ["collections", "cards", "tags"] {
            assert_eq!(count(&conn, table), 0, "{} not cascaded", table);
        }
        assert_eq!(store.delete(&conn, Table::Collections, notes.id).unwrap(), 0);
        assert_eq!(store.delete(&conn, Table::Cards, card.id).unwrap(), 0);
        assert_eq!(store.delete(&conn, Table::Tags, tag.id).unwrap(), 0);
    }

    #[test]
    fn test_primary_key_update_cascades() {
        let (_dir, store, conn) = setup();
        let ada = store.add_author(&conn, "ada").unwrap();
        let notes = store.add_collection(&conn, &ada, "notes").unwrap();
        let card = store.add_card(&conn, &notes, "2024-01-01-00-00").unwrap();

        let updated = store
            .update(
                &conn,
                Table::Collections,
                &["id"],
                &[Value::Integer(42)],
                &["id"],
                &[Value::Integer(notes.id)],
            )
            .unwrap();
        assert_eq!(updated, 1);

        let moved = store.fetch::<Card>(&conn, card.id).unwrap().unwrap();
        assert_eq!(moved.collection_id, 42);
        let renumbered = store.fetch::<Collection>(&conn, 42).unwrap().unwrap();
        assert_eq!(store.cards(&conn, &renumbered, None).unwrap(), vec![moved]);
    }

    #[test]
    fn test_update_no_match_is_zero() {
        let (_dir, store, conn) = setup();
        store.add_author(&conn, "ada").unwrap();

        let updated = store
            .update(
                &conn,
                Table::Authors,
                &["name"],
                &[Value::Text("grace".into())],
                &["name"],
                &[Value::Text("nobody".into())],
            )
            .unwrap();
        assert_eq!(updated, 0);
    }

    #[test]
    fn test_update_validation() {
        let (_dir, store, conn) = setup();
        store.add_author(&conn, "ada").unwrap();

        let unknown = store.update(
            &conn,
            Table::Authors,
            &["pseudonym"],
            &[Value::Text("x".into())],
            &["id"],
            &[Value::Integer(1)],
        );
        assert!(matches!(unknown, Err(Error::Validation(_))));

        let mismatched = store.update(
            &conn,
            Table::Authors,
            &["name"],
            &[],
            &["id"],
            &[Value::Integer(1)],
        );
        assert!(matches!(mismatched, Err(Error::Validation(_))));
    }

    #[test]
    fn test_update_into_existing_name_conflicts() {
        let (_dir, store, conn) = setup();
        store.add_author(&conn, "ada").unwrap();
        let grace = store.add_author(&conn, "grace").unwrap();

        let result = store.update(
            &conn,
            Table::Authors,
            &["name"],
            &[Value::Text("ada".into())],
            &["id"],
            &[Value::Integer(grace.id)],
        );
        assert!(matches!(result, Err(Error::Conflict { .. })));
    }

    #[test]
    fn test_retry_exhaustion_is_not_found() {
        let (_dir, store, conn) = setup();
        store.ensure_table(&conn, Table::Authors).unwrap();
        conn.with(|c| {
            c.execute_batch(
                "CREATE TRIGGER swallow AFTER INSERT ON authors BEGIN DELETE FROM authors WHERE id = NEW.id; END;",
            )?;
            Ok(())
        })
        .unwrap();

        let err = store.add_author(&conn, "ghost").unwrap_err();
        match err {
            Error::NotFound { table, predicate } => {
                assert_eq!(table, "authors");
                assert_eq!(predicate, "name = 'ghost'");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_no_retry_does_not_insert() {
        let (_dir, store, conn) = setup();
        let result = store.get_or_create_with(
            &conn,
            Table::Authors,
            &["name"],
            &[Value::Text("ada".into())],
            false,
        );
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(count(&conn, "authors"), 0);
    }

    #[test]
    fn test_duplicate_insert_conflicts() {
        let (_dir, store, conn) = setup();
        store.add_author(&conn, "ada").unwrap();

        let err = store
            .insert_row(&conn, Table::Authors, &["name"], &[Value::Text("ada".into())])
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { ref table, .. } if table == "authors"));
    }

    #[test]
    fn test_type_constraint_violation() {
        let (_dir, store, conn) = setup();
        let result = store.get_or_create(
            &conn,
            Table::Authors,
            &["name"],
            &[Value::Blob(vec![0xde, 0xad])],
        );
        assert!(matches!(result, Err(Error::TypeConstraintViolation { .. })));
        assert_eq!(count(&conn, "authors"), 0);
    }

    #[test]
    fn test_no_affinity_coercion() {
        let (_dir, store, conn) = setup();
        let ada = store.add_author(&conn, "ada").unwrap();
        let notes = store.add_collection(&conn, &ada, "notes").unwrap();

        let created = store.get_or_create(&conn, Table::Authors, &["name"], &[Value::Integer(77)]);
        assert!(matches!(created, Err(Error::TypeConstraintViolation { .. })));

        let renamed = store.update(
            &conn,
            Table::Authors,
            &["name"],
            &[Value::Integer(5)],
            &["id"],
            &[Value::Integer(ada.id)],
        );
        assert!(matches!(renamed, Err(Error::TypeConstraintViolation { .. })));

        let moved = store.update(
            &conn,
            Table::Collections,
            &["author_id"],
            &[Value::Text(ada.id.to_string())],
            &["id"],
            &[Value::Integer(notes.id)],
        );
        assert!(matches!(moved, Err(Error::TypeConstraintViolation { .. })));

        let stored = conn
            .with(|c| {
                Ok(c.query_row(
                    "SELECT typeof(name), typeof(author_id) FROM authors \
                     JOIN collections ON collections.author_id = authors.id",
                    [],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!(stored, ("text".to_string(), "integer".to_string()));
        assert_eq!(count(&conn, "authors"), 1);
    }

    #[test]
    fn test_missing_parent_is_foreign_key_error() {
        let (_dir, store, conn) = setup();
        store.ensure_table(&conn, Table::Authors).unwrap();
        let phantom = Author { id: 7, name: "phantom".into() };

        let result = store.add_collection(&conn, &phantom, "notes");
        assert!(matches!(result, Err(Error::ForeignKey { .. })));
    }

    #[test]
    fn test_invalid_card_timestamp() {
        let (_dir, store, conn) = setup();
        let ada = store.add_author(&conn, "ada").unwrap();
        let notes = store.add_collection(&conn, &ada, "notes").unwrap();

        let result = store.add_card(&conn, &notes, "last tuesday");
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(store.cards(&conn, &notes, None).unwrap().is_empty());
    }

    #[test]
    fn test_getters_narrow() {
        let (_dir, store, conn) = setup();
        let ada = store.add_author(&conn, "ada").unwrap();
        store.add_author(&conn, "grace").unwrap();
        let notes = store.add_collection(&conn, &ada, "notes").unwrap();
        store.add_collection(&conn, &ada, "drafts").unwrap();
        let card = store.add_card(&conn, &notes, "2024-01-01-00-00").unwrap();
        store.add_card(&conn, &notes, "2024-01-02-00-00").unwrap();
        store.add_tag(&conn, &card, "idea").unwrap();
        store.add_tag(&conn, &card, "sea").unwrap();

        assert_eq!(store.authors(&conn, None).unwrap().len(), 2);
        assert_eq!(store.authors(&conn, Some("ada")).unwrap(), vec![ada.clone()]);
        assert_eq!(store.collections(&conn, &ada, None).unwrap().len(), 2);
        assert_eq!(store.collections(&conn, &ada, Some("notes")).unwrap(), vec![notes.clone()]);
        assert_eq!(store.cards(&conn, &notes, None).unwrap().len(), 2);
        assert_eq!(
            store.cards(&conn, &notes, Some("2024-01-01-00-00")).unwrap(),
            vec![card.clone()]
        );
        assert_eq!(store.tags(&conn, &card, Some("sea")).unwrap().len(), 1);
        assert!(store.tags(&conn, &card, Some("ice")).unwrap().is_empty());
    }

    #[test]
    fn test_values_are_bound_not_interpolated() {
        let (_dir, store, conn) = setup();
        let name = "o'brien'); DROP TABLE authors; --";

        let author = store.add_author(&conn, name).unwrap();
        assert_eq!(author.name, name);
        assert_eq!(store.add_author(&conn, name).unwrap(), author);
        assert_eq!(count(&conn, "authors"), 1);
    }

    #[test]
    fn test_concurrent_get_or_create() {
        let (_dir, mut store, first) = setup();
        let second = store.open().unwrap();
        store.ensure_table(&first, Table::Authors).unwrap();

        let results: Vec<Result<Author>> = std::thread::scope(|s| {
            let store = &store;
            let workers: Vec<_> = [first.clone(), second]
                .into_iter()
                .map(|conn| s.spawn(move || store.add_author(&conn, "grace")))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        for result in &results {
            assert!(
                matches!(result, Ok(_) | Err(Error::Conflict { .. })),
                "unexpected result: {:?}",
                result
            );
        }
        assert!(results.iter().any(|r| r.is_ok()));
        assert_eq!(count(&first, "authors"), 1);
    }

    #[test]
    fn test_drop_closes_connections() {
        let (_dir, mut store, conn) = setup();
        let other = store.open().unwrap();
        assert_eq!(store.registry().open_count(store.db()), 2);

        drop(store);
        assert!(!conn.is_open());
        assert!(matches!(
            other.with(|_| Ok(())),
            Err(Error::ConnectionClosed(_))
        ));
    }
}
