//! Whole-table and cross-table queries: ordered dumps, primary-key
//! reindexing, author corpus and collection summaries.

use rusqlite::types::Value;
use tracing::info;

use super::executor::{self, ErrorMode, Rows};
use super::registry::ConnectionHandle;
use super::schema::Table;
use super::statement::{self, OrderBy, Statement, WhereClause};
use super::store::CardStore;
use crate::entity::{Author, Collection, CollectionSummary, CorpusEntry};
use crate::{Error, Result};

/// Every tag on every card in every collection of one author
const CORPUS_SQL: &str = r#"
SELECT
    collections.id AS collection_id,
    collections.title AS title,
    cards.id AS card_id,
    cards.created_at AS created_at,
    tags.id AS tag_id,
    tags.text AS text
FROM collections
JOIN cards ON cards.collection_id = collections.id
JOIN tags ON tags.card_id = cards.id
WHERE collections.author_id = ?
ORDER BY collections.id, cards.created_at, tags.id
"#;

/// Card count, tag count and latest card timestamp of one collection
const COLLECTION_SUMMARY_SQL: &str = r#"
SELECT
    COUNT(DISTINCT cards.id) AS cards,
    COUNT(tags.id) AS tags,
    MAX(cards.created_at) AS last_updated
FROM cards
LEFT JOIN tags ON tags.card_id = cards.id
WHERE cards.collection_id = ?
"#;

/// SQLite's AUTOINCREMENT bookkeeping table
const SEQUENCE_TABLE: &str = "sqlite_sequence";

impl CardStore {
    /// Every row of `table`, ordered by `order` when given
    pub fn table_rows(
        &self,
        conn: &ConnectionHandle,
        table: Table,
        order: &[OrderBy],
    ) -> Result<Rows> {
        self.check_order(table, order)?;
        let select =
            statement::select_ordered(table.as_str(), &[], &WhereClause::default(), order);
        let expected = self.catalog().columns_of(table);
        executor::run(conn, &select, Some(expected.as_slice()), self.read_mode())
    }

    /// Renumber primary keys to `1..=n`.
    ///
    /// Rows keep the order given by `order` (by id when empty). Ids are first
    /// moved below the current minimum (and below zero) so no intermediate
    /// value collides; children follow through `ON UPDATE CASCADE`. The
    /// AUTOINCREMENT counter is reset to `n`.
    pub fn reindex(
        &self,
        conn: &ConnectionHandle,
        table: Table,
        order: &[OrderBy],
    ) -> Result<Rows> {
        self.ensure_table(conn, table)?;
        self.check_order(table, order)?;

        let order = if order.is_empty() {
            vec![OrderBy::asc("id")]
        } else {
            order.to_vec()
        };
        let select =
            statement::select_ordered(table.as_str(), &["id"], &WhereClause::default(), &order);
        let ids = executor::run(conn, &select, None, ErrorMode::Strict)?
            .iter()
            .map(|row| row.get_i64("id"))
            .collect::<Result<Vec<_>>>()?;

        let floor = ids.iter().copied().min().unwrap_or(0).min(0);
        let lowest = floor.checked_sub(ids.len() as i64).ok_or_else(|| {
            Error::Validation(format!("cannot reindex {}: ids too close to i64::MIN", table))
        })?;
        for (position, &id) in ids.iter().enumerate() {
            self.set_id(conn, table, id, lowest + position as i64)?;
        }
        for position in 0..ids.len() as i64 {
            self.set_id(conn, table, lowest + position, position + 1)?;
        }

        let filter = statement::where_eq(&["name"], &[Value::Text(table.to_string())])?;
        let sequence = statement::update(
            SEQUENCE_TABLE,
            &["seq"],
            &[Value::Integer(ids.len() as i64)],
            &filter,
        )?;
        executor::execute(conn, &sequence, SEQUENCE_TABLE)?;

        info!("Reindexed {} row(s) in {}", ids.len(), table);
        self.table_rows(conn, table, &[OrderBy::asc("id")])
    }

    fn set_id(&self, conn: &ConnectionHandle, table: Table, from: i64, to: i64) -> Result<()> {
        self.update(
            conn,
            table,
            &["id"],
            &[Value::Integer(to)],
            &["id"],
            &[Value::Integer(from)],
        )?;
        Ok(())
    }

    fn check_order(&self, table: Table, order: &[OrderBy]) -> Result<()> {
        match order
            .iter()
            .find(|term| !self.catalog().has_column(table, &term.column))
        {
            Some(term) => Err(Error::Validation(format!(
                "cannot order {} by unknown column {}",
                table, term.column
            ))),
            None => Ok(()),
        }
    }

    /// Every tag an author has written, with its card and collection.
    ///
    /// Failures always surface, whatever the store's read mode.
    pub fn corpus(&self, conn: &ConnectionHandle, author: &Author) -> Result<Vec<CorpusEntry>> {
        for &table in &[Table::Collections, Table::Cards, Table::Tags] {
            self.ensure_table(conn, table)?;
        }

        let stmt = Statement::new(CORPUS_SQL, vec![Value::Integer(author.id)]);
        let rows = executor::run(conn, &stmt, Some(CorpusEntry::COLUMNS), ErrorMode::Strict)?;
        rows.iter().map(CorpusEntry::from_row).collect()
    }

    /// Card and tag counts plus the latest card timestamp
    pub fn collection_summary(
        &self,
        conn: &ConnectionHandle,
        collection: &Collection,
    ) -> Result<CollectionSummary> {
        self.ensure_table(conn, Table::Cards)?;
        self.ensure_table(conn, Table::Tags)?;

        let stmt = Statement::new(COLLECTION_SUMMARY_SQL, vec![Value::Integer(collection.id)]);
        let rows = executor::run(
            conn,
            &stmt,
            Some(CollectionSummary::COLUMNS),
            self.read_mode(),
        )?;

        match rows.first() {
            Some(row) => CollectionSummary::from_row(row),
            None => Ok(CollectionSummary::default()),
        }
    }
}
