//! Storage Layer - SQLite-backed entity store
//!
//! System of record is SQLite with tables (created on first access):
//! - authors(id, name)
//! - collections(id, title, author_id → authors)
//! - cards(id, created_at, collection_id → collections)
//! - tags(id, text, card_id → cards)

pub mod executor;
pub mod maintenance;
pub mod registry;
pub mod schema;
pub mod statement;
pub mod store;

pub use executor::{ErrorMode, Row, Rows};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use schema::{Catalog, ColumnDef, Table};
pub use statement::{Conjunction, OrderBy, Statement, WhereClause};
pub use store::{CardStore, Lookup};
