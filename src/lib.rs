//! # Indexia - personal knowledge-card store
//!
//! Cards are organized in a four-level hierarchy:
//! author → collection → card → tag.
//!
//! Indexia provides:
//! - A typed schema catalog for the four entity tables
//! - A statement builder producing parameterized SQL
//! - A connection registry with scoped (drop-time) teardown
//! - An idempotent get-or-create entity store on top of SQLite

pub mod config;
pub mod entity;
pub mod logging;
pub mod storage;

use std::path::PathBuf;

// Re-exports for convenient access
pub use entity::{Author, Card, Collection, CollectionSummary, CorpusEntry, Entity, Tag};
pub use storage::{
    Catalog, CardStore, ConnectionHandle, ConnectionRegistry, ErrorMode, Lookup, Rows, Table,
};

/// Result type alias for Indexia operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Indexia operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No rows in {table} where {predicate}")]
    NotFound { table: String, predicate: String },

    #[error("Conflict in {table}: {message}")]
    Conflict { table: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Type constraint violated in {table}: {message}")]
    TypeConstraintViolation { table: String, message: String },

    #[error("Foreign key violated in {table}: {message}")]
    ForeignKey { table: String, message: String },

    #[error("Connection to {0} is closed")]
    ConnectionClosed(PathBuf),

    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}
