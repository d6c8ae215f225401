//! Entity types - typed rows of the four-level hierarchy
//!
//! - `Author`: top-level owner, unique by name
//! - `Collection`: titled group of cards under one author
//! - `Card`: timestamped record within a collection
//! - `Tag`: text label on a card

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::storage::Table;
use crate::storage::executor::{Row, Rows};
use crate::{Error, Result};

/// Card timestamp format, e.g. `2024-01-01-00-00`
pub const CARD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M";

/// Parse a card timestamp, rejecting anything not in `CARD_TIMESTAMP_FORMAT`
pub fn parse_card_timestamp(created_at: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(created_at, CARD_TIMESTAMP_FORMAT).map_err(|e| {
        Error::Validation(format!(
            "card timestamp '{}' is not yyyy-mm-dd-HH-MM: {}",
            created_at, e
        ))
    })
}

/// Format a time as a card timestamp
pub fn format_card_timestamp(time: &NaiveDateTime) -> String {
    time.format(CARD_TIMESTAMP_FORMAT).to_string()
}

/// A row type backed by one catalog table
pub trait Entity: Sized {
    const TABLE: Table;

    fn from_row(row: Row<'_>) -> Result<Self>;

    fn id(&self) -> i64;

    /// Convert every row of a result
    fn from_rows(rows: &Rows) -> Result<Vec<Self>> {
        rows.iter().map(Self::from_row).collect()
    }

    /// Convert a result expected to hold exactly one row
    fn single(rows: &Rows) -> Result<Self> {
        match rows.len() {
            1 => rows.first().map_or_else(
                || Err(Error::Validation(format!("empty result for {}", Self::TABLE))),
                Self::from_row,
            ),
            n => Err(Error::Validation(format!(
                "expected one row in {}, found {}",
                Self::TABLE,
                n
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

impl Entity for Author {
    const TABLE: Table = Table::Authors;

    fn from_row(row: Row<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            name: row.get_text("name")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
}

impl Entity for Collection {
    const TABLE: Table = Table::Collections;

    fn from_row(row: Row<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            title: row.get_text("title")?,
            author_id: row.get_i64("author_id")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub created_at: String,
    pub collection_id: i64,
}

impl Card {
    /// Parsed creation time
    pub fn created(&self) -> Result<NaiveDateTime> {
        parse_card_timestamp(&self.created_at)
    }
}

impl Entity for Card {
    const TABLE: Table = Table::Cards;

    fn from_row(row: Row<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            created_at: row.get_text("created_at")?,
            collection_id: row.get_i64("collection_id")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub text: String,
    pub card_id: i64,
}

impl Entity for Tag {
    const TABLE: Table = Table::Tags;

    fn from_row(row: Row<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            text: row.get_text("text")?,
            card_id: row.get_i64("card_id")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

/// One tag in an author's corpus, with its card and collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub collection_id: i64,
    pub title: String,
    pub card_id: i64,
    pub created_at: String,
    pub tag_id: i64,
    pub text: String,
}

impl CorpusEntry {
    pub const COLUMNS: &'static [&'static str] = &[
        "collection_id",
        "title",
        "card_id",
        "created_at",
        "tag_id",
        "text",
    ];

    pub(crate) fn from_row(row: Row<'_>) -> Result<Self> {
        Ok(Self {
            collection_id: row.get_i64("collection_id")?,
            title: row.get_text("title")?,
            card_id: row.get_i64("card_id")?,
            created_at: row.get_text("created_at")?,
            tag_id: row.get_i64("tag_id")?,
            text: row.get_text("text")?,
        })
    }
}

/// Card and tag counts for a collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub cards: i64,
    pub tags: i64,
    /// Latest card timestamp, `None` for an empty collection
    pub last_updated: Option<String>,
}

impl CollectionSummary {
    pub const COLUMNS: &'static [&'static str] = &["cards", "tags", "last_updated"];

    pub(crate) fn from_row(row: Row<'_>) -> Result<Self> {
        Ok(Self {
            cards: row.get_i64("cards")?,
            tags: row.get_i64("tags")?,
            last_updated: row.get_opt_text("last_updated")?,
        })
    }
}
