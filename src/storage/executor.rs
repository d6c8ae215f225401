//! Query executor - runs statements and shapes their results
//!
//! This is the single place where read failures are either absorbed into an
//! empty, correctly-shaped result or propagated to the caller.

use std::collections::HashSet;

use rusqlite::ffi;
use rusqlite::types::Value;
use rusqlite::{ErrorCode, params_from_iter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::registry::ConnectionHandle;
use super::statement::Statement;
use crate::{Error, Result};

/// What to do when a read fails or returns the wrong shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Log the failure and return an empty result
    #[default]
    Lenient,
    /// Return the failure to the caller
    Strict,
}

/// Tabular query result: named columns, ordered rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rows {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// No rows, but the given columns
    pub fn empty<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn first(&self) -> Option<Row<'_>> {
        self.get(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.iter().map(|row| row.to_record()).collect()
    }

    fn has_columns(&self, expected: &[&str]) -> bool {
        let found: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let expected: HashSet<&str> = expected.iter().copied().collect();
        found == expected
    }
}

/// Borrowed view of one result row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let values = self.values;
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| values.get(i))
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        match self.get(column) {
            Some(Value::Integer(i)) => Ok(*i),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    pub fn get_text(&self, column: &str) -> Result<String> {
        match self.get(column) {
            Some(Value::Text(t)) => Ok(t.clone()),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    /// Text column that may be NULL
    pub fn get_opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.get(column) {
            Some(Value::Null) => Ok(None),
            Some(Value::Text(t)) => Ok(Some(t.clone())),
            other => Err(type_mismatch(column, "text or null", other)),
        }
    }

    fn to_record(&self) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .zip(self.values)
            .map(|(column, value)| (column.clone(), value_to_json(value)))
            .collect()
    }
}

fn type_mismatch(column: &str, expected: &str, found: Option<&Value>) -> Error {
    match found {
        None => Error::Validation(format!("missing column {}", column)),
        Some(value) => Error::Validation(format!(
            "column {} expected {}, found {:?}",
            column, expected, value
        )),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => (*i).into(),
        Value::Real(r) => (*r).into(),
        Value::Text(t) => t.clone().into(),
        Value::Blob(b) => b.clone().into(),
    }
}

fn query(conn: &ConnectionHandle, stmt: &Statement) -> Result<Rows> {
    debug!("Query: {} {:?}", stmt.sql(), stmt.params());
    conn.with(|c| {
        let mut prepared = c.prepare(stmt.sql())?;
        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut result = prepared.query(params_from_iter(stmt.params()))?;
        let mut rows = Vec::new();
        while let Some(row) = result.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.push(values);
        }

        Ok(Rows::new(columns, rows))
    })
}

/// Run a read statement.
///
/// With `expected` set, a result whose column set differs from it is a
/// validation failure. Failures are returned under `ErrorMode::Strict` and
/// replaced by an empty result shaped to `expected` under `ErrorMode::Lenient`.
pub fn run(
    conn: &ConnectionHandle,
    stmt: &Statement,
    expected: Option<&[&str]>,
    mode: ErrorMode,
) -> Result<Rows> {
    let outcome = query(conn, stmt).and_then(|rows| match expected {
        Some(expected) if !rows.has_columns(expected) => Err(Error::Validation(format!(
            "expected columns {:?}, found {:?}",
            expected,
            rows.columns()
        ))),
        _ => Ok(rows),
    });

    match (outcome, mode) {
        (Ok(rows), _) => Ok(rows),
        (Err(e), ErrorMode::Strict) => Err(e),
        (Err(e), ErrorMode::Lenient) => {
            warn!("Query failed, returning empty result: {} ({})", e, stmt.sql());
            Ok(Rows::empty(expected.unwrap_or_default()))
        }
    }
}

/// Run a write statement and return the affected-row count.
///
/// Write failures always surface; constraint failures are classified against `table`.
pub fn execute(conn: &ConnectionHandle, stmt: &Statement, table: &str) -> Result<usize> {
    debug!("Execute: {} {:?}", stmt.sql(), stmt.params());
    conn.with(|c| {
        c.execute(stmt.sql(), params_from_iter(stmt.params()))
            .map_err(|e| classify(e, table))
    })
}

/// Map SQLite constraint failures onto the store's error taxonomy
pub(crate) fn classify(err: rusqlite::Error, table: &str) -> Error {
    let constraint = match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            let message = message.clone().unwrap_or_else(|| failure.to_string());
            Some((failure.extended_code, message))
        }
        _ => None,
    };
    let Some((extended_code, message)) = constraint else {
        return Error::Query(err);
    };

    let table = table.to_string();
    match extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            Error::Conflict { table, message }
        }
        ffi::SQLITE_CONSTRAINT_CHECK
        | ffi::SQLITE_CONSTRAINT_NOTNULL
        | ffi::SQLITE_CONSTRAINT_DATATYPE => Error::TypeConstraintViolation { table, message },
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::ForeignKey { table, message },
        _ => Error::Query(err),
    }
}
