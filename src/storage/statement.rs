//! Statement builder - parameterized SQL from structured input
//!
//! Builders never interpolate values: each produces a SQL template with `?`
//! placeholders and the ordered parameters to bind against it.

use rusqlite::types::Value;

use super::schema::ColumnDef;
use crate::{Error, Result};

/// A SQL template plus its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Keyword joining WHERE predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// A WHERE clause: `col = ?` predicates and their values.
///
/// The default value is the empty clause (no filter).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereClause {
    columns: Vec<String>,
    params: Vec<Value>,
    conjunction: Conjunction,
}

impl WhereClause {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Predicate text without the WHERE keyword, e.g. `a = ? AND b = ?`
    pub fn predicate(&self) -> String {
        let separator = format!(" {} ", self.conjunction.as_str());
        self.columns
            .iter()
            .map(|col| format!("{} = ?", col))
            .collect::<Vec<_>>()
            .join(&separator)
    }

    /// ` WHERE <predicate>`, or nothing for the empty clause
    pub fn sql(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicate())
        }
    }

    /// Human-readable predicate with values inlined, for messages only
    pub fn describe(&self) -> String {
        let separator = format!(" {} ", self.conjunction.as_str());
        self.columns
            .iter()
            .zip(&self.params)
            .map(|(col, value)| format!("{} = {}", col, describe_value(value)))
            .collect::<Vec<_>>()
            .join(&separator)
    }
}

/// Render a value as a SQL literal for log and error text
pub fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(t) => format!("'{}'", t.replace('\'', "''")),
        Value::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

/// One `ORDER BY` term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    fn render(&self) -> String {
        if self.descending {
            format!("{} DESC", self.column)
        } else {
            self.column.clone()
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS <table> (<defs>)`
pub fn create_table(table: &str, defs: &[ColumnDef]) -> Result<Statement> {
    if defs.is_empty() {
        return Err(Error::Validation(format!(
            "no column definitions for table {}",
            table
        )));
    }

    let defs = defs
        .iter()
        .map(ColumnDef::render)
        .collect::<Vec<_>>()
        .join(", ");
    Ok(Statement::new(
        format!("CREATE TABLE IF NOT EXISTS {} ({})", table, defs),
        Vec::new(),
    ))
}

/// Single multi-row INSERT; every row must match `columns` in length
pub fn insert(table: &str, columns: &[&str], rows: &[Vec<Value>]) -> Result<Statement> {
    if columns.is_empty() || rows.is_empty() {
        return Err(Error::Validation(format!(
            "insert into {} needs at least one column and one row",
            table
        )));
    }

    if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
        return Err(Error::Validation(format!(
            "insert into {}: row has {} values for {} columns",
            table,
            row.len(),
            columns.len()
        )));
    }

    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![placeholders; rows.len()].join(", ");
    let params = rows.iter().flatten().cloned().collect();

    Ok(Statement::new(
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            values
        ),
        params,
    ))
}

/// `SELECT <columns> FROM <table> [WHERE ...]`; no columns means `*`
pub fn select(table: &str, columns: &[&str], filter: &WhereClause) -> Statement {
    select_ordered(table, columns, filter, &[])
}

/// `select` with an optional `ORDER BY`
pub fn select_ordered(
    table: &str,
    columns: &[&str],
    filter: &WhereClause,
    order: &[OrderBy],
) -> Statement {
    let columns = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}{}", columns, table, filter.sql());
    if !order.is_empty() {
        let terms: Vec<String> = order.iter().map(OrderBy::render).collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }

    Statement::new(sql, filter.params().to_vec())
}

/// `UPDATE <table> SET a = ?, b = ? [WHERE ...]`; set values bind before filter values
pub fn update(
    table: &str,
    set_columns: &[&str],
    set_values: &[Value],
    filter: &WhereClause,
) -> Result<Statement> {
    if set_columns.is_empty() || set_columns.len() != set_values.len() {
        return Err(Error::Validation(format!(
            "update {}: {} set columns for {} values",
            table,
            set_columns.len(),
            set_values.len()
        )));
    }

    let assignments = set_columns
        .iter()
        .map(|col| format!("{} = ?", col))
        .collect::<Vec<_>>()
        .join(", ");

    let mut params = set_values.to_vec();
    params.extend_from_slice(filter.params());

    Ok(Statement::new(
        format!("UPDATE {} SET {}{}", table, assignments, filter.sql()),
        params,
    ))
}

/// `DELETE FROM <table> [WHERE ...]`
pub fn delete(table: &str, filter: &WhereClause) -> Statement {
    Statement::new(
        format!("DELETE FROM {}{}", table, filter.sql()),
        filter.params().to_vec(),
    )
}

/// Equality predicates joined by `conjunction`; needs one or more column/value pairs
pub fn where_clause(
    columns: &[&str],
    values: &[Value],
    conjunction: Conjunction,
) -> Result<WhereClause> {
    if columns.is_empty() || columns.len() != values.len() {
        return Err(Error::Validation(format!(
            "where clause: {} columns for {} values",
            columns.len(),
            values.len()
        )));
    }

    Ok(WhereClause {
        columns: columns.iter().map(|col| col.to_string()).collect(),
        params: values.to_vec(),
        conjunction,
    })
}

/// `where_clause` with `AND`
pub fn where_eq(columns: &[&str], values: &[Value]) -> Result<WhereClause> {
    where_clause(columns, values, Conjunction::And)
}
