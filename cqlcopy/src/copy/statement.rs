//! Statement builders.
//!
//! A [`StatementBuilder`] turns one record into the request a session
//! executes. Any `Fn(T) -> Result<R, BuildError>` closure is a builder;
//! [`InsertBuilder`] is the stock one for delimited rows.

use super::error::BuildError;

/// Turns a record into a session request.
pub trait StatementBuilder<T>: Send + Sync + 'static {
    /// Request type produced for the session.
    type Request: Send + 'static;

    /// Build the request for one record.
    fn build(&self, record: T) -> Result<Self::Request, BuildError>;
}

impl<T, R, F> StatementBuilder<T> for F
where
    F: Fn(T) -> Result<R, BuildError> + Send + Sync + 'static,
    R: Send + 'static,
{
    type Request = R;

    fn build(&self, record: T) -> Result<R, BuildError> {
        self(record)
    }
}

/// Default marker that loads as `null`.
pub const DEFAULT_NULL_MARKER: &str = "";

/// Builds `INSERT` statements from rows of string fields.
///
/// Values are rendered as CQL literals without consulting the table schema:
/// integers, decimals, booleans and UUIDs pass through unquoted, the null
/// marker becomes `null`, and everything else becomes a quoted string.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    null_marker: String,
    prefix: String,
}

impl InsertBuilder {
    /// Create a builder for `table` (optionally keyspace-qualified) and the
    /// target columns in file order.
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        let table = table.into();
        let columns: Vec<String> = columns.into_iter().map(|c| c.trim().to_string()).collect();
        let prefix = format!("INSERT INTO {} ({}) VALUES (", table, columns.join(", "));
        Self {
            table,
            columns,
            null_marker: DEFAULT_NULL_MARKER.to_string(),
            prefix,
        }
    }

    /// Set the field value that loads as `null`.
    pub fn with_null_marker(mut self, marker: impl Into<String>) -> Self {
        self.null_marker = marker.into();
        self
    }

    /// Target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Target columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Render one row as an `INSERT` statement (without trailing `;`).
    pub fn render(&self, row: &[String]) -> Result<String, BuildError> {
        if row.len() != self.columns.len() {
            return Err(BuildError::ColumnCount {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }

        let values: Vec<String> = row
            .iter()
            .map(|value| cql_literal(value, &self.null_marker))
            .collect();
        Ok(format!("{}{})", self.prefix, values.join(", ")))
    }
}

impl StatementBuilder<Vec<String>> for InsertBuilder {
    type Request = String;

    fn build(&self, record: Vec<String>) -> Result<String, BuildError> {
        self.render(&record)
    }
}

/// Render a field as a CQL literal.
pub fn cql_literal(value: &str, null_marker: &str) -> String {
    if value == null_marker {
        return "null".to_string();
    }
    if is_number(value) || is_boolean(value) || is_uuid(value) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "''"))
}

fn is_number(value: &str) -> bool {
    if value.parse::<i64>().is_ok() {
        return true;
    }
    // f64 parsing also accepts "inf" and "NaN", which are not CQL literals
    value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && value.chars().any(|c| c.is_ascii_digit())
        && value.parse::<f64>().is_ok()
}

fn is_boolean(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
}

fn is_uuid(value: &str) -> bool {
    let groups: Vec<&str> = value.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_hexdigit()))
}
