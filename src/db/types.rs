//! Raw result types reported by a warehouse connection.
//!
//! These carry exactly what the driver returned. Normalization into evidence
//! types happens later, in the `evidence` module.

use serde::{Deserialize, Serialize};

/// A row of data keyed by column name, in result-set column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Metadata about a column in a result set, as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumnMeta {
    /// Column name, usually upper-case.
    pub name: String,

    /// Native column type, e.g. `fixed`, `NUMBER(38,0)`, `variant`.
    #[serde(rename = "type")]
    pub data_type: String,
}

impl RawColumnMeta {
    /// Creates a new column with the given name and native type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Handle describing an executed statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    query_id: Option<String>,
    columns: Vec<RawColumnMeta>,
}

impl Statement {
    /// Creates a statement handle with the given column metadata.
    pub fn new(columns: Vec<RawColumnMeta>) -> Self {
        Self {
            query_id: None,
            columns,
        }
    }

    /// Sets the warehouse-assigned query id.
    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }

    /// Returns the warehouse-assigned query id, if any.
    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    /// Returns the result-set columns in positional order.
    pub fn columns(&self) -> &[RawColumnMeta] {
        &self.columns
    }
}

/// What a connection hands back after executing a statement.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    /// Statement handle; absent when the driver reports none.
    pub statement: Option<Statement>,

    /// Result rows.
    pub rows: Vec<Row>,
}

impl Execution {
    /// Creates an execution outcome with a statement handle.
    pub fn new(statement: Statement, rows: Vec<Row>) -> Self {
        Self {
            statement: Some(statement),
            rows,
        }
    }

    /// Creates an execution outcome without a statement handle.
    pub fn without_statement(rows: Vec<Row>) -> Self {
        Self {
            statement: None,
            rows,
        }
    }
}

/// Rows and column metadata collected from a single statement.
#[derive(Debug, Clone, Default)]
pub struct RawQueryResult {
    pub rows: Vec<Row>,

    /// Absent when the statement produced no metadata.
    pub columns: Option<Vec<RawColumnMeta>>,
}

impl From<Execution> for RawQueryResult {
    fn from(execution: Execution) -> Self {
        Self {
            columns: execution.statement.map(|s| s.columns),
            rows: execution.rows,
        }
    }
}
