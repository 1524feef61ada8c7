//! Query execution and result normalization.
//!
//! The executor owns the connection lifecycle for a single statement; the
//! runner is the public entry point that ties credentials, execution and
//! normalization together.

pub mod executor;
pub mod runner;

pub use executor::{Phase, QueryExecutor};
pub use runner::{run_query, run_query_with};

use crate::db::Row;
use crate::evidence::EvidenceColumnType;
use serde::{Deserialize, Serialize};

/// Normalized result of a query run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Rows with lower-cased keys.
    pub rows: Vec<Row>,

    /// Evidence types of the result columns; absent when the statement had no metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_types: Option<Vec<EvidenceColumnType>>,
}
