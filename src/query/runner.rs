//! Entry point: run one query and return normalized rows and column types.

use super::{QueryExecutor, QueryResult};
use crate::config::{resolve_credentials, ConnectionConfig};
use crate::db::{ConnectionFactory, SnowflakeConnectionFactory};
use crate::error::{QueryError, Result};
use crate::evidence::{map_columns_to_evidence_types, standardize_rows};
use tracing::{debug, info};

/// Runs `sql` against Snowflake.
///
/// Credentials come from `explicit` when given, otherwise from the
/// `SNOWFLAKE_*` environment variables. Any failure is reported as a
/// single-line `QueryError`.
pub async fn run_query(
    sql: &str,
    explicit: Option<&ConnectionConfig>,
) -> std::result::Result<QueryResult, QueryError> {
    let factory = SnowflakeConnectionFactory::new()?;
    run_query_with(&factory, sql, explicit).await
}

/// Runs `sql` on a connection built by `factory`.
pub async fn run_query_with(
    factory: &dyn ConnectionFactory,
    sql: &str,
    explicit: Option<&ConnectionConfig>,
) -> std::result::Result<QueryResult, QueryError> {
    run(factory, sql, explicit).await.map_err(|e| {
        debug!("Query failed: {}: {}", e.category(), e);
        QueryError::from(e)
    })
}

async fn run(
    factory: &dyn ConnectionFactory,
    sql: &str,
    explicit: Option<&ConnectionConfig>,
) -> Result<QueryResult> {
    let credentials = resolve_credentials(explicit).prepare_for_connect();
    debug!(
        "Resolved credentials for account {:?} ({})",
        credentials.account,
        if explicit.is_some() {
            "explicit"
        } else {
            "environment"
        }
    );

    let connection = factory.create(credentials)?;
    let raw = QueryExecutor::new().execute(connection, sql).await?;

    let column_types = map_columns_to_evidence_types(raw.columns.as_deref());
    let rows = standardize_rows(raw.rows);

    info!("Query returned {} rows", rows.len());
    Ok(QueryResult { rows, column_types })
}
