//! Single-statement execution against one connection.
//!
//! The executor drives a connection through `connect` and `execute` as one
//! unit of work and always closes it afterwards, whatever the outcome.

use crate::db::{Connection, RawQueryResult};
use crate::error::{Result, SnowflakeError};
use tracing::{debug, warn};

/// Progress of an executor through its single unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has happened yet.
    Pending,
    /// Opening the session.
    Connecting,
    /// Running the statement.
    Executing,
    /// Rows and columns were collected.
    Resolved,
    /// Connecting or executing failed.
    Rejected,
}

/// Runs one statement on one connection. An executor produces exactly one outcome.
#[derive(Debug)]
pub struct QueryExecutor {
    phase: Phase,
}

impl QueryExecutor {
    /// Creates a new executor in the `Pending` phase.
    pub fn new() -> Self {
        Self {
            phase: Phase::Pending,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Connects, executes `sql`, and closes the connection.
    ///
    /// Connection failures are reported as `SnowflakeError::Connection`;
    /// execution failures are returned as the driver reported them. The
    /// connection is closed on every path once a connect was attempted.
    pub async fn execute(
        &mut self,
        mut connection: Box<dyn Connection>,
        sql: &str,
    ) -> Result<RawQueryResult> {
        if self.phase != Phase::Pending {
            return Err(SnowflakeError::internal(format!(
                "Executor already used (phase {:?})",
                self.phase
            )));
        }

        let outcome = self.run(connection.as_mut(), sql).await;

        if let Err(e) = connection.close().await {
            warn!("Failed to close Snowflake connection: {}", e);
        }

        self.transition(if outcome.is_ok() {
            Phase::Resolved
        } else {
            Phase::Rejected
        });
        outcome
    }

    async fn run(&mut self, connection: &mut dyn Connection, sql: &str) -> Result<RawQueryResult> {
        self.transition(Phase::Connecting);
        connection.connect().await.map_err(into_connection_error)?;
        if let Some(session_id) = connection.session_id() {
            debug!("Session {} open", session_id);
        }

        self.transition(Phase::Executing);
        let execution = connection.execute(sql).await?;
        if let Some(statement) = &execution.statement {
            debug!(
                "Statement {} described {} columns",
                statement.query_id().unwrap_or("(no id)"),
                statement.columns().len()
            );
        }

        Ok(RawQueryResult::from(execution))
    }

    fn transition(&mut self, next: Phase) {
        debug!("Executor phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn into_connection_error(err: SnowflakeError) -> SnowflakeError {
    match err {
        SnowflakeError::Connection(msg) => SnowflakeError::Connection(msg),
        other => SnowflakeError::Connection(other.to_string()),
    }
}
