//! Warehouse connection layer.
//!
//! Provides a trait-based interface to the warehouse driver so that the query
//! executor can run against the real Snowflake session API or a scripted mock.

mod mock;
pub mod snowflake;
mod types;

pub use mock::{MockConnection, MockConnectionFactory, MockProbe};
pub use snowflake::{SnowflakeConnection, SnowflakeConnectionFactory, SnowflakeOptions};
pub use types::{Execution, RawColumnMeta, RawQueryResult, Row, Statement};

use crate::config::Credentials;
use crate::error::Result;
use async_trait::async_trait;

/// A single, exclusively owned session with the warehouse.
///
/// A connection is created unconnected. `connect` opens the session, `execute`
/// runs one statement on it, and `close` ends it.
#[async_trait]
pub trait Connection: Send {
    /// Opens a network session.
    async fn connect(&mut self) -> Result<()>;

    /// Executes a SQL statement on the open session.
    async fn execute(&mut self, sql: &str) -> Result<Execution>;

    /// Ends the session. Must be safe to call on a connection that never connected.
    async fn close(&mut self) -> Result<()>;

    /// Identifier of the open session, if connected.
    fn session_id(&self) -> Option<&str>;
}

/// Builds connections from resolved credentials.
pub trait ConnectionFactory: Send + Sync {
    /// Creates an unconnected connection for the given credentials.
    fn create(&self, credentials: Credentials) -> Result<Box<dyn Connection>>;
}
