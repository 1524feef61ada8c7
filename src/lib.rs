//! evidence-snowflake - run a Snowflake query and normalize it for Evidence.
//!
//! The entry point is [`query::run_query`]. It resolves credentials, runs one
//! statement on one session, and returns rows with lower-cased keys plus the
//! evidence type of every column.

pub mod config;
pub mod db;
pub mod error;
pub mod evidence;
pub mod logging;
pub mod query;

pub use error::{QueryError, SnowflakeError};
pub use query::{run_query, run_query_with, QueryResult};
