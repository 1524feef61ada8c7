//! Error types for evidence-snowflake.
//!
//! `SnowflakeError` is used inside the crate. Callers of the query runner only
//! ever see a `QueryError`, which is a single line of text.

use std::fmt;
use thiserror::Error;

/// Main error type for connection and query operations.
#[derive(Error, Debug)]
pub enum SnowflakeError {
    /// Failed to open a session (network unreachable, bad credentials, SSO aborted, etc.)
    #[error("Unable to connect: {0}")]
    Connection(String),

    /// The warehouse rejected or failed the statement. Displayed verbatim.
    #[error("{0}")]
    Query(String),

    /// Configuration errors (invalid config file, unknown named connection, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, malformed driver responses, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnowflakeError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using SnowflakeError.
pub type Result<T> = std::result::Result<T, SnowflakeError>;

/// The only failure a query run reports: a one-line diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError(String);

impl QueryError {
    /// Builds a query error, replacing every `\n` and `\r` with a single space.
    pub fn from_message(message: impl AsRef<str>) -> Self {
        let line = message
            .as_ref()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        Self(line)
    }

    /// Returns the diagnostic text.
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for QueryError {}

impl From<SnowflakeError> for QueryError {
    fn from(err: SnowflakeError) -> Self {
        Self::from_message(err.to_string())
    }
}
