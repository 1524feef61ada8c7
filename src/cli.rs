//! Command-line argument parsing for snowflake-query.

use clap::Parser;
use evidence_snowflake::config::{Config, ConnectionConfig};
use evidence_snowflake::error::{Result, SnowflakeError};
use std::io::Read;
use std::path::PathBuf;

/// Run one SQL statement on Snowflake and print rows and column types as JSON.
#[derive(Parser, Debug)]
#[command(name = "snowflake-query")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQL statement to run
    #[arg(value_name = "SQL")]
    pub sql: Option<String>,

    /// Read the SQL statement from a file ("-" for stdin)
    #[arg(short = 'f', long, value_name = "PATH", conflicts_with = "sql")]
    pub file: Option<String>,

    /// Snowflake account identifier (e.g., xy12345.us-east-1)
    #[arg(short = 'a', long, value_name = "ACCOUNT")]
    pub account: Option<String>,

    /// Login name
    #[arg(short = 'u', long, value_name = "USERNAME")]
    pub username: Option<String>,

    /// Password
    #[arg(long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Database name
    #[arg(short = 'd', long, value_name = "DATABASE")]
    pub database: Option<String>,

    /// Warehouse name
    #[arg(short = 'w', long, value_name = "WAREHOUSE")]
    pub warehouse: Option<String>,

    /// Log in through the system browser instead of a password
    #[arg(long)]
    pub externalbrowser: bool,

    /// Use named connection from config
    #[arg(short = 'c', long, value_name = "NAME")]
    pub connection: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Base URL of the Snowflake endpoint (overrides the account host)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value = "300")]
    pub timeout: u64,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Use a mock warehouse (for testing)
    #[arg(long)]
    pub mock: bool,

    /// Log file path (defaults to the platform state directory)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Converts connection flags to a ConnectionConfig, or None if none were given.
    pub fn to_connection_config(&self) -> Option<ConnectionConfig> {
        let config = ConnectionConfig {
            account: self.account.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            warehouse: self.warehouse.clone(),
            externalbrowser: self.externalbrowser,
        };

        if config.is_empty() {
            None
        } else {
            Some(config)
        }
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the named connection to use, if specified.
    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// Returns the SQL text from the positional argument, a file, or stdin.
    pub fn sql_text(&self) -> Result<String> {
        let sql = match (&self.sql, self.file.as_deref()) {
            (Some(sql), _) => sql.clone(),
            (None, Some("-")) => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .map_err(|e| SnowflakeError::config(format!("Failed to read stdin: {e}")))?;
                buf
            }
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                SnowflakeError::config(format!("Failed to read SQL file {path}: {e}"))
            })?,
            (None, None) => {
                return Err(SnowflakeError::config(
                    "No SQL given. Pass a statement or use --file",
                ))
            }
        };

        if sql.trim().is_empty() {
            return Err(SnowflakeError::config("SQL statement is empty"));
        }
        Ok(sql)
    }
}
