//! Configuration management for evidence-snowflake.
//!
//! Handles named connections in a TOML file and the resolution of connection
//! credentials from explicit settings or environment variables.

use crate::error::{Result, SnowflakeError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment keys probed for each credential field, first non-empty wins.
const ACCOUNT_KEYS: &[&str] = &["SNOWFLAKE_ACCOUNT", "account", "ACCOUNT"];
const USERNAME_KEYS: &[&str] = &["SNOWFLAKE_USERNAME", "username", "USERNAME"];
const PASSWORD_KEYS: &[&str] = &["SNOWFLAKE_PASSWORD", "password", "PASSWORD"];
const DATABASE_KEYS: &[&str] = &["SNOWFLAKE_DATABASE", "database", "DATABASE"];
const WAREHOUSE_KEYS: &[&str] = &["SNOWFLAKE_WAREHOUSE", "warehouse", "WAREHOUSE"];
const EXTERNALBROWSER_KEYS: &[&str] = &[
    "SNOWFLAKE_EXTERNALBROWSER",
    "externalbrowser",
    "EXTERNALBROWSER",
];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Named Snowflake connections.
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

/// Explicit connection settings, as given in a config file or on the command line.
///
/// Every field is optional; missing fields stay missing in the resolved
/// credentials and are left for the warehouse to reject.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    /// Account identifier, e.g. `xy12345.us-east-1`.
    pub account: Option<String>,

    /// Login name.
    pub username: Option<String>,

    /// Password (not recommended to store in config).
    pub password: Option<String>,

    /// Default database for the session.
    pub database: Option<String>,

    /// Virtual warehouse for the session.
    pub warehouse: Option<String>,

    /// Authenticate through the system browser instead of a password.
    #[serde(default)]
    pub externalbrowser: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("account", &self.account)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("warehouse", &self.warehouse)
            .field("externalbrowser", &self.externalbrowser)
            .finish()
    }
}

impl ConnectionConfig {
    /// Returns true if no connection field has been set.
    pub fn is_empty(&self) -> bool {
        self.account.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.database.is_none()
            && self.warehouse.is_none()
            && !self.externalbrowser
    }

    /// Merges another config into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &ConnectionConfig) {
        if other.account.is_some() {
            self.account = other.account.clone();
        }
        if other.username.is_some() {
            self.username = other.username.clone();
        }
        if other.password.is_some() {
            self.password = other.password.clone();
        }
        if other.database.is_some() {
            self.database = other.database.clone();
        }
        if other.warehouse.is_some() {
            self.warehouse = other.warehouse.clone();
        }
        if other.externalbrowser {
            self.externalbrowser = true;
        }
    }

    /// Returns a display-safe string (no password) for log output.
    pub fn display_string(&self) -> String {
        let account = self.account.as_deref().unwrap_or("unknown");
        let database = self.database.as_deref().unwrap_or("unknown");
        let warehouse = self.warehouse.as_deref().unwrap_or("default");
        format!("{database} @ {account} (warehouse {warehouse})")
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("evidence-snowflake")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields an empty config.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SnowflakeError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            SnowflakeError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named connection, or the default connection if name is None.
    pub fn get_connection(&self, name: Option<&str>) -> Option<&ConnectionConfig> {
        let key = name.unwrap_or("default");
        self.connections.get(key)
    }
}

/// How the session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticator {
    /// Interactive login in the system browser; no password is sent.
    ExternalBrowser,
}

impl Authenticator {
    /// Returns the authenticator name sent on login.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExternalBrowser => "EXTERNALBROWSER",
        }
    }
}

/// Credentials for a single query run. Built fresh on every call, never stored.
pub struct Credentials {
    pub account: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub database: Option<String>,
    pub warehouse: Option<String>,
    pub authenticator: Option<Authenticator>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("warehouse", &self.warehouse)
            .field("authenticator", &self.authenticator)
            .finish()
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            account: self.account.clone(),
            username: self.username.clone(),
            password: self
                .password
                .as_ref()
                .map(|p| SecretString::from(p.expose_secret().to_string())),
            database: self.database.clone(),
            warehouse: self.warehouse.clone(),
            authenticator: self.authenticator,
        }
    }
}

impl Credentials {
    /// Returns true when the session logs in through the system browser.
    pub fn uses_external_browser(&self) -> bool {
        self.authenticator == Some(Authenticator::ExternalBrowser)
    }

    /// Drops the password when browser authentication is in use.
    pub fn prepare_for_connect(mut self) -> Self {
        if self.uses_external_browser() {
            self.password = None;
        }
        self
    }
}

/// Resolves credentials from explicit settings, falling back to the process environment.
pub fn resolve_credentials(explicit: Option<&ConnectionConfig>) -> Credentials {
    resolve_credentials_with(explicit, |key| std::env::var(key).ok())
}

/// Resolves credentials using `lookup` as the environment.
///
/// Explicit settings win outright; the environment is only consulted when no
/// explicit settings are given at all.
pub fn resolve_credentials_with<F>(explicit: Option<&ConnectionConfig>, lookup: F) -> Credentials
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(config) = explicit {
        return Credentials {
            account: config.account.clone(),
            username: config.username.clone(),
            password: config.password.clone().map(SecretString::from),
            database: config.database.clone(),
            warehouse: config.warehouse.clone(),
            authenticator: config
                .externalbrowser
                .then_some(Authenticator::ExternalBrowser),
        };
    }

    let probe = |keys: &[&str]| first_non_empty(keys, &lookup);

    Credentials {
        account: probe(ACCOUNT_KEYS),
        username: probe(USERNAME_KEYS),
        password: probe(PASSWORD_KEYS).map(SecretString::from),
        database: probe(DATABASE_KEYS),
        warehouse: probe(WAREHOUSE_KEYS),
        authenticator: probe(EXTERNALBROWSER_KEYS).map(|_| Authenticator::ExternalBrowser),
    }
}

fn first_non_empty<F>(keys: &[&str], lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
}
