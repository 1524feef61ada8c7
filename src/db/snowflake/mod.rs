//! Snowflake connection over the session REST API.
//!
//! Speaks the same endpoints as the official drivers: `login-request` to open a
//! session, `query-request` to run a statement (polling while it is still
//! running and downloading remote result chunks), and `session?delete=true` to
//! log out.

mod cells;
mod sso;
mod wire;

use crate::config::{Authenticator, Credentials};
use crate::db::{Connection, ConnectionFactory, Execution, RawColumnMeta, Row, Statement};
use crate::error::{Result, SnowflakeError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use wire::{
    AuthenticatorResponseData, ClientEnvironment, Envelope, LoginData, LoginRequest,
    LoginResponseData, QueryRequest, QueryResponseData, RowType,
};

/// Default timeout for a single HTTP request in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default delay between polls of a running query.
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Client identity sent on login. The session API returns JSON result sets to it.
const CLIENT_APP_ID: &str = "JavaScript";

/// Suffix of every public Snowflake account host.
const HOST_SUFFIX: &str = ".snowflakecomputing.com";

/// Tunables for the Snowflake driver.
#[derive(Clone)]
pub struct SnowflakeOptions {
    /// Base URL to use instead of `https://<account>.snowflakecomputing.com`.
    pub base_url: Option<String>,
    /// Timeout for a single HTTP request in seconds.
    pub timeout_secs: u64,
    /// Delay between polls while a query is still running.
    pub poll_interval_ms: u64,
    /// How long to wait for browser login in seconds.
    pub browser_timeout_secs: u64,
    /// Opens the SSO URL for browser login.
    pub browser_opener: fn(&str) -> Result<()>,
}

impl Default for SnowflakeOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            browser_timeout_secs: sso::BROWSER_LOGIN_TIMEOUT_SECS,
            browser_opener: sso::open_browser,
        }
    }
}

impl fmt::Debug for SnowflakeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeOptions")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("browser_timeout_secs", &self.browser_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl SnowflakeOptions {
    /// Sets the base URL override.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Replaces the system browser used for SSO login.
    pub fn with_browser_opener(mut self, opener: fn(&str) -> Result<()>) -> Self {
        self.browser_opener = opener;
        self
    }
}

/// Creates `SnowflakeConnection`s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct SnowflakeConnectionFactory {
    options: SnowflakeOptions,
    client: Client,
}

impl SnowflakeConnectionFactory {
    /// Creates a factory with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(SnowflakeOptions::default())
    }

    /// Creates a factory with the given options.
    pub fn with_options(options: SnowflakeOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .gzip(true)
            .build()
            .map_err(|e| SnowflakeError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { options, client })
    }
}

impl ConnectionFactory for SnowflakeConnectionFactory {
    fn create(&self, credentials: Credentials) -> Result<Box<dyn Connection>> {
        let base_url = match &self.options.base_url {
            Some(url) => parse_base_url(url)?,
            None => account_base_url(credentials.account.as_deref())?,
        };

        Ok(Box::new(SnowflakeConnection {
            client: self.client.clone(),
            options: self.options.clone(),
            base_url,
            credentials,
            session: None,
            sequence_id: 0,
        }))
    }
}

/// An open login session.
struct Session {
    token: SecretString,
    id: String,
}

/// A single Snowflake session, owned by one query run.
pub struct SnowflakeConnection {
    client: Client,
    options: SnowflakeOptions,
    base_url: Url,
    credentials: Credentials,
    session: Option<Session>,
    sequence_id: u64,
}

impl SnowflakeConnection {
    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SnowflakeError::internal(format!("Invalid endpoint {path}: {e}")))
    }

    fn account_name(&self) -> String {
        account_name(self.credentials.account.as_deref().unwrap_or_default())
    }

    fn login_data(&self) -> LoginData {
        LoginData {
            client_app_id: CLIENT_APP_ID.to_string(),
            client_app_version: env!("CARGO_PKG_VERSION").to_string(),
            account_name: self.account_name(),
            login_name: self.credentials.username.clone().unwrap_or_default(),
            client_environment: ClientEnvironment {
                application: env!("CARGO_PKG_NAME").to_string(),
                os: std::env::consts::OS.to_string(),
            },
            ..Default::default()
        }
    }

    fn login_url(&self) -> Result<Url> {
        let mut url = self.endpoint("/session/v1/login-request")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(database) = &self.credentials.database {
                query.append_pair("databaseName", database);
            }
            if let Some(warehouse) = &self.credentials.warehouse {
                query.append_pair("warehouse", warehouse);
            }
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| SnowflakeError::internal("No open session"))?;
        Ok(builder
            .header(
                "Authorization",
                format!("Snowflake Token=\"{}\"", session.token.expose_secret()),
            )
            .header("Accept", "application/json"))
    }

    /// Runs the browser SSO handshake and returns login data carrying the SSO token.
    async fn external_browser_login_data(&self) -> Result<LoginData> {
        let listener = sso::RedirectListener::bind().await?;
        let port = listener.port()?;

        let mut request_data = self.login_data();
        request_data.authenticator = Some(Authenticator::ExternalBrowser.as_str().to_string());
        request_data.browser_mode_redirect_port = Some(port.to_string());

        let url = self.endpoint("/session/authenticator-request")?;
        let envelope: Envelope<AuthenticatorResponseData> = send_json(
            self.client
                .post(url)
                .header("Accept", "application/json")
                .json(&LoginRequest { data: request_data }),
            SnowflakeError::Connection,
        )
        .await?;

        if !envelope.success {
            return Err(SnowflakeError::connection(envelope.error_message()));
        }
        let data = envelope
            .data
            .ok_or_else(|| SnowflakeError::connection("Empty authenticator response"))?;
        let sso_url = data
            .sso_url
            .ok_or_else(|| SnowflakeError::connection("Authenticator response has no SSO URL"))?;

        (self.options.browser_opener)(&sso_url)?;
        let token = listener
            .wait_for_token(Duration::from_secs(self.options.browser_timeout_secs))
            .await?;

        let mut login = self.login_data();
        login.authenticator = Some(Authenticator::ExternalBrowser.as_str().to_string());
        login.token = Some(token);
        login.proof_key = data.proof_key;
        Ok(login)
    }

    /// Posts a query and polls until it leaves the in-progress state.
    async fn submit_query(&mut self, sql: &str) -> Result<QueryResponseData> {
        self.sequence_id += 1;
        let mut url = self.endpoint("/queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &uuid::Uuid::new_v4().to_string());

        let request = QueryRequest {
            sql_text: sql.to_string(),
            async_exec: false,
            sequence_id: self.sequence_id,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };

        let mut envelope: Envelope<QueryResponseData> = send_json(
            self.authorized(self.client.post(url))?.json(&request),
            SnowflakeError::Query,
        )
        .await?;

        while envelope.is_in_progress() {
            let result_path = envelope
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.clone())
                .ok_or_else(|| SnowflakeError::query("Running query has no result URL"))?;
            debug!("Query still running, polling {}", result_path);

            tokio::time::sleep(Duration::from_millis(self.options.poll_interval_ms)).await;
            let url = self.endpoint(&result_path)?;
            envelope = send_json(
                self.authorized(self.client.get(url))?,
                SnowflakeError::Query,
            )
            .await?;
        }

        if !envelope.success {
            return Err(SnowflakeError::query(
                envelope
                    .message
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(envelope.data.unwrap_or_default())
    }

    /// Downloads every remote chunk, in order, as raw rows.
    async fn fetch_chunks(&self, data: &QueryResponseData) -> Result<Vec<Vec<Option<String>>>> {
        let Some(chunks) = &data.chunks else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            debug!(
                "Fetching result chunk {} of {} ({:?} rows)",
                index + 1,
                chunks.len(),
                chunk.row_count
            );

            let mut request = self.client.get(&chunk.url);
            match (&data.chunk_headers, &data.qrmk) {
                (Some(headers), _) => {
                    for (name, value) in headers {
                        request = request.header(name, value);
                    }
                }
                (None, Some(qrmk)) => {
                    request = request
                        .header("x-amz-server-side-encryption-customer-algorithm", "AES256")
                        .header("x-amz-server-side-encryption-customer-key", qrmk);
                }
                (None, None) => {}
            }

            let body = send_text(request, SnowflakeError::Query).await?;
            rows.extend(parse_chunk_body(&body)?);
        }

        Ok(rows)
    }
}

#[async_trait]
impl Connection for SnowflakeConnection {
    async fn connect(&mut self) -> Result<()> {
        let login = if self.credentials.uses_external_browser() {
            self.external_browser_login_data().await?
        } else {
            let mut login = self.login_data();
            login.password = self
                .credentials
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string());
            login
        };

        let envelope: Envelope<LoginResponseData> = send_json(
            self.client
                .post(self.login_url()?)
                .header("Accept", "application/json")
                .json(&LoginRequest { data: login }),
            SnowflakeError::Connection,
        )
        .await?;

        if !envelope.success {
            return Err(SnowflakeError::connection(envelope.error_message()));
        }

        let data = envelope
            .data
            .ok_or_else(|| SnowflakeError::connection("Empty login response"))?;
        let token = data
            .token
            .ok_or_else(|| SnowflakeError::connection("Login response has no session token"))?;
        let id = match data.session_id {
            Some(serde_json::Value::String(id)) => id,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        info!("Connected to Snowflake account {}", self.account_name());
        self.session = Some(Session {
            token: SecretString::from(token),
            id,
        });
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<Execution> {
        let mut data = self.submit_query(sql).await?;

        if let Some(format) = &data.query_result_format {
            if !format.eq_ignore_ascii_case("json") {
                return Err(SnowflakeError::query(format!(
                    "Unsupported result format: {format}"
                )));
            }
        }

        let Some(rowtype) = data.rowtype.clone() else {
            return Ok(Execution::without_statement(Vec::new()));
        };

        let mut raw_rows = data.rowset.take().unwrap_or_default();
        raw_rows.extend(self.fetch_chunks(&data).await?);
        let rows = build_rows(&rowtype, raw_rows);

        let columns = rowtype
            .iter()
            .map(|col| RawColumnMeta::new(&col.name, &col.data_type))
            .collect();
        let mut statement = Statement::new(columns);
        if let Some(query_id) = data.query_id {
            statement = statement.with_query_id(query_id);
        }

        debug!("Query returned {} rows", rows.len());
        Ok(Execution::new(statement, rows))
    }

    async fn close(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Ok(());
        }

        let mut url = self.endpoint("/session")?;
        url.query_pairs_mut().append_pair("delete", "true");
        let request = self.authorized(self.client.post(url))?;
        self.session = None;

        let response = request
            .send()
            .await
            .map_err(|e| SnowflakeError::internal(format!("Logout failed: {e}")))?;
        if !response.status().is_success() {
            warn!("Logout returned HTTP {}", response.status());
        }
        Ok(())
    }

    fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }
}

/// Sends a request and decodes a JSON envelope, mapping failures with `make_err`.
async fn send_json<T, F>(request: RequestBuilder, make_err: F) -> Result<Envelope<T>>
where
    T: DeserializeOwned,
    F: Fn(String) -> SnowflakeError,
{
    let body = send_text(request, &make_err).await?;
    serde_json::from_str(&body).map_err(|e| make_err(format!("Failed to parse response: {e}")))
}

async fn send_text<F>(request: RequestBuilder, make_err: F) -> Result<String>
where
    F: Fn(String) -> SnowflakeError,
{
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            make_err("Request timed out".to_string())
        } else if e.is_connect() {
            make_err(format!("Failed to reach Snowflake: {e}"))
        } else {
            make_err(format!("Request failed: {e}"))
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| make_err(format!("Failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(make_err(http_error_message(status, &body)));
    }
    Ok(body)
}

fn http_error_message(status: StatusCode, body: &str) -> String {
    match status {
        StatusCode::UNAUTHORIZED => "Authentication failed or session expired".to_string(),
        StatusCode::FORBIDDEN => "Access denied".to_string(),
        StatusCode::NOT_FOUND => "Account or endpoint not found".to_string(),
        _ if body.is_empty() => format!("HTTP error: {}", status.as_u16()),
        _ => format!("HTTP error {}: {}", status.as_u16(), body),
    }
}

/// Builds rows keyed by column name from positional raw cells.
fn build_rows(rowtype: &[RowType], raw_rows: Vec<Vec<Option<String>>>) -> Vec<Row> {
    raw_rows
        .into_iter()
        .map(|raw| {
            rowtype
                .iter()
                .zip(raw)
                .map(|(column, cell)| {
                    let value = cells::convert_cell(cell.as_deref(), column);
                    (column.name.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Chunk bodies are comma-separated row arrays without the enclosing brackets.
fn parse_chunk_body(body: &str) -> Result<Vec<Vec<Option<String>>>> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let json = if trimmed.starts_with("[[") || trimmed == "[]" {
        trimmed.to_string()
    } else {
        format!("[{trimmed}]")
    };
    serde_json::from_str(&json)
        .map_err(|e| SnowflakeError::query(format!("Failed to parse result chunk: {e}")))
}

/// Returns the account name sent on login: the identifier up to the first `.`.
fn account_name(account: &str) -> String {
    account
        .split('.')
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

/// Derives the session API base URL from an account identifier.
fn account_base_url(account: Option<&str>) -> Result<Url> {
    let account = account
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| SnowflakeError::config("Snowflake account is not set"))?;

    let host = if account.ends_with(HOST_SUFFIX) {
        account.to_string()
    } else {
        format!("{account}{HOST_SUFFIX}")
    };
    parse_base_url(&format!("https://{host}"))
}

fn parse_base_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| SnowflakeError::config(format!("Invalid Snowflake URL {url}: {e}")))
}
