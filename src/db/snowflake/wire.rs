//! Request and response payloads of the Snowflake session API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response codes meaning the query is still running and must be polled.
pub const QUERY_IN_PROGRESS_CODES: &[&str] = &["333333", "333334"];

/// Envelope shared by every session API response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: bool,
}

impl<T> Envelope<T> {
    /// Returns the server message, followed by the error code when present.
    pub fn error_message(&self) -> String {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        match &self.code {
            Some(code) => format!("{message} (code {code})"),
            None => message,
        }
    }

    /// Returns true if the server reports the query as still running.
    pub fn is_in_progress(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| QUERY_IN_PROGRESS_CODES.contains(&code))
    }
}

/// Body of `login-request` and `authenticator-request`.
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub data: LoginData,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoginData {
    pub client_app_id: String,
    pub client_app_version: String,
    pub account_name: String,
    pub login_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_mode_redirect_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_key: Option<String>,
    pub client_environment: ClientEnvironment,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientEnvironment {
    pub application: String,
    pub os: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponseData {
    pub token: Option<String>,
    pub session_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorResponseData {
    pub sso_url: Option<String>,
    pub proof_key: Option<String>,
}

/// Body of `query-request`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub sql_text: String,
    pub async_exec: bool,
    pub sequence_id: u64,
    pub query_submission_time: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponseData {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub rowtype: Option<Vec<RowType>>,
    #[serde(default)]
    pub rowset: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub chunks: Option<Vec<Chunk>>,
    #[serde(default)]
    pub chunk_headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub qrmk: Option<String>,
    #[serde(default)]
    pub query_result_format: Option<String>,
    #[serde(default)]
    pub get_result_url: Option<String>,
}

/// Column description in a query response.
#[derive(Debug, Clone, Deserialize)]
pub struct RowType {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub scale: Option<i64>,
}

/// A remote slice of the result set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub url: String,
    #[serde(default)]
    pub row_count: Option<u64>,
}
