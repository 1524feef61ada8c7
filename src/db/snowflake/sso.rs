//! Browser-based single sign-on.
//!
//! The warehouse hands out an SSO URL bound to a local redirect port. After the
//! user logs in, the identity provider redirects the browser to that port with
//! a `token` query parameter, which is then exchanged for a session.

use crate::error::{Result, SnowflakeError};
use std::process::Command;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};
use url::Url;

/// How long to wait for the user to finish logging in.
pub const BROWSER_LOGIN_TIMEOUT_SECS: u64 = 120;

const REDIRECT_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/html\r\n\
Connection: close\r\n\r\n\
<html><body>Your identity was confirmed. You can close this window.</body></html>";

/// Loopback listener that receives the identity provider's redirect.
pub struct RedirectListener {
    listener: TcpListener,
}

impl RedirectListener {
    /// Binds an ephemeral port on the loopback interface.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| SnowflakeError::connection(format!("Failed to bind SSO listener: {e}")))?;
        Ok(Self { listener })
    }

    /// Returns the bound port.
    pub fn port(&self) -> Result<u16> {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|e| SnowflakeError::connection(format!("SSO listener has no address: {e}")))
    }

    /// Waits for the redirect and returns the SSO token it carries.
    pub async fn wait_for_token(self, timeout: Duration) -> Result<String> {
        tokio::time::timeout(timeout, self.accept_token())
            .await
            .map_err(|_| {
                SnowflakeError::connection(format!(
                    "Browser login timed out after {} seconds",
                    timeout.as_secs()
                ))
            })?
    }

    async fn accept_token(self) -> Result<String> {
        loop {
            let (mut stream, peer) = self.listener.accept().await.map_err(|e| {
                SnowflakeError::connection(format!("Failed to accept SSO redirect: {e}"))
            })?;
            debug!("SSO redirect connection from {}", peer);

            let mut buf = vec![0u8; 16 * 1024];
            let read = stream.read(&mut buf).await.map_err(|e| {
                SnowflakeError::connection(format!("Failed to read SSO redirect: {e}"))
            })?;
            let request = String::from_utf8_lossy(&buf[..read]);

            // Browsers also probe for favicons; keep waiting for the real redirect.
            let Some(token) = token_from_request(&request) else {
                continue;
            };

            let _ = stream.write_all(REDIRECT_RESPONSE.as_bytes()).await;
            let _ = stream.shutdown().await;
            return Ok(token);
        }
    }
}

/// Extracts the `token` query parameter from a raw HTTP request.
pub fn token_from_request(request: &str) -> Option<String> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;

    let url = Url::parse("http://localhost").ok()?.join(target).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

/// Opens `url` in the system browser.
pub fn open_browser(url: &str) -> Result<()> {
    info!("Opening browser for Snowflake login");

    let (program, args) = browser_command(std::env::consts::OS, url);
    Command::new(program)
        .args(&args)
        .spawn()
        .map(|_| ())
        .map_err(|e| {
            SnowflakeError::connection(format!(
                "Failed to open a browser ({e}). Open this URL manually: {url}"
            ))
        })
}

/// Program and arguments that open `url` on `os` without going through a shell.
fn browser_command(os: &str, url: &str) -> (&'static str, Vec<String>) {
    match os {
        "macos" => ("open", vec![url.to_string()]),
        // `cmd /C start` would split the URL at every `&`
        "windows" => (
            "rundll32",
            vec!["url.dll,FileProtocolHandler".to_string(), url.to_string()],
        ),
        _ => ("xdg-open", vec![url.to_string()]),
    }
}
