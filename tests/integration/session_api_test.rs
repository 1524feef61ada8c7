//! The REST driver against a local fake of the Snowflake session API.

use evidence_snowflake::db::{SnowflakeConnectionFactory, SnowflakeOptions};
use evidence_snowflake::evidence::{EvidenceType, TypeFidelity};
use evidence_snowflake::{config::ConnectionConfig, run_query_with, SnowflakeError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

/// A request seen by the fake server.
#[derive(Debug, Clone)]
struct Seen {
    target: String,
    head: String,
    body: String,
}

type Responder = Arc<dyn Fn(&str, &str, &str) -> (u16, String) + Send + Sync>;

struct FakeSnowflake {
    base_url: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl FakeSnowflake {
    /// Starts a server answering each request with `respond(target, body, base_url)`.
    async fn start<F>(respond: F) -> Self
    where
        F: Fn(&str, &str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let respond: Responder = Arc::new(respond);

        let server_seen = Arc::clone(&seen);
        let server_base = base_url.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = Arc::clone(&server_seen);
                let respond = Arc::clone(&respond);
                let base = server_base.clone();
                tokio::spawn(async move {
                    serve(stream, seen, respond, base).await;
                });
            }
        });

        Self { base_url, seen }
    }

    fn options(&self) -> SnowflakeOptions {
        let mut options = SnowflakeOptions::default()
            .with_base_url(&self.base_url)
            .with_timeout(10);
        options.poll_interval_ms = 10;
        options
    }

    fn factory(&self) -> SnowflakeConnectionFactory {
        SnowflakeConnectionFactory::with_options(self.options()).unwrap()
    }

    fn targets(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.target.clone())
            .collect()
    }

    fn request(&self, prefix: &str) -> Seen {
        let seen = self.seen.lock().unwrap();
        seen.iter()
            .find(|s| s.target.starts_with(prefix))
            .cloned()
            .unwrap()
    }

    fn body_of(&self, prefix: &str) -> Value {
        serde_json::from_str(&self.request(prefix).body).unwrap()
    }
}

async fn serve(
    mut stream: TcpStream,
    seen: Arc<Mutex<Vec<Seen>>>,
    respond: Responder,
    base_url: String,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
    }

    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let (status, response) = respond(&target, &body, &base_url);
    seen.lock().unwrap().push(Seen { target, head, body });

    let reply = format!(
        "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response}",
        response.len()
    );
    let _ = stream.write_all(reply.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn login_ok() -> (u16, String) {
    (
        200,
        json!({
            "data": {"token": "session-token", "sessionId": 1172562260498_i64},
            "code": null,
            "message": null,
            "success": true
        })
        .to_string(),
    )
}

fn logout_ok() -> (u16, String) {
    (200, json!({"data": null, "success": true}).to_string())
}

fn query_data(rowset: Value) -> Value {
    json!({
        "queryId": "01b2c3d4-0000-1234-0000-000000000001",
        "queryResultFormat": "json",
        "rowtype": [
            {"name": "ID", "type": "fixed", "scale": 0, "precision": 38},
            {"name": "NAME", "type": "text"},
            {"name": "PAYLOAD", "type": "variant"},
            {"name": "CREATED", "type": "date"}
        ],
        "rowset": rowset
    })
}

fn credentials() -> ConnectionConfig {
    ConnectionConfig {
        account: Some("xy12345.us-east-1".to_string()),
        username: Some("analyst".to_string()),
        password: Some("hunter2".to_string()),
        database: Some("ANALYTICS".to_string()),
        warehouse: Some("COMPUTE_WH".to_string()),
        externalbrowser: false,
    }
}

#[tokio::test]
async fn test_login_query_logout() {
    let server = FakeSnowflake::start(|target, _, _| {
        if target.starts_with("/session/v1/login-request") {
            login_ok()
        } else if target.starts_with("/queries/v1/query-request") {
            let data = query_data(json!([
                ["1", "Ann", "{\n  \"a\": 1\n}", "19000"],
                ["2", null, "[1, 2]", null]
            ]));
            (200, json!({"data": data, "success": true}).to_string())
        } else if target.starts_with("/session?delete=true") {
            logout_ok()
        } else {
            (404, String::new())
        }
    })
    .await;

    let result = run_query_with(&server.factory(), "SELECT * FROM T", Some(&credentials()))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&result.rows).unwrap(),
        json!([
            {"id": 1, "name": "Ann", "payload": {"a": 1}, "created": "2022-01-08"},
            {"id": 2, "name": null, "payload": [1, 2], "created": null}
        ])
    );

    let column_types = result.column_types.unwrap();
    let summary: Vec<_> = column_types
        .iter()
        .map(|c| (c.name.as_str(), c.evidence_type, c.type_fidelity))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("id", EvidenceType::Number, TypeFidelity::Precise),
            ("name", EvidenceType::String, TypeFidelity::Precise),
            ("payload", EvidenceType::String, TypeFidelity::Inferred),
            ("created", EvidenceType::Date, TypeFidelity::Precise),
        ]
    );

    let targets = server.targets();
    assert_eq!(targets.len(), 3);
    assert_eq!(
        targets[0],
        "/session/v1/login-request?databaseName=ANALYTICS&warehouse=COMPUTE_WH"
    );
    assert!(targets[1].starts_with("/queries/v1/query-request?requestId="));
    assert_eq!(targets[2], "/session?delete=true");

    let login = server.body_of("/session/v1/login-request");
    assert_eq!(login["data"]["ACCOUNT_NAME"], json!("XY12345"));
    assert_eq!(login["data"]["LOGIN_NAME"], json!("analyst"));
    assert_eq!(login["data"]["PASSWORD"], json!("hunter2"));

    let query = server.body_of("/queries/v1/query-request");
    assert_eq!(query["sqlText"], json!("SELECT * FROM T"));
    assert_eq!(query["sequenceId"], json!(1));
}

#[tokio::test]
async fn test_polls_running_query() {
    let server = FakeSnowflake::start(|target, _, _| {
        if target.starts_with("/session/v1/login-request") {
            login_ok()
        } else if target.starts_with("/queries/v1/query-request") {
            (
                200,
                json!({
                    "data": {"getResultUrl": "/queries/01b2/result"},
                    "code": "333334",
                    "message": "Asynchronous execution in progress.",
                    "success": true
                })
                .to_string(),
            )
        } else if target.starts_with("/queries/01b2/result") {
            let data = query_data(json!([["7", "Bo", "{}", "0"]]));
            (200, json!({"data": data, "success": true}).to_string())
        } else {
            logout_ok()
        }
    })
    .await;

    let result = run_query_with(&server.factory(), "SELECT 7", Some(&credentials()))
        .await
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["id"], json!(7));
    assert_eq!(result.rows[0]["created"], json!("1970-01-01"));
    assert!(server
        .targets()
        .iter()
        .any(|t| t == "/queries/01b2/result"));
}

#[tokio::test]
async fn test_downloads_result_chunks() {
    let server = FakeSnowflake::start(|target, _, base_url| {
        if target.starts_with("/session/v1/login-request") {
            login_ok()
        } else if target.starts_with("/queries/v1/query-request") {
            let mut data = query_data(json!([["1", "a", null, null]]));
            data["chunks"] = json!([{"url": format!("{base_url}/chunks/0"), "rowCount": 2}]);
            data["chunkHeaders"] = json!({"x-amz-server-side-encryption-customer-key": "k"});
            (200, json!({"data": data, "success": true}).to_string())
        } else if target == "/chunks/0" {
            (
                200,
                r#"["2","b",null,null],
["3","c",null,null]"#
                    .to_string(),
            )
        } else {
            logout_ok()
        }
    })
    .await;

    let result = run_query_with(&server.factory(), "SELECT 1", Some(&credentials()))
        .await
        .unwrap();

    let ids: Vec<_> = result.rows.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    assert_eq!(result.rows[2]["name"], json!("c"));
}

#[tokio::test]
async fn test_login_rejected() {
    let server = FakeSnowflake::start(|target, _, _| {
        if target.starts_with("/session/v1/login-request") {
            (
                200,
                json!({
                    "data": null,
                    "code": "390100",
                    "message": "Incorrect username or password was specified.",
                    "success": false
                })
                .to_string(),
            )
        } else {
            (500, String::new())
        }
    })
    .await;

    let err = run_query_with(&server.factory(), "SELECT 1", Some(&credentials()))
        .await
        .unwrap_err();

    assert_eq!(
        err.message(),
        "Unable to connect: Incorrect username or password was specified. (code 390100)"
    );
    // No session was opened, so there is nothing to log out of.
    assert_eq!(server.targets().len(), 1);
}

#[tokio::test]
async fn test_query_error_still_logs_out() {
    let server = FakeSnowflake::start(|target, _, _| {
        if target.starts_with("/session/v1/login-request") {
            login_ok()
        } else if target.starts_with("/queries/v1/query-request") {
            (
                200,
                json!({
                    "data": {"queryId": "01b2"},
                    "code": "002003",
                    "message": "SQL compilation error:\nObject 'T' does not exist or not authorized.",
                    "success": false
                })
                .to_string(),
            )
        } else {
            logout_ok()
        }
    })
    .await;

    let err = run_query_with(&server.factory(), "SELECT * FROM T", Some(&credentials()))
        .await
        .unwrap_err();

    assert_eq!(
        err.message(),
        "SQL compilation error: Object 'T' does not exist or not authorized."
    );
    assert_eq!(server.targets().last().map(String::as_str), Some("/session?delete=true"));
}

#[tokio::test]
async fn test_rejects_arrow_results() {
    let server = FakeSnowflake::start(|target, _, _| {
        if target.starts_with("/session/v1/login-request") {
            login_ok()
        } else if target.starts_with("/queries/v1/query-request") {
            let mut data = query_data(Value::Null);
            data["queryResultFormat"] = json!("arrow");
            data["rowsetBase64"] = json!("QVJST1cx");
            (200, json!({"data": data, "success": true}).to_string())
        } else {
            logout_ok()
        }
    })
    .await;

    let err = run_query_with(&server.factory(), "SELECT 1", Some(&credentials()))
        .await
        .unwrap_err();

    assert_eq!(err.message(), "Unsupported result format: arrow");
    assert_eq!(server.targets().last().map(String::as_str), Some("/session?delete=true"));
}

#[tokio::test]
async fn test_chunks_use_qrmk_encryption_headers() {
    let server = FakeSnowflake::start(|target, _, base_url| {
        if target.starts_with("/session/v1/login-request") {
            login_ok()
        } else if target.starts_with("/queries/v1/query-request") {
            let mut data = query_data(json!([]));
            data["chunks"] = json!([{"url": format!("{base_url}/chunks/0"), "rowCount": 1}]);
            data["qrmk"] = json!("qrmk-key");
            (200, json!({"data": data, "success": true}).to_string())
        } else if target == "/chunks/0" {
            (200, r#"["5","e",null,null]"#.to_string())
        } else {
            logout_ok()
        }
    })
    .await;

    let result = run_query_with(&server.factory(), "SELECT 5", Some(&credentials()))
        .await
        .unwrap();
    assert_eq!(result.rows[0]["id"], json!(5));

    let head = server.request("/chunks/0").head.to_lowercase();
    assert!(head.contains("x-amz-server-side-encryption-customer-key: qrmk-key"));
    assert!(head.contains("x-amz-server-side-encryption-customer-algorithm: aes256"));
}

/// Stands in for the browser: follows the SSO URL's port back to the redirect listener.
fn redirect_with_token(sso_url: &str) -> Result<(), SnowflakeError> {
    let port = Url::parse(sso_url)
        .ok()
        .and_then(|url| url.port())
        .ok_or_else(|| SnowflakeError::connection(format!("No port in {sso_url}")))?;

    std::thread::spawn(move || {
        use std::io::{Read, Write};
        let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .write_all(b"GET /?token=sso-token HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response);
    });
    Ok(())
}

#[tokio::test]
async fn test_external_browser_login() {
    let server = FakeSnowflake::start(|target, body, _| {
        if target.starts_with("/session/authenticator-request") {
            let request: Value = serde_json::from_str(body).unwrap();
            let port = request["data"]["BROWSER_MODE_REDIRECT_PORT"]
                .as_str()
                .unwrap()
                .to_string();
            (
                200,
                json!({
                    "data": {
                        "ssoUrl": format!("http://127.0.0.1:{port}/idp/login?client=1&state=2"),
                        "proofKey": "proof-123"
                    },
                    "success": true
                })
                .to_string(),
            )
        } else if target.starts_with("/session/v1/login-request") {
            login_ok()
        } else if target.starts_with("/queries/v1/query-request") {
            let data = query_data(json!([["1", "Ann", null, null]]));
            (200, json!({"data": data, "success": true}).to_string())
        } else {
            logout_ok()
        }
    })
    .await;

    let options = server.options().with_browser_opener(redirect_with_token);
    let factory = SnowflakeConnectionFactory::with_options(options).unwrap();
    let config = ConnectionConfig {
        externalbrowser: true,
        ..credentials()
    };

    let result = run_query_with(&factory, "SELECT 1", Some(&config))
        .await
        .unwrap();
    assert_eq!(result.rows[0]["name"], json!("Ann"));

    let authenticator = server.body_of("/session/authenticator-request");
    assert_eq!(authenticator["data"]["AUTHENTICATOR"], json!("EXTERNALBROWSER"));
    assert_eq!(authenticator["data"]["LOGIN_NAME"], json!("analyst"));
    let port = authenticator["data"]["BROWSER_MODE_REDIRECT_PORT"]
        .as_str()
        .unwrap();
    assert!(port.parse::<u16>().is_ok());

    let login = server.body_of("/session/v1/login-request");
    assert_eq!(login["data"]["AUTHENTICATOR"], json!("EXTERNALBROWSER"));
    assert_eq!(login["data"]["TOKEN"], json!("sso-token"));
    assert_eq!(login["data"]["PROOF_KEY"], json!("proof-123"));
    assert!(login["data"].get("PASSWORD").is_none());

    let targets = server.targets();
    assert!(targets[0].starts_with("/session/authenticator-request"));
    assert!(targets[1].starts_with("/session/v1/login-request"));
}
