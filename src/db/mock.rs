//! Mock warehouse connection for testing.
//!
//! Connections are scripted with a connect outcome and an execute outcome, and
//! report what happened to them through a shared `MockProbe`.

use super::{Connection, ConnectionFactory, Execution, RawColumnMeta, Row, Statement};
use crate::config::Credentials;
use crate::error::{Result, SnowflakeError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Observations shared between a factory, its connections and the test.
#[derive(Debug, Default)]
pub struct MockProbe {
    connected: AtomicBool,
    closed: AtomicBool,
    created: AtomicUsize,
    last_credentials: Mutex<Option<Credentials>>,
    last_sql: Mutex<Option<String>>,
}

impl MockProbe {
    /// Returns true if `connect` succeeded on any connection.
    pub fn was_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns true if `close` was called on any connection.
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of connections handed out by the factory.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Credentials passed to the most recent `create`.
    pub fn last_credentials(&self) -> Option<Credentials> {
        self.last_credentials
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// SQL text passed to the most recent `execute`.
    pub fn last_sql(&self) -> Option<String> {
        self.last_sql.lock().ok().and_then(|guard| guard.clone())
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Succeed(Execution),
    Fail(String),
}

/// Factory handing out identically scripted mock connections.
#[derive(Debug, Clone)]
pub struct MockConnectionFactory {
    connect_error: Option<String>,
    outcome: Outcome,
    probe: Arc<MockProbe>,
}

impl MockConnectionFactory {
    /// Creates a factory whose connections succeed with an empty result.
    pub fn new() -> Self {
        Self {
            connect_error: None,
            outcome: Outcome::Succeed(Execution::new(Statement::default(), Vec::new())),
            probe: Arc::new(MockProbe::default()),
        }
    }

    /// Creates a factory whose connections return the given columns and rows.
    pub fn with_result(columns: Vec<RawColumnMeta>, rows: Vec<Row>) -> Self {
        Self::new().returning(Execution::new(Statement::new(columns), rows))
    }

    /// Scripts the execute outcome.
    pub fn returning(mut self, execution: Execution) -> Self {
        self.outcome = Outcome::Succeed(execution);
        self
    }

    /// Makes `connect` fail with the given driver message.
    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Makes `execute` fail with the given driver message.
    pub fn failing_execute(mut self, message: impl Into<String>) -> Self {
        self.outcome = Outcome::Fail(message.into());
        self
    }

    /// Returns the probe shared with every connection from this factory.
    pub fn probe(&self) -> Arc<MockProbe> {
        Arc::clone(&self.probe)
    }
}

impl Default for MockConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFactory for MockConnectionFactory {
    fn create(&self, credentials: Credentials) -> Result<Box<dyn Connection>> {
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.probe.last_credentials.lock() {
            *guard = Some(credentials);
        }

        Ok(Box::new(MockConnection {
            connect_error: self.connect_error.clone(),
            outcome: self.outcome.clone(),
            probe: Arc::clone(&self.probe),
            session_id: None,
        }))
    }
}

/// A scripted connection.
#[derive(Debug)]
pub struct MockConnection {
    connect_error: Option<String>,
    outcome: Outcome,
    probe: Arc<MockProbe>,
    session_id: Option<String>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn connect(&mut self) -> Result<()> {
        if let Some(message) = &self.connect_error {
            return Err(SnowflakeError::connection(message.clone()));
        }
        self.session_id = Some("mock-session".to_string());
        self.probe.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<Execution> {
        if self.session_id.is_none() {
            return Err(SnowflakeError::internal("execute called before connect"));
        }
        if let Ok(mut guard) = self.probe.last_sql.lock() {
            *guard = Some(sql.to_string());
        }

        match &self.outcome {
            Outcome::Succeed(execution) => Ok(execution.clone()),
            Outcome::Fail(message) => Err(SnowflakeError::query(message.clone())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.session_id = None;
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}
