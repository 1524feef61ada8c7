//! snowflake-query - run one Snowflake query and print normalized JSON.

mod cli;

use cli::Cli;
use evidence_snowflake::config::{Config, ConnectionConfig};
use evidence_snowflake::db::{
    MockConnectionFactory, RawColumnMeta, Row, SnowflakeConnectionFactory, SnowflakeOptions,
};
use evidence_snowflake::error::{QueryError, Result, SnowflakeError};
use evidence_snowflake::logging;
use evidence_snowflake::query::run_query_with;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // stderr is reserved for the single-line error, so logs go to a file
    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(logging::default_log_path);
    // Logging stays off when the file cannot be created
    let _ = logging::init_file_logging(&log_path);

    // A missing .env file is not an error
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }

    match run(&cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            let line = QueryError::from_message(format!("{e:#}"));
            error!("{}", line);
            eprintln!("{line}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<String> {
    let sql = cli.sql_text()?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    // Precedence:
    // 1. CLI arguments (highest)
    // 2. Named connection from config
    // 3. Default connection from config
    // 4. Environment variables
    let connection = resolve_connection(cli, &config)?;
    match &connection {
        Some(conn) => info!("Connection: {}", conn.display_string()),
        None => info!("No explicit connection, using SNOWFLAKE_* environment variables"),
    }

    let result = if cli.mock {
        run_query_with(&mock_factory(&sql), &sql, connection.as_ref()).await?
    } else {
        let mut options = SnowflakeOptions::default().with_timeout(cli.timeout);
        if let Some(base_url) = &cli.base_url {
            options = options.with_base_url(base_url);
        }
        let factory = SnowflakeConnectionFactory::with_options(options)?;
        run_query_with(&factory, &sql, connection.as_ref()).await?
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    Ok(output)
}

/// Resolves the explicit connection from CLI args and the config file.
///
/// Returns None when neither provides one, leaving credentials to the environment.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let from_file = match cli.connection_name() {
        Some(name) => Some(config.get_connection(Some(name)).cloned().ok_or_else(|| {
            SnowflakeError::config(format!("Connection '{}' not found in config file", name))
        })?),
        None => config.get_connection(None).cloned(),
    };

    let connection = match (from_file, cli.to_connection_config()) {
        (Some(mut base), Some(overrides)) => {
            base.merge(&overrides);
            Some(base)
        }
        (base, overrides) => base.or(overrides),
    };

    Ok(connection)
}

fn mock_factory(sql: &str) -> MockConnectionFactory {
    let mut row = Row::new();
    row.insert(
        "RESULT".to_string(),
        serde_json::Value::String(format!("Mock result for: {sql}")),
    );
    MockConnectionFactory::with_result(vec![RawColumnMeta::new("RESULT", "TEXT")], vec![row])
}
