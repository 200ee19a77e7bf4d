//! Chronicle - transaction indexer storage tool.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending schema migrations
//! chronicle --db-user indexer --db-name chronicle migrate
//!
//! # Import a batch of transactions from a JSON file
//! chronicle --db-param sslmode=disable import batch.json
//!
//! # Print the height to resume indexing from
//! CHRONICLE_DB_HOST=db.internal chronicle height
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use chronicle_core::metrics::init_metrics;
use chronicle_core::models::Transaction;
use chronicle_core::ports::IndexAdapter;
use chronicle_storage::postgres::{
    DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PORT, ENV_HOST, ENV_NAME, ENV_PARAMS, ENV_PASSWORD,
    ENV_PORT, ENV_USER, PARAMS_DELIMITER, parse_param,
};
use chronicle_storage::{DatabaseConfig, PgAdapter, SCHEMA_VERSION};

/// Chronicle CLI - transaction indexer storage.
#[derive(Parser, Debug)]
#[command(name = "chronicle")]
#[command(about = "Chronicle - PostgreSQL storage for indexed transactions")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

/// Database connection options.
#[derive(Args, Debug)]
struct DbArgs {
    /// PostgreSQL host.
    #[arg(long, env = ENV_HOST, default_value = DEFAULT_HOST)]
    db_host: String,

    /// PostgreSQL port.
    #[arg(long, env = ENV_PORT, default_value_t = DEFAULT_PORT)]
    db_port: u16,

    /// Database user.
    #[arg(long, env = ENV_USER)]
    db_user: Option<String>,

    /// Database password (ignored without a user).
    #[arg(long, env = ENV_PASSWORD, hide_env_values = true)]
    db_password: Option<String>,

    /// Database name.
    #[arg(long, env = ENV_NAME, default_value = DEFAULT_DATABASE)]
    db_name: String,

    /// Extra connection parameter, repeatable or comma separated
    /// (e.g. `sslmode=require`).
    #[arg(
        long = "db-param",
        env = ENV_PARAMS,
        value_name = "KEY=VALUE",
        value_delimiter = PARAMS_DELIMITER,
        value_parser = parse_db_param
    )]
    db_params: Vec<(String, String)>,

    /// Deadline for each storage operation, in seconds.
    #[arg(long, env = "CHRONICLE_DB_TIMEOUT_SECS")]
    db_timeout_secs: Option<u64>,
}

impl DbArgs {
    fn into_config(self) -> DatabaseConfig {
        DatabaseConfig {
            host: self.db_host,
            port: self.db_port,
            user: self.db_user.filter(|u| !u.is_empty()),
            password: self.db_password.filter(|p| !p.is_empty()),
            database: self.db_name,
            params: self.db_params.into_iter().collect(),
            operation_timeout: self.db_timeout_secs.map(Duration::from_secs),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations and exit.
    Migrate,

    /// Print the latest indexed block height (0 when empty).
    Height,

    /// Save a JSON array of transactions as a single batch.
    ///
    /// The schema is brought up to date first. The batch is all-or-nothing.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },
}

/// Parse a `--db-param` value.
fn parse_db_param(s: &str) -> Result<(String, String), String> {
    parse_param(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);
    init_metrics();

    let config = cli.db.into_config();

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Chronicle");
    debug!(database_url = %config.redacted_url(), "Database endpoint");

    let adapter = PgAdapter::new(&config).context("Failed to create storage adapter")?;

    // Dropping the command future on interrupt rolls back any open batch.
    let result = tokio::select! {
        result = run(&adapter, cli.command) => result,
        _ = shutdown_signal() => Err(anyhow::anyhow!("Interrupted before completion")),
    };

    adapter.close().await;
    result
}

async fn run(adapter: &PgAdapter, command: Command) -> Result<()> {
    match command {
        Command::Migrate => {
            adapter
                .setup_schema()
                .await
                .context("Failed to apply schema migrations")?;
            info!(version = SCHEMA_VERSION, "✅ Schema up to date");
        }
        Command::Height => {
            let height = adapter
                .latest_height()
                .await
                .context("Failed to read latest height")?;
            println!("{height}");
        }
        Command::Import { file } => {
            let txs = read_batch(&file)?;
            if txs.is_empty() {
                warn!(file = %file.display(), "⚠️  Batch is empty");
            }

            adapter
                .setup_schema()
                .await
                .context("Failed to apply schema migrations")?;

            let stats = adapter
                .save_with_stats(&txs)
                .await
                .with_context(|| format!("Failed to save batch from {}", file.display()))?;

            info!(
                transactions = stats.transactions,
                attributes = stats.attributes,
                "✅ Batch saved"
            );
        }
    }

    Ok(())
}

/// Read a JSON array of transactions.
fn read_batch(path: &Path) -> Result<Vec<Transaction>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let txs: Vec<Transaction> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse transactions from {}", path.display()))?;

    if let Some(tx) = txs.iter().find(|tx| tx.hash.is_empty()) {
        bail!("Transaction at height {} has an empty hash", tx.height);
    }

    Ok(txs)
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "⚠️  Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "⚠️  Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
