//! PostgreSQL adapter configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use url::Url;

use chronicle_core::error::{StorageError, StorageResult};

/// Default database host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default database port.
pub const DEFAULT_PORT: u16 = 5432;

/// Default database name.
pub const DEFAULT_DATABASE: &str = "chronicle";

/// Environment variables read by [`DatabaseConfig::from_env`].
pub const ENV_HOST: &str = "CHRONICLE_DB_HOST";
pub const ENV_PORT: &str = "CHRONICLE_DB_PORT";
pub const ENV_USER: &str = "CHRONICLE_DB_USER";
pub const ENV_PASSWORD: &str = "CHRONICLE_DB_PASSWORD";
pub const ENV_NAME: &str = "CHRONICLE_DB_NAME";
pub const ENV_PARAMS: &str = "CHRONICLE_DB_PARAMS";

/// Separator between `key=value` pairs in `CHRONICLE_DB_PARAMS`.
pub const PARAMS_DELIMITER: char = ',';

/// URL scheme of the generated connection locator.
const URL_SCHEME: &str = "postgres";

/// Database configuration.
///
/// Built once before the adapter and never mutated afterwards. The
/// connection fields are combined into a single `postgres://` URL by
/// [`DatabaseConfig::connection_url`].
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Host name or IP. Default `127.0.0.1`.
    pub host: String,
    /// Port. Default `5432`.
    pub port: u16,
    /// User name. Credentials are omitted from the URL when unset.
    pub user: Option<String>,
    /// Password. Ignored when no user is set.
    pub password: Option<String>,
    /// Database name. Default `chronicle`.
    pub database: String,
    /// Extra connection parameters (e.g. `sslmode`), sent as URL query
    /// parameters in key order.
    pub params: BTreeMap<String, String>,
    /// Maximum number of connections in the pool. Default 10.
    pub max_connections: u32,
    /// Minimum number of connections to maintain. Default 1.
    pub min_connections: u32,
    /// Connection acquisition timeout. Default 30s.
    pub acquire_timeout: Duration,
    /// Idle connection timeout. Default 10min.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime. Default 30min.
    pub max_lifetime: Duration,
    /// Deadline applied to each adapter operation. Default none.
    pub operation_timeout: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: None,
            password: None,
            database: DEFAULT_DATABASE.to_string(),
            params: BTreeMap::new(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            operation_timeout: None,
        }
    }
}

// Hand-written so the password never reaches logs.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("database", &self.database)
            .field("params", &self.params)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl DatabaseConfig {
    /// Configuration for `database` with every other field at its default.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Create config from `CHRONICLE_DB_*` environment variables.
    ///
    /// Recognized: `HOST`, `PORT`, `USER`, `PASSWORD`, `NAME` and `PARAMS`
    /// (comma separated `key=value` pairs). Missing variables keep defaults.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`DatabaseConfig::from_env`], reading variables through `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> StorageResult<Self> {
        let mut config = Self::default();

        if let Some(host) = var(ENV_HOST) {
            config.host = host;
        }
        if let Some(port) = var(ENV_PORT) {
            config.port = port.trim().parse().map_err(|_| {
                StorageError::ConfigError(format!("{ENV_PORT} is not a valid port: {port}"))
            })?;
        }
        config.user = var(ENV_USER).filter(|u| !u.is_empty());
        config.password = var(ENV_PASSWORD).filter(|p| !p.is_empty());
        if let Some(database) = var(ENV_NAME) {
            config.database = database;
        }
        if let Some(params) = var(ENV_PARAMS) {
            for pair in params.split(PARAMS_DELIMITER).filter(|p| !p.trim().is_empty()) {
                let (key, value) = parse_param(pair)?;
                config.params.insert(key, value);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the user and, optionally, its password.
    pub fn with_credentials(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.user = Some(user.into());
        self.password = password;
        self
    }

    /// Add an extra connection parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Check the configuration for values that can never work.
    pub fn validate(&self) -> StorageResult<()> {
        if self.host.trim().is_empty() {
            return Err(StorageError::ConfigError("database host is empty".into()));
        }
        if self.port == 0 {
            return Err(StorageError::ConfigError("database port must be non-zero".into()));
        }
        if self.database.trim().is_empty() {
            return Err(StorageError::ConfigError("database name is empty".into()));
        }
        if self.max_connections == 0 {
            return Err(StorageError::ConfigError(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(StorageError::ConfigError(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }

    /// Build the `postgres://[user[:password]@]host:port/database[?params]` URL.
    pub fn connection_url(&self) -> StorageResult<Url> {
        let invalid = |what: &str| StorageError::ConfigError(format!("invalid {what}"));

        let mut url = Url::parse(&format!("{URL_SCHEME}://localhost"))
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        url.set_host(Some(&self.host))
            .map_err(|e| StorageError::ConfigError(format!("invalid host '{}': {e}", self.host)))?;
        url.set_port(Some(self.port)).map_err(|_| invalid("port"))?;
        url.set_path(&format!("/{}", self.database));

        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(user).map_err(|_| invalid("user"))?;

            if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
                url.set_password(Some(password))
                    .map_err(|_| invalid("password"))?;
            }
        }

        if !self.params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Connection URL with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        match self.connection_url() {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("****"));
                }
                url.to_string()
            }
            Err(_) => format!("{URL_SCHEME}://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Parse a `key=value` connection parameter.
pub fn parse_param(pair: &str) -> StorageResult<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(StorageError::ConfigError(format!(
            "invalid connection parameter '{pair}', expected key=value"
        ))),
    }
}
