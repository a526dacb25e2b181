//! Compiler configuration.
//!
//! [`QueryConfig`] is loaded from the `[query]` section of `config/config.toml`
//! layered under `QUERYGRAPH__*` environment variables, e.g.
//! `QUERYGRAPH__QUERY__BACKEND=sqlite`.

use config::{Config, ConfigError, Environment, File};
use sea_query::{MysqlQueryBuilder, PostgresQueryBuilder, SelectStatement, SqliteQueryBuilder};
use serde::Deserialize;
use std::fmt;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "QUERYGRAPH";

/// SQL dialect used when rendering statements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlBackend {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
}

impl SqlBackend {
    /// Render `statement` with inlined values for this backend
    pub fn render(self, statement: &SelectStatement) -> String {
        match self {
            SqlBackend::Postgres => statement.to_string(PostgresQueryBuilder),
            SqlBackend::Mysql => statement.to_string(MysqlQueryBuilder),
            SqlBackend::Sqlite => statement.to_string(SqliteQueryBuilder),
        }
    }
}

impl fmt::Display for SqlBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlBackend::Postgres => write!(f, "postgres"),
            SqlBackend::Mysql => write!(f, "mysql"),
            SqlBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub backend: SqlBackend,
    /// JSON entity metadata file for `MetadataRegistry::from_config`
    #[serde(default)]
    pub metadata_path: Option<String>,
    /// Log every rendered statement at debug level
    #[serde(default)]
    pub log_statements: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            backend: SqlBackend::Postgres,
            metadata_path: None,
            log_statements: false,
        }
    }
}

impl QueryConfig {
    /// Load the query configuration from `config/config.toml`, falling back to env vars.
    ///
    /// A missing `[query]` section yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // File present but unreadable: retry with env only
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!(
                        "failed to load config file, falling back to env. Error: {}",
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<QueryConfig>("query") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Query configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    /// Render `statement` for the configured backend, logging it when enabled
    pub fn render(&self, statement: &SelectStatement) -> String {
        let sql = self.backend.render(statement);
        if self.log_statements {
            log::debug!("[{}] {}", self.backend, sql);
        }
        sql
    }
}
