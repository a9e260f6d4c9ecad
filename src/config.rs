//! Configuration handling for the datastore.
//!
//! The connection record is a `clap` argument group so it can be filled from
//! command-line flags or `DB_*` environment variables, and it is also
//! (de)serializable for callers that load settings from a file.

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: &str = "3306";

/// Directory used when no migration directory is configured.
pub const DEFAULT_MIGRATION_DIR: &str = "./internal/database/migration/sql";

// Pool configuration defaults
pub const DEFAULT_MAX_OPEN_CONNS: u32 = 10;
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 5;
pub const DEFAULT_MAX_CONN_LIFETIME: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONN_IDLE_TIME: Duration = Duration::from_secs(1);

/// Connection, pool and migration settings for one MySQL database.
///
/// Optional fields left unset, zero or empty fall back to the package
/// defaults above.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database server host
    #[arg(long = "db-host", env = "DB_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Database server port
    #[arg(long = "db-port", env = "DB_PORT", default_value = DEFAULT_PORT)]
    pub port: String,

    /// Database user
    #[arg(long = "db-user", env = "DB_USER", default_value = "")]
    pub user: String,

    /// Database password
    #[arg(
        long = "db-pass",
        env = "DB_PASS",
        default_value = "",
        hide_env_values = true
    )]
    #[serde(skip_serializing)]
    pub password: String,

    /// Database (schema) name
    #[arg(long = "db-name", env = "DB_NAME", default_value = "")]
    pub name: String,

    /// Require TLS for connections
    #[arg(long = "db-tls", env = "DB_TLS")]
    pub tls: bool,

    /// Connection timeout, e.g. "5s" or "500ms"
    #[arg(long = "db-timeout", env = "DB_TIMEOUT")]
    pub timeout: Option<String>,

    /// Connection charset, e.g. "utf8mb4"
    #[arg(long = "db-charset", env = "DB_CHARSET")]
    pub charset: Option<String>,

    /// Connection collation, e.g. "utf8mb4_unicode_ci"
    #[arg(long = "db-collation", env = "DB_COLLATION")]
    pub collation: Option<String>,

    /// Ask the driver to parse DATE/DATETIME values into time types
    #[arg(long = "db-parse-time", env = "DB_PARSE_TIME")]
    pub parse_time: bool,

    /// Directory holding migration files
    #[arg(long = "migration-dir", env = "DB_MIGRATION_DIR")]
    pub migration_dir: Option<PathBuf>,

    /// Name of the table that tracks applied migrations
    #[arg(long = "migrations-table", env = "DB_MIGRATIONS_TABLE")]
    pub migrations_table: Option<String>,

    /// Maximum open connections (default: 10)
    #[arg(long = "max-open-conns", env = "DB_MAX_OPEN_CONNS")]
    pub max_open_conns: Option<u32>,

    /// Maximum idle connections kept in the pool (default: 5)
    #[arg(long = "max-idle-conns", env = "DB_MAX_IDLE_CONNS")]
    pub max_idle_conns: Option<u32>,

    /// Maximum lifetime of a connection (default: 30s)
    #[arg(
        long = "max-conn-lifetime",
        env = "DB_MAX_CONN_LIFETIME",
        value_parser = parse_duration
    )]
    #[serde(with = "duration_opt")]
    pub max_conn_lifetime: Option<Duration>,

    /// Maximum time a connection may sit idle (default: 1s)
    #[arg(
        long = "max-conn-idle-time",
        env = "DB_MAX_CONN_IDLE_TIME",
        value_parser = parse_duration
    )]
    #[serde(with = "duration_opt")]
    pub max_conn_idle_time: Option<Duration>,

    /// Route connections through the statement-tracing driver
    #[arg(long = "db-traced-driver", env = "DB_TRACED_DRIVER")]
    pub traced_driver: bool,
}

impl DatabaseConfig {
    /// Create a configuration for the given server and database with defaults elsewhere.
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            user: user.into(),
            password: password.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Get max_open_conns, falling back to the default unless strictly positive.
    pub fn max_open_conns_or_default(&self) -> u32 {
        self.max_open_conns
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_OPEN_CONNS)
    }

    /// Get max_idle_conns, falling back to the default unless strictly positive.
    pub fn max_idle_conns_or_default(&self) -> u32 {
        self.max_idle_conns
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_IDLE_CONNS)
    }

    /// Get max_conn_lifetime, falling back to the default unless non-zero.
    pub fn max_conn_lifetime_or_default(&self) -> Duration {
        self.max_conn_lifetime
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_MAX_CONN_LIFETIME)
    }

    /// Get max_conn_idle_time, falling back to the default unless non-zero.
    pub fn max_conn_idle_time_or_default(&self) -> Duration {
        self.max_conn_idle_time
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_MAX_CONN_IDLE_TIME)
    }

    /// Resolve the migration directory.
    pub fn migration_dir_or_default(&self) -> PathBuf {
        self.migration_dir
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATION_DIR))
    }

    /// Configured migrations table, if any.
    pub fn migrations_table(&self) -> Option<&str> {
        non_empty(&self.migrations_table)
    }

    pub(crate) fn timeout(&self) -> Option<&str> {
        non_empty(&self.timeout)
    }

    pub(crate) fn charset(&self) -> Option<&str> {
        non_empty(&self.charset)
    }

    pub(crate) fn collation(&self) -> Option<&str> {
        non_empty(&self.collation)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            user: String::new(),
            password: String::new(),
            name: String::new(),
            tls: false,
            timeout: None,
            charset: None,
            collation: None,
            parse_time: false,
            migration_dir: None,
            migrations_table: None,
            max_open_conns: None,
            max_idle_conns: None,
            max_conn_lifetime: None,
            max_conn_idle_time: None,
            traced_driver: false,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Parse a duration written as a sequence of `<number><unit>` pairs.
///
/// Units: `ms`, `s`, `m`, `h`. `"0"` is accepted on its own. Examples:
/// `"5s"`, `"500ms"`, `"1m30s"`, `"1.5s"`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let input = value.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{value}'"))?;
        if number_len == 0 {
            return Err(format!("invalid duration '{value}'"));
        }
        let number = &rest[..number_len];
        let tail = &rest[number_len..];
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let unit_millis: u64 = match &tail[..unit_len] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            other => return Err(format!("unknown unit '{other}' in duration '{value}'")),
        };

        let part = if number.contains('.') {
            let amount: f64 = number
                .parse()
                .map_err(|_| format!("invalid number in duration '{value}'"))?;
            Duration::try_from_secs_f64(amount * unit_millis as f64 / 1_000.0)
                .map_err(|_| format!("duration '{value}' is out of range"))?
        } else {
            let amount: u64 = number
                .parse()
                .map_err(|_| format!("invalid number in duration '{value}'"))?;
            let millis = amount
                .checked_mul(unit_millis)
                .ok_or_else(|| format!("duration '{value}' is too large"))?;
            Duration::from_millis(millis)
        };
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("duration '{value}' is too large"))?;
        rest = &tail[unit_len..];
    }
    Ok(total)
}

/// Serde adapter storing optional durations as strings like `"30s"`.
mod duration_opt {
    use super::parse_duration;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&format!("{}ms", d.as_millis())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.filter(|s| !s.is_empty())
            .map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Top-level command-line configuration for the `mysql-datastore` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mysql-datastore",
    about = "Pooled MySQL access layer - connection checks, statements and migrations",
    version,
    author
)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed by the binary.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Apply all pending migrations
    Migrate,
    /// Revert all applied migrations
    CleanUp,
    /// Check that the database is reachable
    Check,
    /// Print connection pool statistics
    Stats,
    /// Execute a single statement
    Exec {
        /// SQL statement with `?` placeholders
        sql: String,
        /// Statement parameters as a JSON array, e.g. '[1, "name", null]'
        #[arg(long)]
        params: Option<String>,
    },
}
