//! Connection string assembly.
//!
//! A [`Dsn`] renders as `user:pass@tcp(host:port)/dbname` followed by an
//! optional `?key=value&...` suffix. Parameters appear in a fixed order:
//! `parseTime`, `tls`, `timeout`, `charset`, `collation`. Field contents are
//! not validated here; bad values are rejected when the driver options are
//! built from the DSN.

use crate::config::{DatabaseConfig, parse_duration};
use crate::error::{DbError, DbResult};
use sqlx::ConnectOptions;
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use std::fmt;
use std::time::Duration;
use url::Url;

const PARAM_PARSE_TIME: &str = "parseTime";
const PARAM_TLS: &str = "tls";
const PARAM_TIMEOUT: &str = "timeout";
const PARAM_CHARSET: &str = "charset";
const PARAM_COLLATION: &str = "collation";

/// A MySQL connection string built from a [`DatabaseConfig`].
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    user: String,
    password: String,
    host: String,
    port: String,
    database: String,
    params: Vec<(&'static str, String)>,
}

impl Dsn {
    /// Build the connection string for a configuration.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            user: config.user.clone(),
            password: config.password.clone(),
            host: config.host.clone(),
            port: config.port.clone(),
            database: config.name.clone(),
            params: build_parameters(config),
        }
    }

    /// The `user:pass@tcp(host:port)/dbname` part.
    pub fn base(&self) -> String {
        format!(
            "{}:{}@tcp({}:{})/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }

    /// The `?key=value&...` suffix, or an empty string when no parameter is set.
    pub fn parameters(&self) -> String {
        if self.params.is_empty() {
            return String::new();
        }
        let joined = self
            .params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{joined}")
    }

    /// Look up a parameter value by key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Connection string with the password masked, safe for logs.
    pub fn redacted(&self) -> String {
        let password = if self.password.is_empty() { "" } else { "****" };
        format!(
            "{}:{}@tcp({}:{})/{}{}",
            self.user,
            password,
            self.host,
            self.port,
            self.database,
            self.parameters()
        )
    }

    /// The `timeout` parameter as a duration, if present.
    pub fn timeout(&self) -> DbResult<Option<Duration>> {
        self.param(PARAM_TIMEOUT)
            .map(|raw| {
                parse_duration(raw)
                    .map_err(|e| DbError::invalid_config(format!("timeout: {e}")))
            })
            .transpose()
    }

    /// Build driver connect options from this DSN.
    ///
    /// Credentials are percent-encoded into a `mysql://` URL so the driver
    /// sees them verbatim. A malformed host or port is reported as a driver
    /// configuration error.
    pub fn connect_options(&self) -> Result<MySqlConnectOptions, sqlx::Error> {
        let mut url = Url::parse(&format!("mysql://{}:{}", self.host, self.port))
            .map_err(|e| sqlx::Error::Configuration(e.into()))?;
        url.set_path(&self.database);
        if !self.user.is_empty() {
            url.set_username(&self.user).map_err(|_| {
                sqlx::Error::Configuration("connection URL cannot carry a username".into())
            })?;
        }
        if !self.password.is_empty() {
            url.set_password(Some(&self.password)).map_err(|_| {
                sqlx::Error::Configuration("connection URL cannot carry a password".into())
            })?;
        }

        let mut options = MySqlConnectOptions::from_url(&url)?;
        if self.param(PARAM_TLS).is_some() {
            options = options.ssl_mode(MySqlSslMode::VerifyIdentity);
        }
        if let Some(charset) = self.param(PARAM_CHARSET) {
            options = options.charset(charset);
        }
        if let Some(collation) = self.param(PARAM_COLLATION) {
            options = options.collation(collation);
        }
        Ok(options)
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base(), self.parameters())
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dsn").field(&self.redacted()).finish()
    }
}

/// Collect the optional DSN parameters in their fixed order.
fn build_parameters(config: &DatabaseConfig) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if config.parse_time {
        params.push((PARAM_PARSE_TIME, "true".to_string()));
    }
    if config.tls {
        params.push((PARAM_TLS, "true".to_string()));
    }
    if let Some(timeout) = config.timeout() {
        params.push((PARAM_TIMEOUT, timeout.to_string()));
    }
    if let Some(charset) = config.charset() {
        params.push((PARAM_CHARSET, charset.to_string()));
    }
    if let Some(collation) = config.collation() {
        params.push((PARAM_COLLATION, collation.to_string()));
    }
    params
}
