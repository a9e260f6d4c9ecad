//! Connection pool management.
//!
//! [`ConnectionProvider`] turns a [`DatabaseConfig`] into a live MySQL pool:
//! it builds the DSN, selects the driver, applies pool limits, pings the
//! server over a direct connection and then opens the pool lazily. The opened pool is shared by
//! every clone of the provider; a failed open caches nothing so the next call
//! tries again.
//!
//! Connections are handed out as [`PooledConnection`] guards that return to
//! the pool when released or dropped.

use crate::config::DatabaseConfig;
use crate::db::context::QueryContext;
use crate::db::dsn::Dsn;
use crate::error::{DbError, DbResult};
use crate::models::PoolStats;
use log::LevelFilter;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{ConnectOptions, Connection, MySql, MySqlPool};
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Statements slower than this are logged at WARN by the traced driver.
pub const SLOW_STATEMENT_THRESHOLD: Duration = Duration::from_secs(1);

/// Driver used to open connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// Plain MySQL driver with statement logging disabled.
    MySql,
    /// MySQL driver that logs every statement and flags slow ones.
    TracedMySql,
}

impl DriverKind {
    /// Select the driver from the configuration toggle.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        if config.traced_driver {
            Self::TracedMySql
        } else {
            Self::MySql
        }
    }

    /// Driver identifier.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::TracedMySql => "mysql-traced",
        }
    }

    fn configure(&self, options: MySqlConnectOptions) -> MySqlConnectOptions {
        match self {
            Self::MySql => options.disable_statement_logging(),
            Self::TracedMySql => options
                .log_statements(LevelFilter::Info)
                .log_slow_statements(LevelFilter::Warn, SLOW_STATEMENT_THRESHOLD),
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolved pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_open: u32,
    pub max_idle: u32,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
}

impl PoolLimits {
    /// Resolve limits from configuration, applying package defaults.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_open: config.max_open_conns_or_default(),
            max_idle: config.max_idle_conns_or_default(),
            max_lifetime: config.max_conn_lifetime_or_default(),
            max_idle_time: config.max_conn_idle_time_or_default(),
        }
    }
}

/// Opens and hands out pooled MySQL connections for one configuration.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    dsn: Dsn,
    driver: DriverKind,
    limits: PoolLimits,
    pool: Arc<OnceCell<MySqlPool>>,
}

impl ConnectionProvider {
    /// Create a provider. No connection is made until first use.
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            dsn: Dsn::from_config(config),
            driver: DriverKind::from_config(config),
            limits: PoolLimits::from_config(config),
            pool: Arc::new(OnceCell::new()),
        }
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    pub fn driver(&self) -> DriverKind {
        self.driver
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    /// Pool options carrying the configured limits.
    pub fn pool_options(&self) -> DbResult<MySqlPoolOptions> {
        let mut options = MySqlPoolOptions::new()
            .max_connections(self.limits.max_open)
            .min_connections(0)
            .max_lifetime(Some(self.limits.max_lifetime))
            .idle_timeout(Some(self.limits.max_idle_time))
            .test_before_acquire(true);
        if let Some(timeout) = self.dsn.timeout()? {
            options = options.acquire_timeout(timeout);
        }
        Ok(options)
    }

    /// Open a new pool after verifying the server with a ping.
    ///
    /// The ping runs on a dedicated connection outside the pool, bounded by
    /// the DSN `timeout`, and is not retried. Its error is returned as the
    /// driver reported it. This always creates a fresh pool; use
    /// [`ConnectionProvider::pool`] for the shared one.
    pub async fn open(&self) -> DbResult<MySqlPool> {
        self.open_with_context(&QueryContext::background()).await
    }

    /// Open a new pool, with the ping bound to `ctx`.
    pub async fn open_with_context(&self, ctx: &QueryContext) -> DbResult<MySqlPool> {
        let connect_options = self.driver.configure(self.dsn.connect_options()?);
        let pool_options = self.pool_options()?;
        let connect_timeout = self.dsn.timeout()?;

        info!(
            dsn = %self.dsn.redacted(),
            driver = %self.driver,
            max_open = self.limits.max_open,
            max_idle = self.limits.max_idle,
            max_lifetime_ms = self.limits.max_lifetime.as_millis() as u64,
            max_idle_time_ms = self.limits.max_idle_time.as_millis() as u64,
            "Opening connection pool"
        );

        if let Err(e) = ctx
            .run("ping", ping(&connect_options, connect_timeout))
            .await
        {
            warn!(dsn = %self.dsn.redacted(), error = %e, "Ping failed");
            return Err(e);
        }

        let pool = pool_options.connect_lazy_with(connect_options);
        debug!(dsn = %self.dsn.redacted(), "Connection pool ready");
        Ok(pool)
    }

    /// True once the shared pool has been opened successfully.
    pub fn is_open(&self) -> bool {
        self.pool.get().is_some_and(|pool| !pool.is_closed())
    }

    /// The shared pool, opened on first use.
    pub async fn pool(&self) -> DbResult<&MySqlPool> {
        self.pool_with_context(&QueryContext::background()).await
    }

    /// The shared pool, opened on first use under `ctx`.
    pub async fn pool_with_context(&self, ctx: &QueryContext) -> DbResult<&MySqlPool> {
        self.pool
            .get_or_try_init(|| self.open_with_context(ctx))
            .await
    }

    /// Acquire a connection from the shared pool.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        self.acquire_with_context(&QueryContext::background()).await
    }

    /// Acquire a connection from the shared pool under `ctx`.
    pub async fn acquire_with_context(&self, ctx: &QueryContext) -> DbResult<PooledConnection> {
        let pool = self.pool_with_context(ctx).await?;
        let conn = ctx
            .run("acquire connection", async {
                pool.acquire().await.map_err(DbError::from)
            })
            .await?;
        Ok(PooledConnection::new(conn, pool.clone(), self.limits.max_idle))
    }

    /// Statistics for the shared pool, opening it if needed.
    pub async fn stats(&self) -> DbResult<PoolStats> {
        let pool = self.pool().await?;
        let open = pool.size();
        let idle = u32::try_from(pool.num_idle()).unwrap_or(u32::MAX).min(open);
        Ok(PoolStats {
            max_open_connections: self.limits.max_open,
            max_idle_connections: self.limits.max_idle,
            open_connections: open,
            idle,
            in_use: open - idle,
        })
    }

    /// Close the shared pool if it was opened.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            info!(dsn = %self.dsn.redacted(), "Closing connection pool");
            pool.close().await;
        }
    }
}

/// Connect once, ping and disconnect.
async fn ping(options: &MySqlConnectOptions, timeout: Option<Duration>) -> DbResult<()> {
    let attempt = async {
        let mut conn = MySqlConnection::connect_with(options).await?;
        conn.ping().await?;
        conn.close().await
    };
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .unwrap_or_else(|_| Err(connect_timed_out(limit))),
        None => attempt.await,
    };
    result.map_err(DbError::from)
}

fn connect_timed_out(limit: Duration) -> sqlx::Error {
    sqlx::Error::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("connect timed out after {limit:?}"),
    ))
}

/// A connection checked out of the pool.
///
/// Dropping the guard returns the connection to the pool. Explicit
/// [`release`] is preferred: it also enforces the idle ceiling, closing the
/// connection when the pool already holds `max_idle` idle connections.
///
/// [`release`]: PooledConnection::release
pub struct PooledConnection {
    conn: PoolConnection<MySql>,
    pool: MySqlPool,
    max_idle: u32,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("max_idle", &self.max_idle)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    fn new(conn: PoolConnection<MySql>, pool: MySqlPool, max_idle: u32) -> Self {
        Self {
            conn,
            pool,
            max_idle,
        }
    }

    /// Return the connection to the pool, or close it when the idle ceiling is reached.
    pub async fn release(self) {
        let Self {
            mut conn,
            pool,
            max_idle,
        } = self;

        let idle = pool.num_idle();
        if idle >= max_idle as usize {
            debug!(idle, max_idle, "Idle ceiling reached, closing connection");
            if let Err(e) = conn.detach().close().await {
                warn!(error = %e, "Failed to close connection");
            }
        } else {
            // Return before the next release reads the idle count.
            conn.return_to_pool().await;
        }
    }

    /// Close the connection instead of returning it, dropping any session state.
    pub async fn close(self) {
        if let Err(e) = self.conn.detach().close().await {
            warn!(error = %e, "Failed to close connection");
        }
    }
}

impl Deref for PooledConnection {
    type Target = MySqlConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}
