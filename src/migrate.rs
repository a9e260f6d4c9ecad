//! Schema migrations.
//!
//! [`Client::migrate`] applies every pending up migration and
//! [`Client::clean_up`] reverts every applied one. Both acquire a connection
//! through the client's provider, resolve the migration directory and hand
//! both to a [`MigrationEngine`]. An engine reporting
//! [`MigrationError::NoChange`] is treated as success.
//!
//! The default engine, [`SqlxMigrationEngine`], reads the sqlx directory
//! layout: `<version>_<name>.sql` for one-way migrations and
//! `<version>_<name>.up.sql` / `.down.sql` pairs for reversible ones.

use crate::config::DatabaseConfig;
use crate::db::Client;
use crate::error::{DbError, DbResult};
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::mysql::MySqlConnection;
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Table the sqlx engine records applied migrations in.
pub const SQLX_MIGRATIONS_TABLE: &str = "_sqlx_migrations";

/// Which way to move the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply all pending migrations.
    Up,
    /// Revert all applied migrations.
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A directory of migration files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    pub dir: PathBuf,
    pub table: Option<String>,
}

impl MigrationSource {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            dir: config.migration_dir_or_default(),
            table: config.migrations_table().map(str::to_string),
        }
    }
}

/// Outcome of an engine run other than success.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Nothing to apply in the requested direction.
    #[error("no change")]
    NoChange,

    #[error(transparent)]
    Engine(#[from] MigrateError),
}

impl From<sqlx::Error> for MigrationError {
    fn from(e: sqlx::Error) -> Self {
        Self::Engine(MigrateError::Execute(e))
    }
}

/// Applies migrations from a source over a live connection.
///
/// The returned future runs on the caller's task.
pub trait MigrationEngine: Send + Sync {
    fn apply(
        &self,
        conn: &mut MySqlConnection,
        source: &MigrationSource,
        direction: Direction,
    ) -> impl Future<Output = Result<(), MigrationError>>;
}

/// Engine backed by `sqlx::migrate::Migrator`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxMigrationEngine;

impl MigrationEngine for SqlxMigrationEngine {
    async fn apply(
        &self,
        conn: &mut MySqlConnection,
        source: &MigrationSource,
        direction: Direction,
    ) -> Result<(), MigrationError> {
        if let Some(table) = source
            .table
            .as_deref()
            .filter(|table| *table != SQLX_MIGRATIONS_TABLE)
        {
            warn!(
                configured = %table,
                used = SQLX_MIGRATIONS_TABLE,
                "Custom migrations table is not supported by the sqlx engine"
            );
        }

        let migrator = Migrator::new(source.dir.as_path()).await?;
        let applied = applied_versions(conn).await?;

        match direction {
            Direction::Up => {
                debug!(pending = ?pending_versions(&migrator, &applied), "Applying migrations");
                // Always run: the migrator also validates already-applied versions.
                migrator.run(&mut *conn).await?;
                if applied_versions(conn).await? == applied {
                    return Err(MigrationError::NoChange);
                }
            }
            Direction::Down => {
                if applied.is_empty() {
                    return Err(MigrationError::NoChange);
                }
                debug!(applied = applied.len(), "Reverting migrations");
                migrator.undo(&mut *conn, -1).await?;
            }
        }
        Ok(())
    }
}

/// Up migrations in `migrator` that have not been applied, in order.
fn pending_versions(migrator: &Migrator, applied: &HashSet<i64>) -> Vec<i64> {
    migrator
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| m.version)
        .filter(|v| !applied.contains(v))
        .collect()
}

/// Versions recorded as successfully applied. Empty when the table does not exist yet.
async fn applied_versions(conn: &mut MySqlConnection) -> Result<HashSet<i64>, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name = ?",
    )
    .bind(SQLX_MIGRATIONS_TABLE)
    .fetch_one(&mut *conn)
    .await?;
    if exists == 0 {
        return Ok(HashSet::new());
    }

    let versions: Vec<i64> = sqlx::query_scalar(&format!(
        "SELECT version FROM {SQLX_MIGRATIONS_TABLE} WHERE success = TRUE"
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(versions.into_iter().collect())
}

/// Map an engine outcome to the caller's result, treating "no change" as success.
pub fn settle(result: Result<(), MigrationError>, direction: Direction) -> DbResult<()> {
    match result {
        Ok(()) => {
            info!(%direction, "Migrations applied");
            Ok(())
        }
        Err(MigrationError::NoChange) => {
            info!(%direction, "No migrations to apply");
            Ok(())
        }
        Err(MigrationError::Engine(e)) => Err(DbError::Migrate(e)),
    }
}

impl Client {
    /// Apply all pending up migrations with the sqlx engine.
    pub async fn migrate(&self) -> DbResult<()> {
        self.migrate_with(&SqlxMigrationEngine).await
    }

    /// Revert all applied migrations with the sqlx engine.
    pub async fn clean_up(&self) -> DbResult<()> {
        self.clean_up_with(&SqlxMigrationEngine).await
    }

    pub async fn migrate_with<E: MigrationEngine>(&self, engine: &E) -> DbResult<()> {
        self.run_migrations(engine, Direction::Up).await
    }

    pub async fn clean_up_with<E: MigrationEngine>(&self, engine: &E) -> DbResult<()> {
        self.run_migrations(engine, Direction::Down).await
    }

    async fn run_migrations<E: MigrationEngine>(
        &self,
        engine: &E,
        direction: Direction,
    ) -> DbResult<()> {
        let mut conn = self.provider().acquire().await?;
        let source = MigrationSource::from_config(self.config());
        info!(dir = %source.dir.display(), %direction, "Running migrations");

        let result = engine.apply(&mut *conn, &source, direction).await;
        match result {
            // A failed run can leave the migration lock held by this session.
            Err(MigrationError::Engine(_)) => conn.close().await,
            _ => conn.release().await,
        }
        settle(result, direction)
    }
}
