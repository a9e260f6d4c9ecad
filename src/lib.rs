//! MySQL Datastore Library
//!
//! A pooled MySQL access layer: DSN assembly, connection pooling with
//! configurable limits, a uniform query/exec/prepare/transaction client with
//! cancellation-aware variants, batch INSERT placeholder helpers and schema
//! migrations.

pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod query_builder;

pub use config::{Config, DatabaseConfig};
pub use db::{Client, QueryContext, Row, Rows, Statement, Tx, TxStatement};
pub use error::{DbError, DbResult};
pub use migrate::{Direction, MigrationEngine, MigrationError, MigrationSource, SqlxMigrationEngine};
pub use models::{ExecResult, PoolStats, QueryParam};
