//! Database access layer.
//!
//! This module provides:
//! - DSN assembly from a configuration record
//! - Connection pool management with pool limits and liveness checks
//! - The data access client (queries, statements, transactions)
//! - Cancellation contexts for the `_with_context` operations

pub mod client;
pub mod context;
pub mod dsn;
#[macro_use]
pub mod macros;
pub(crate) mod params;
pub mod pool;
pub mod rows;
pub mod statement;
pub mod transaction;

pub use client::Client;
pub use context::QueryContext;
pub use dsn::Dsn;
pub use pool::{ConnectionProvider, DriverKind, PoolLimits, PooledConnection};
pub use rows::{Row, Rows};
pub use statement::Statement;
pub use transaction::{Tx, TxStatement};
