//! Data models for the datastore.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;
pub mod stats;

// Re-export commonly used types
pub use query::{ExecResult, QueryParam};
pub use stats::{PoolStats, TransactionInfo};
