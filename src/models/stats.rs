//! Pool statistics and transaction metadata.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Configured ceiling on open connections.
    pub max_open_connections: u32,
    /// Configured ceiling on idle connections.
    pub max_idle_connections: u32,
    /// Connections currently open, idle or in use.
    pub open_connections: u32,
    pub idle: u32,
    pub in_use: u32,
}

/// Metadata about a transaction handle.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionInfo {
    pub id: String,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_serialize() {
        let stats = PoolStats {
            max_open_connections: 10,
            max_idle_connections: 5,
            open_connections: 3,
            idle: 1,
            in_use: 2,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["max_open_connections"], 10);
        assert_eq!(json["in_use"], 2);
    }
}
