//! The data access client.
//!
//! [`Client`] is the uniform query/exec/prepare/transaction surface. It wraps
//! one immutable [`DatabaseConfig`] and a [`ConnectionProvider`]; every
//! operation acquires its own connection through the provider and releases it
//! on every path, except where ownership moves to the caller:
//!
//! - [`Rows`] keep their connection until exhausted, closed or dropped;
//! - [`Tx`] keeps its connection until committed or rolled back, and
//!   statements prepared with [`Client::tx_prepare`] run on that connection;
//! - [`Statement`] stays usable against the pool until closed.
//!
//! Each operation comes in a plain form and a `_with_context` form that runs
//! the driver call under a [`QueryContext`].

use crate::config::DatabaseConfig;
use crate::db::context::QueryContext;
use crate::db::params::bind_all;
use crate::db::pool::ConnectionProvider;
use crate::db::rows::{Row, Rows, spawn_on_connection};
use crate::db::statement::Statement;
use crate::db::transaction::{Tx, TxStatement};
use crate::error::{DbError, DbResult};
use crate::models::{ExecResult, PoolStats, QueryParam};
use sqlx::Connection;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe handle to a MySQL database.
///
/// Cloning is cheap; all clones share one lazily opened pool.
#[derive(Clone)]
pub struct Client {
    config: Arc<DatabaseConfig>,
    provider: ConnectionProvider,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client. No connection is made until the first operation.
    pub fn new(config: DatabaseConfig) -> Self {
        let provider = ConnectionProvider::new(&config);
        Self {
            config: Arc::new(config),
            provider,
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    // ---- Queries ----

    /// Run a multi-row query.
    ///
    /// Fails if a connection cannot be acquired or the driver rejects the
    /// statement. The returned iterator owns the connection.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<Rows<'static>> {
        self.query_with_context(&QueryContext::background(), sql, params)
            .await
    }

    pub async fn query_with_context(
        &self,
        ctx: &QueryContext,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Rows<'static>> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        let conn = self.provider.acquire_with_context(ctx).await?;
        spawn_on_connection(conn, sql.to_string(), params.to_vec(), ctx.clone()).await
    }

    /// Run a query expected to return at most one row.
    ///
    /// Only connection errors are returned here. Driver errors and "no rows"
    /// are deferred to [`Row::scan`].
    pub async fn query_row(&self, sql: &str, params: &[QueryParam]) -> DbResult<Row> {
        self.query_row_with_context(&QueryContext::background(), sql, params)
            .await
    }

    pub async fn query_row_with_context(
        &self,
        ctx: &QueryContext,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Row> {
        debug!(sql = %sql, params = params.len(), "Executing single-row query");
        let mut conn = self.provider.acquire_with_context(ctx).await?;
        let result = ctx
            .run("query row", async {
                bind_all(sqlx::query(sql), params)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)
            })
            .await;
        conn.release().await;
        Ok(Row::new(result))
    }

    /// Execute a statement that returns no rows.
    pub async fn exec(&self, sql: &str, params: &[QueryParam]) -> DbResult<ExecResult> {
        self.exec_with_context(&QueryContext::background(), sql, params)
            .await
    }

    pub async fn exec_with_context(
        &self,
        ctx: &QueryContext,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<ExecResult> {
        debug!(sql = %sql, params = params.len(), "Executing statement");
        let mut conn = self.provider.acquire_with_context(ctx).await?;
        let result = ctx
            .run("exec", async {
                let result = bind_all(sqlx::query(sql), params)
                    .execute(&mut *conn)
                    .await?;
                Ok(ExecResult::from(result))
            })
            .await;
        conn.release().await;
        result
    }

    // ---- Prepared statements ----

    /// Prepare a reusable statement bound to the pool.
    pub async fn prepare(&self, sql: &str) -> DbResult<Statement> {
        self.prepare_with_context(&QueryContext::background(), sql)
            .await
    }

    pub async fn prepare_with_context(&self, ctx: &QueryContext, sql: &str) -> DbResult<Statement> {
        let pool = self.provider.pool_with_context(ctx).await?;
        ctx.run("prepare", Statement::prepare(pool, sql)).await
    }

    pub async fn stmt_query(
        &self,
        stmt: &Statement,
        params: &[QueryParam],
    ) -> DbResult<Rows<'static>> {
        stmt.query(params, QueryContext::background()).await
    }

    pub async fn stmt_query_with_context(
        &self,
        ctx: &QueryContext,
        stmt: &Statement,
        params: &[QueryParam],
    ) -> DbResult<Rows<'static>> {
        stmt.query(params, ctx.clone()).await
    }

    pub async fn stmt_query_row(&self, stmt: &Statement, params: &[QueryParam]) -> Row {
        stmt.query_row(params, &QueryContext::background()).await
    }

    pub async fn stmt_query_row_with_context(
        &self,
        ctx: &QueryContext,
        stmt: &Statement,
        params: &[QueryParam],
    ) -> Row {
        stmt.query_row(params, ctx).await
    }

    pub async fn stmt_exec(&self, stmt: &Statement, params: &[QueryParam]) -> DbResult<ExecResult> {
        stmt.exec(params, &QueryContext::background()).await
    }

    pub async fn stmt_exec_with_context(
        &self,
        ctx: &QueryContext,
        stmt: &Statement,
        params: &[QueryParam],
    ) -> DbResult<ExecResult> {
        stmt.exec(params, ctx).await
    }

    // ---- Transactions ----

    /// Begin a transaction on a dedicated connection.
    ///
    /// The caller must finish it with [`Client::tx_commit`] or
    /// [`Client::tx_rollback`]; no operation rolls back on error.
    pub async fn begin_tx(&self) -> DbResult<Tx> {
        self.begin_tx_with_context(&QueryContext::background())
            .await
    }

    pub async fn begin_tx_with_context(&self, ctx: &QueryContext) -> DbResult<Tx> {
        let pool = self.provider.pool_with_context(ctx).await?;
        Tx::begin(pool, ctx).await
    }

    pub async fn tx_query<'a>(
        &self,
        tx: &'a mut Tx,
        sql: &'a str,
        params: &'a [QueryParam],
    ) -> DbResult<Rows<'a>> {
        tx.query(sql, params, QueryContext::background()).await
    }

    pub async fn tx_query_with_context<'a>(
        &self,
        ctx: &QueryContext,
        tx: &'a mut Tx,
        sql: &'a str,
        params: &'a [QueryParam],
    ) -> DbResult<Rows<'a>> {
        tx.query(sql, params, ctx.clone()).await
    }

    pub async fn tx_query_row(&self, tx: &mut Tx, sql: &str, params: &[QueryParam]) -> Row {
        tx.query_row(sql, params, &QueryContext::background())
            .await
    }

    pub async fn tx_query_row_with_context(
        &self,
        ctx: &QueryContext,
        tx: &mut Tx,
        sql: &str,
        params: &[QueryParam],
    ) -> Row {
        tx.query_row(sql, params, ctx).await
    }

    pub async fn tx_exec(
        &self,
        tx: &mut Tx,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<ExecResult> {
        tx.exec(sql, params, &QueryContext::background()).await
    }

    pub async fn tx_exec_with_context(
        &self,
        ctx: &QueryContext,
        tx: &mut Tx,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<ExecResult> {
        tx.exec(sql, params, ctx).await
    }

    /// Prepare a statement on the transaction's connection.
    pub async fn tx_prepare(&self, tx: &mut Tx, sql: &str) -> DbResult<TxStatement> {
        tx.prepare(sql, &QueryContext::background()).await
    }

    pub async fn tx_prepare_with_context(
        &self,
        ctx: &QueryContext,
        tx: &mut Tx,
        sql: &str,
    ) -> DbResult<TxStatement> {
        tx.prepare(sql, ctx).await
    }

    pub async fn tx_stmt_query<'a>(
        &self,
        tx: &'a mut Tx,
        stmt: &'a TxStatement,
        params: &'a [QueryParam],
    ) -> DbResult<Rows<'a>> {
        tx.stmt_query(stmt, params, QueryContext::background())
            .await
    }

    pub async fn tx_stmt_query_with_context<'a>(
        &self,
        ctx: &QueryContext,
        tx: &'a mut Tx,
        stmt: &'a TxStatement,
        params: &'a [QueryParam],
    ) -> DbResult<Rows<'a>> {
        tx.stmt_query(stmt, params, ctx.clone()).await
    }

    pub async fn tx_stmt_query_row(
        &self,
        tx: &mut Tx,
        stmt: &TxStatement,
        params: &[QueryParam],
    ) -> Row {
        tx.stmt_query_row(stmt, params, &QueryContext::background())
            .await
    }

    pub async fn tx_stmt_query_row_with_context(
        &self,
        ctx: &QueryContext,
        tx: &mut Tx,
        stmt: &TxStatement,
        params: &[QueryParam],
    ) -> Row {
        tx.stmt_query_row(stmt, params, ctx).await
    }

    pub async fn tx_stmt_exec(
        &self,
        tx: &mut Tx,
        stmt: &TxStatement,
        params: &[QueryParam],
    ) -> DbResult<ExecResult> {
        tx.stmt_exec(stmt, params, &QueryContext::background())
            .await
    }

    pub async fn tx_stmt_exec_with_context(
        &self,
        ctx: &QueryContext,
        tx: &mut Tx,
        stmt: &TxStatement,
        params: &[QueryParam],
    ) -> DbResult<ExecResult> {
        tx.stmt_exec(stmt, params, ctx).await
    }

    pub async fn tx_commit(&self, tx: Tx) -> DbResult<()> {
        tx.commit().await
    }

    pub async fn tx_rollback(&self, tx: Tx) -> DbResult<()> {
        tx.rollback().await
    }

    // ---- Health and statistics ----

    /// Acquire a connection and ping it.
    ///
    /// Returns `(true, None)` when the database answered, otherwise `false`
    /// and the error. The connection is released before returning.
    pub async fn conn_check(&self) -> (bool, Option<DbError>) {
        self.conn_check_with_context(&QueryContext::background())
            .await
    }

    pub async fn conn_check_with_context(&self, ctx: &QueryContext) -> (bool, Option<DbError>) {
        let mut conn = match self.provider.acquire_with_context(ctx).await {
            Ok(conn) => conn,
            Err(e) => return (false, Some(e)),
        };
        let result = ctx
            .run("ping", async { conn.ping().await.map_err(DbError::from) })
            .await;
        conn.release().await;

        match result {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e)),
        }
    }

    /// Pool statistics.
    pub async fn get_stats(&self) -> DbResult<PoolStats> {
        self.provider.stats().await
    }

    /// Close the pool. Outstanding rows, statements and transactions fail afterwards.
    pub async fn close(&self) {
        self.provider.close().await;
    }
}
