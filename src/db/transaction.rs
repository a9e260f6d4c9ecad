//! Transaction handles.
//!
//! A [`Tx`] owns a dedicated pooled connection from `BEGIN` until it is
//! committed or rolled back. Both terminators consume the handle, so a
//! transaction cannot be finished twice. Nothing in this module rolls back
//! on error; a handle dropped without being finished is discarded by the
//! driver when its connection returns to the pool.
//!
//! Transactions take their connection straight from the pool, so the
//! max-idle ceiling enforced by [`PooledConnection::release`] does not apply
//! when they finish. The pool's idle timeout reclaims any surplus.
//!
//! [`PooledConnection::release`]: crate::db::PooledConnection::release

use crate::db::context::QueryContext;
use crate::db::params::bind_all;
use crate::db::rows::{Row, Rows};
use crate::error::{DbError, DbResult};
use crate::models::{ExecResult, QueryParam, TransactionInfo};
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlStatement;
use sqlx::{Executor, MySql, MySqlPool, Statement as _, Transaction};
use tracing::{debug, info, warn};

/// An open transaction.
pub struct Tx {
    inner: Option<Transaction<'static, MySql>>,
    id: String,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl Tx {
    pub(crate) async fn begin(pool: &MySqlPool, ctx: &QueryContext) -> DbResult<Self> {
        let inner = ctx
            .run("begin transaction", async {
                pool.begin().await.map_err(DbError::from)
            })
            .await?;
        let tx = Self {
            inner: Some(inner),
            id: generate_transaction_id(),
            started_at: Utc::now(),
        };
        info!(transaction_id = %tx.id, "Transaction started");
        Ok(tx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn info(&self) -> TransactionInfo {
        TransactionInfo {
            id: self.id.clone(),
            started_at: self.started_at,
        }
    }

    fn transaction(&mut self) -> DbResult<&mut Transaction<'static, MySql>> {
        self.inner
            .as_mut()
            .ok_or(DbError::Driver(sqlx::Error::PoolClosed))
    }

    pub(crate) async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [QueryParam],
        ctx: QueryContext,
    ) -> DbResult<Rows<'a>> {
        debug!(transaction_id = %self.id, sql = %sql, params = params.len(), "Transaction query");
        let tx = self.transaction()?;
        let stream = bind_all(sqlx::query(sql), params).fetch(&mut **tx);
        Rows::from_stream(stream, ctx).await
    }

    pub(crate) async fn query_row(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        ctx: &QueryContext,
    ) -> Row {
        debug!(transaction_id = %self.id, sql = %sql, params = params.len(), "Transaction query row");
        let result = match self.transaction() {
            Ok(tx) => {
                ctx.run("transaction query row", async {
                    bind_all(sqlx::query(sql), params)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(DbError::from)
                })
                .await
            }
            Err(e) => Err(e),
        };
        Row::new(result)
    }

    pub(crate) async fn exec(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        ctx: &QueryContext,
    ) -> DbResult<ExecResult> {
        debug!(transaction_id = %self.id, sql = %sql, params = params.len(), "Transaction exec");
        let tx = self.transaction()?;
        ctx.run("transaction exec", async {
            let result = bind_all(sqlx::query(sql), params)
                .execute(&mut **tx)
                .await?;
            Ok(ExecResult::from(result))
        })
        .await
    }

    pub(crate) async fn prepare(&mut self, sql: &str, ctx: &QueryContext) -> DbResult<TxStatement> {
        debug!(transaction_id = %self.id, sql = %sql, "Transaction prepare");
        let transaction_id = self.id.clone();
        let tx = self.transaction()?;
        ctx.run("transaction prepare", async {
            let prepared = (&mut **tx).prepare(sql).await?;
            Ok(TxStatement {
                inner: sqlx::Statement::to_owned(&prepared),
                transaction_id,
            })
        })
        .await
    }

    pub(crate) async fn stmt_query<'a>(
        &'a mut self,
        stmt: &'a TxStatement,
        params: &'a [QueryParam],
        ctx: QueryContext,
    ) -> DbResult<Rows<'a>> {
        debug!(transaction_id = %self.id, sql = %stmt.sql(), params = params.len(), "Transaction statement query");
        let tx = self.transaction()?;
        let stream = bind_all(stmt.inner.query(), params).fetch(&mut **tx);
        Rows::from_stream(stream, ctx).await
    }

    pub(crate) async fn stmt_query_row(
        &mut self,
        stmt: &TxStatement,
        params: &[QueryParam],
        ctx: &QueryContext,
    ) -> Row {
        let result = match self.transaction() {
            Ok(tx) => {
                ctx.run("transaction statement query row", async {
                    bind_all(stmt.inner.query(), params)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(DbError::from)
                })
                .await
            }
            Err(e) => Err(e),
        };
        Row::new(result)
    }

    pub(crate) async fn stmt_exec(
        &mut self,
        stmt: &TxStatement,
        params: &[QueryParam],
        ctx: &QueryContext,
    ) -> DbResult<ExecResult> {
        debug!(transaction_id = %self.id, sql = %stmt.sql(), params = params.len(), "Transaction statement exec");
        let tx = self.transaction()?;
        ctx.run("transaction statement exec", async {
            let result = bind_all(stmt.inner.query(), params)
                .execute(&mut **tx)
                .await?;
            Ok(ExecResult::from(result))
        })
        .await
    }

    /// Commit and consume the transaction.
    pub async fn commit(mut self) -> DbResult<()> {
        let tx = self.inner.take().ok_or(DbError::Driver(sqlx::Error::PoolClosed))?;
        tx.commit().await?;
        info!(transaction_id = %self.id, "Transaction committed");
        Ok(())
    }

    /// Roll back and consume the transaction.
    pub async fn rollback(mut self) -> DbResult<()> {
        let tx = self.inner.take().ok_or(DbError::Driver(sqlx::Error::PoolClosed))?;
        tx.rollback().await?;
        info!(transaction_id = %self.id, "Transaction rolled back");
        Ok(())
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.inner.is_some() {
            warn!(
                transaction_id = %self.id,
                "Transaction dropped without commit or rollback; the driver will discard it"
            );
        }
    }
}

/// A statement prepared on a transaction's connection.
///
/// Use it with the transaction it was prepared in.
#[derive(Clone)]
pub struct TxStatement {
    inner: MySqlStatement<'static>,
    transaction_id: String,
}

impl std::fmt::Debug for TxStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxStatement")
            .field("transaction_id", &self.transaction_id)
            .field("sql", &self.sql())
            .finish_non_exhaustive()
    }
}

impl TxStatement {
    /// The SQL text this statement was prepared from.
    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    /// Id of the transaction this statement belongs to.
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }
}

fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert!(id.starts_with("tx_"));
        assert_eq!(id.len(), 3 + 32);
    }

    #[test]
    fn test_tx_statement_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TxStatement>();
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        assert_ne!(generate_transaction_id(), generate_transaction_id());
    }
}
