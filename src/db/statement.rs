//! Prepared statements.

use crate::db::context::QueryContext;
use crate::db::params::bind_all;
use crate::db::rows::{Row, Rows};
use crate::error::{DbError, DbResult};
use crate::models::{ExecResult, QueryParam};
use sqlx::mysql::MySqlStatement;
use sqlx::{Executor, MySqlPool, Statement as _};
use tracing::debug;

/// A statement prepared against the pool.
///
/// The handle is not tied to a single connection: each call runs on whichever
/// pooled connection is free, and the driver re-prepares where needed. It can
/// be executed repeatedly with different parameter sets until [`close`]d.
///
/// [`close`]: Statement::close
#[derive(Clone)]
pub struct Statement {
    inner: MySqlStatement<'static>,
    pool: MySqlPool,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql())
            .finish_non_exhaustive()
    }
}

impl Statement {
    pub(crate) async fn prepare(pool: &MySqlPool, sql: &str) -> DbResult<Self> {
        let prepared = pool.prepare(sql).await?;
        debug!(sql = %sql, "Statement prepared");
        Ok(Self {
            inner: sqlx::Statement::to_owned(&prepared),
            pool: pool.clone(),
        })
    }

    /// The SQL text this statement was prepared from.
    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    pub(crate) async fn query(
        &self,
        params: &[QueryParam],
        ctx: QueryContext,
    ) -> DbResult<Rows<'static>> {
        let inner = self.inner.clone();
        let pool = self.pool.clone();
        let params = params.to_vec();
        Rows::spawn(ctx, move |sender| async move {
            let stream = bind_all(inner.query(), &params).fetch(&pool);
            sender.forward(stream).await;
        })
        .await
    }

    pub(crate) async fn query_row(&self, params: &[QueryParam], ctx: &QueryContext) -> Row {
        let result = ctx
            .run("statement query row", async {
                bind_all(self.inner.query(), params)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(DbError::from)
            })
            .await;
        Row::new(result)
    }

    pub(crate) async fn exec(
        &self,
        params: &[QueryParam],
        ctx: &QueryContext,
    ) -> DbResult<ExecResult> {
        ctx.run("statement exec", async {
            let result = bind_all(self.inner.query(), params)
                .execute(&self.pool)
                .await?;
            Ok(ExecResult::from(result))
        })
        .await
    }

    /// Release the statement handle.
    pub fn close(self) {
        debug!(sql = %self.sql(), "Statement closed");
    }
}
