//! Row iterators and deferred single-row results.
//!
//! [`Rows`] is a lazy, forward-only iterator. Rows produced through the
//! client come from a background task that owns the connection and feeds a
//! bounded channel; the connection is released as soon as the result set is
//! exhausted, an error is reported or the iterator is dropped. Rows produced
//! inside a transaction stream directly off the transaction's connection.
//!
//! [`Row`] holds the outcome of a single-row query. Driver errors and the
//! "no rows" case stay inside it until [`Row::scan`] is called.

use crate::db::context::QueryContext;
use crate::db::params::bind_all;
use crate::db::pool::PooledConnection;
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use sqlx::FromRow;
use sqlx::mysql::MySqlRow;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::debug;

/// Rows buffered between the feeding task and the iterator.
const ROW_BUFFER: usize = 64;

enum RowSource<'a> {
    Channel(mpsc::Receiver<DbResult<MySqlRow>>),
    Stream(BoxStream<'a, Result<MySqlRow, sqlx::Error>>),
    Done,
}

/// Lazy, forward-only, single-pass result set.
pub struct Rows<'a> {
    source: RowSource<'a>,
    peeked: Option<MySqlRow>,
    ctx: QueryContext,
}

impl std::fmt::Debug for Rows<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("exhausted", &matches!(self.source, RowSource::Done))
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl Rows<'static> {
    /// Iterate rows produced by a background task.
    ///
    /// `produce` receives the sending half of the channel and owns whatever
    /// connection it reads from. The first result is awaited before returning
    /// so a rejected statement fails here rather than on the first
    /// [`Rows::next`].
    pub(crate) async fn spawn<P, F>(ctx: QueryContext, produce: P) -> DbResult<Self>
    where
        P: FnOnce(RowSender) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(ROW_BUFFER);
        tokio::spawn(produce(RowSender(sender)));

        let mut rows = Self {
            source: RowSource::Channel(receiver),
            peeked: None,
            ctx,
        };
        rows.prime().await?;
        Ok(rows)
    }
}

impl<'a> Rows<'a> {
    /// Iterate rows streamed off a borrowed connection.
    pub(crate) async fn from_stream(
        stream: BoxStream<'a, Result<MySqlRow, sqlx::Error>>,
        ctx: QueryContext,
    ) -> DbResult<Self> {
        let mut rows = Self {
            source: RowSource::Stream(stream),
            peeked: None,
            ctx,
        };
        rows.prime().await?;
        Ok(rows)
    }

    async fn prime(&mut self) -> DbResult<()> {
        match self.next().await {
            Some(Ok(row)) => {
                self.peeked = Some(row);
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    /// The context this iterator is bound to.
    pub fn context(&self) -> &QueryContext {
        &self.ctx
    }

    /// Advance to the next row.
    ///
    /// Returns `None` once the result set is exhausted. After an error the
    /// iterator is finished and every later call returns `None`.
    pub async fn next(&mut self) -> Option<DbResult<MySqlRow>> {
        if let Some(row) = self.peeked.take() {
            return Some(Ok(row));
        }

        let ctx = self.ctx.clone();
        let item = match &mut self.source {
            RowSource::Done => return None,
            RowSource::Channel(receiver) => {
                ctx.run("fetch row", async { receiver.recv().await.transpose() })
                    .await
            }
            RowSource::Stream(stream) => {
                ctx.run("fetch row", async {
                    stream.next().await.transpose().map_err(DbError::from)
                })
                .await
            }
        };

        match item {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.source = RowSource::Done;
                None
            }
            Err(e) => {
                self.source = RowSource::Done;
                Some(Err(e))
            }
        }
    }

    /// Drain the remaining rows, stopping at the first error.
    pub async fn try_collect(mut self) -> DbResult<Vec<MySqlRow>> {
        let mut out = Vec::new();
        while let Some(row) = self.next().await {
            out.push(row?);
        }
        Ok(out)
    }

    /// Stop iterating and release the underlying connection.
    pub fn close(self) {}
}

/// Sending half of a background row iterator.
pub(crate) struct RowSender(mpsc::Sender<DbResult<MySqlRow>>);

impl RowSender {
    /// Forward `stream` until it ends, fails or the iterator is dropped.
    pub(crate) async fn forward(&self, mut stream: BoxStream<'_, Result<MySqlRow, sqlx::Error>>) {
        loop {
            let item = tokio::select! {
                _ = self.0.closed() => {
                    debug!("Row iterator dropped before exhaustion");
                    break;
                }
                item = stream.next() => item,
            };
            let Some(item) = item else {
                break;
            };
            let failed = item.is_err();
            if self.0.send(item.map_err(DbError::from)).await.is_err() || failed {
                break;
            }
        }
    }
}

/// Run `sql` on a checked-out connection and iterate its rows.
pub(crate) async fn spawn_on_connection(
    conn: PooledConnection,
    sql: String,
    params: Vec<QueryParam>,
    ctx: QueryContext,
) -> DbResult<Rows<'static>> {
    Rows::spawn(ctx, move |sender| async move {
        let mut conn = conn;
        {
            let stream = bind_all(sqlx::query(&sql), &params).fetch(&mut *conn);
            sender.forward(stream).await;
        }
        conn.release().await;
    })
    .await
}

/// Deferred outcome of a single-row query.
pub struct Row {
    result: DbResult<Option<MySqlRow>>,
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("found", &matches!(self.result, Ok(Some(_))))
            .field("error", &self.err())
            .finish()
    }
}

impl Row {
    pub(crate) fn new(result: DbResult<Option<MySqlRow>>) -> Self {
        Self { result }
    }

    /// The deferred driver error, if the query failed.
    ///
    /// "No rows" is not an error here; it is reported by [`Row::scan`].
    pub fn err(&self) -> Option<&DbError> {
        self.result.as_ref().err()
    }

    /// Take the row, or the deferred error.
    ///
    /// A query that matched nothing yields `sqlx::Error::RowNotFound`.
    pub fn scan(self) -> DbResult<MySqlRow> {
        self.result?.ok_or(DbError::Driver(sqlx::Error::RowNotFound))
    }

    /// Decode the row into `T`.
    pub fn scan_as<T>(self) -> DbResult<T>
    where
        T: for<'r> FromRow<'r, MySqlRow>,
    {
        let row = self.scan()?;
        Ok(T::from_row(&row)?)
    }
}
