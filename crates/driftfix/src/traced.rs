//! Traced database connection wrapper.
//!
//! Wraps a pooled tokio-postgres connection and logs every statement via
//! tracing.

use std::ops::Deref;

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::Instrument;

/// A traced connection pool.
///
/// Wraps a `deadpool_postgres::Pool` and hands out `TracedConn`s.
#[derive(Clone)]
pub struct TracedPool {
    inner: deadpool_postgres::Pool,
}

impl TracedPool {
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { inner: pool }
    }

    /// Get a traced connection from the pool.
    pub async fn get(&self) -> Result<TracedConn, deadpool_postgres::PoolError> {
        let conn = self.inner.get().await?;
        Ok(TracedConn {
            inner: conn,
            statements: 0,
        })
    }

    /// Close the pool; connections are dropped once returned.
    pub fn close(&self) {
        self.inner.close();
    }
}

/// A traced connection that owns the underlying pooled connection.
///
/// Reads go through [`query`](Self::query) and friends; schema changes go
/// through [`apply`](Self::apply), which also counts executed statements so
/// callers can tell whether a run touched the schema at all.
pub struct TracedConn {
    inner: deadpool_postgres::Object,
    statements: u64,
}

impl TracedConn {
    fn client(&self) -> &tokio_postgres::Client {
        self.inner.deref()
    }

    /// Execute a query, returning all rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .client()
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Execute a query, returning exactly one row.
    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = 1u64,
        );
        self.client().query_one(sql, params).instrument(span).await
    }

    /// Run `statements` in order inside one transaction.
    ///
    /// Either every statement takes effect or none does.
    pub async fn apply(&mut self, statements: &[String]) -> Result<(), Error> {
        let tx = self.inner.transaction().await?;
        for sql in statements {
            let span = tracing::debug_span!("db.execute", sql = %sql);
            tx.batch_execute(sql).instrument(span).await?;
        }
        tx.commit().await?;
        self.statements += statements.len() as u64;
        Ok(())
    }

    /// Number of DDL statements committed through this connection.
    pub fn statements_executed(&self) -> u64 {
        self.statements
    }
}
