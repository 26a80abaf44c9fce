//! Connection guard.
//!
//! Nothing runs against the database until a trivial query has succeeded.
//! Build pipelines run the scripts with a fake URL; those are recognised up
//! front and short-circuit to success without touching the network.

use deadpool_postgres::{Manager, ManagerConfig, Pool};
use tokio_postgres::NoTls;

use crate::config::{Config, mask_password};
use crate::error::describe_pg_error;
use crate::traced::{TracedConn, TracedPool};
use crate::{Error, Result};

/// Marker substring of the build-time placeholder connection string.
pub const PLACEHOLDER_MARKER: &str = "fake:fake@fake";

/// True if `url` is the build-time placeholder rather than a real database.
pub fn is_placeholder(url: &str) -> bool {
    url.contains(PLACEHOLDER_MARKER)
}

/// A checked-out, verified connection plus the pool that owns it.
pub struct Database {
    pool: TracedPool,
    conn: TracedConn,
}

impl Database {
    pub fn conn(&mut self) -> &mut TracedConn {
        &mut self.conn
    }

    /// Return the connection and close the pool.
    pub fn close(self) {
        let Database { pool, conn } = self;
        drop(conn);
        pool.close();
    }
}

/// Outcome of the guard.
pub enum Guarded {
    /// The URL is the build placeholder; skip all work.
    Placeholder,
    Connected(Database),
}

/// Verify the database is reachable.
///
/// The pool is capped at a single connection. Failure is fatal and not
/// retried.
pub async fn connect(config: &Config) -> Result<Guarded> {
    if is_placeholder(&config.database_url) {
        tracing::info!("placeholder database url, skipping");
        return Ok(Guarded::Placeholder);
    }

    let pg_config: tokio_postgres::Config = config
        .database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| Error::Connect(describe_pg_error(&e)))?;

    let manager = Manager::from_config(pg_config, NoTls, ManagerConfig::default());
    let pool = Pool::builder(manager)
        .max_size(1)
        .build()
        .map_err(|e| Error::Connect(e.to_string()))?;
    let pool = TracedPool::new(pool);

    let conn = pool.get().await.map_err(|e| {
        Error::Connect(format!("{}: {}", mask_password(&config.database_url), e))
    })?;
    conn.query_one("SELECT 1", &[])
        .await
        .map_err(|e| Error::Connect(describe_pg_error(&e)))?;

    tracing::debug!(url = %mask_password(&config.database_url), "connected");
    Ok(Guarded::Connected(Database { pool, conn }))
}
