use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot connect to database: {0}")]
    Connect(String),

    #[error("postgres error: {}", describe_pg_error(.0))]
    Postgres(#[from] tokio_postgres::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration command failed after {attempts} attempt(s): {reason}")]
    MigrationFailed { attempts: u32, reason: String },
}

/// Prefer the server's message over the driver's generic "db error".
pub fn describe_pg_error(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => err.to_string(),
    }
}
