//! driftfix - detect and repair drift between the schema a CMS framework
//! expects and the one actually present in Postgres.
//!
//! A run goes: [`Config`] → [`guard::connect`] → [`Engine::run`] over some
//! [`CheckKind`]s → [`Report`]. The scripts in `driftfix-cli` are thin
//! wrappers around [`run_checks`].

pub mod action;
pub mod checks;
pub mod config;
mod engine;
mod error;
pub mod expect;
pub mod guard;
mod inventory;
pub mod migrate;
mod report;
mod traced;

pub use action::RepairAction;
pub use checks::{CheckKind, Finding};
pub use config::{Config, ConfigError, DuplicatePolicy};
pub use engine::{Engine, Mode};
pub use error::{Error, describe_pg_error};
pub use expect::Expectations;
pub use guard::{Database, Guarded};
pub use inventory::Inventory;
pub use migrate::{Backoff, run_migrations};
pub use report::{CheckResult, CheckState, Report};
pub use traced::{TracedConn, TracedPool};

// Re-export the descriptor types
pub use driftfix_schema as schema;

pub type Result<T> = std::result::Result<T, Error>;

/// Connect, run `checks` in `mode`, and close the connection.
///
/// Connection failures are errors; everything that goes wrong after the
/// guard has passed ends up in the report instead.
pub async fn run_checks(config: &Config, checks: &[CheckKind], mode: Mode) -> Result<Report> {
    let mut db = match guard::connect(config).await? {
        Guarded::Placeholder => return Ok(Report::placeholder()),
        Guarded::Connected(db) => db,
    };
    let report = Engine::new(db.conn(), config, mode).run(checks).await;
    db.close();
    Ok(report)
}
