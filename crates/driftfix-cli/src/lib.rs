//! The repair scripts.
//!
//! Every binary is a one-liner around [`main`]; they take no arguments and
//! are configured through the environment (and a `.env` file, if present).

use std::process::ExitCode;

use driftfix::{CheckKind, Config, Mode};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "warn,driftfix=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Rename `*_locales` tables, link them to their parent and index them.
    FixLocales,
    /// Add upload/relationship columns and their foreign keys.
    FixUploadColumns,
    /// Every check, repairing.
    FixSchema,
    /// Every check, reporting only.
    CheckSchema,
    /// The framework's migration command with retries.
    RunMigrations,
}

impl Script {
    pub fn name(self) -> &'static str {
        match self {
            Script::FixLocales => "fix-locales",
            Script::FixUploadColumns => "fix-upload-columns",
            Script::FixSchema => "fix-schema",
            Script::CheckSchema => "check-schema",
            Script::RunMigrations => "run-migrations",
        }
    }

    /// Checks this script runs, or `None` for the migration runner.
    pub fn checks(self) -> Option<&'static [CheckKind]> {
        match self {
            Script::FixLocales => Some(&[
                CheckKind::LocalesNaming,
                CheckKind::LocalesParentKeys,
                CheckKind::LocalesIndexes,
            ]),
            Script::FixUploadColumns => Some(&[CheckKind::RelationColumns]),
            Script::FixSchema | Script::CheckSchema => Some(&CheckKind::ALL),
            Script::RunMigrations => None,
        }
    }

    pub fn mode(self) -> Mode {
        match self {
            Script::CheckSchema => Mode::Verify,
            _ => Mode::Repair,
        }
    }
}

/// Entry point shared by all binaries.
pub fn main(script: Script) -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {}: cannot start runtime: {}", "✗".red(), script.name(), e);
            return ExitCode::FAILURE;
        }
    };
    ExitCode::from(runtime.block_on(run(script)))
}

/// Run `script` and return its exit code.
pub async fn run(script: Script) -> u8 {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}: {}", "✗".red(), script.name(), e);
            return 1;
        }
    };

    let Some(checks) = script.checks() else {
        return match driftfix::run_migrations(&config).await {
            Ok(()) => {
                println!("{} migrations complete", "✓".green());
                0
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), script.name(), e);
                1
            }
        };
    };

    tracing::debug!(script = script.name(), checks = checks.len(), "starting");
    match driftfix::run_checks(&config, checks, script.mode()).await {
        Ok(report) => {
            report.print();
            report.exit_code()
        }
        Err(e) => {
            eprintln!("{} {}: {}", "✗".red(), script.name(), e);
            1
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}
