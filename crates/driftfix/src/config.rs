//! Environment configuration.
//!
//! Every script is configured through the environment only; binaries load a
//! `.env` file first (via dotenvy) so local runs behave like deploys.

use std::fmt;
use thiserror::Error;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const SCHEMA: &str = "DRIFTFIX_SCHEMA";
pub const DUPLICATE_POLICY: &str = "DRIFTFIX_DUPLICATE_POLICY";
pub const MIGRATE_CMD: &str = "DRIFTFIX_MIGRATE_CMD";
pub const MIGRATE_ATTEMPTS: &str = "DRIFTFIX_MIGRATE_ATTEMPTS";

const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_MIGRATE_CMD: &str = "npx payload migrate";
const DEFAULT_MIGRATE_ATTEMPTS: u32 = 5;

/// What to do with a `*_locales` table whose `*__locales` counterpart
/// already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Drop the single-underscore table; the double-underscore one wins.
    #[default]
    Drop,
    /// Leave both in place and report the table as needing attention.
    Keep,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicatePolicy::Drop => f.write_str("drop"),
            DuplicatePolicy::Keep => f.write_str("keep"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub schema: String,
    pub duplicate_policy: DuplicatePolicy,
    pub migrate_command: String,
    pub migrate_attempts: u32,
}

impl Config {
    /// A config with defaults for everything but the URL.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            duplicate_policy: DuplicatePolicy::default(),
            migrate_command: DEFAULT_MIGRATE_CMD.to_string(),
            migrate_attempts: DEFAULT_MIGRATE_ATTEMPTS,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get(DATABASE_URL).ok_or(ConfigError::MissingDatabaseUrl)?;
        let mut config = Config::new(database_url);

        if let Some(schema) = get(SCHEMA) {
            config.schema = schema;
        }

        if let Some(policy) = get(DUPLICATE_POLICY) {
            config.duplicate_policy = match policy.trim().to_ascii_lowercase().as_str() {
                "drop" => DuplicatePolicy::Drop,
                "keep" => DuplicatePolicy::Keep,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: DUPLICATE_POLICY,
                        value: policy,
                        expected: "`drop` or `keep`",
                    });
                }
            };
        }

        if let Some(command) = get(MIGRATE_CMD) {
            config.migrate_command = command;
        }

        if let Some(attempts) = get(MIGRATE_ATTEMPTS) {
            config.migrate_attempts = match attempts.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: MIGRATE_ATTEMPTS,
                        value: attempts,
                        expected: "a positive integer",
                    });
                }
            };
        }

        Ok(config)
    }
}

/// Errors that can occur when reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("{var}={value:?} is invalid, expected {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Mask the password in a database URL for display.
pub fn mask_password(url: &str) -> String {
    if let Some(start) = url.find("://") {
        if let Some(at) = url.rfind('@') {
            if at > start {
                let credentials = &url[start + 3..at];
                if let Some(colon) = credentials.find(':') {
                    return format!(
                        "{}{}:***{}",
                        &url[..start + 3],
                        &credentials[..colon],
                        &url[at..]
                    );
                }
            }
        }
    }
    url.to_string()
}
