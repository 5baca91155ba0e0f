//! Command line configuration.
//!
//! ```text
//! rusty-remittance <accounts.csv> <transfers.csv> [--workers N] [--log-level LEVEL] [--json]
//! ```

use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_WORKERS: usize = 8;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Usage: cargo run -- accounts.csv transfers.csv [--workers N] [--log-level LEVEL] [--json]")]
    Usage,

    #[error("Invalid worker count '{0}': expected a positive integer")]
    InvalidWorkers(String),

    #[error("Missing value for option {0}")]
    MissingValue(String),

    #[error("Unknown option {0}")]
    UnknownOption(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub accounts_path: PathBuf,
    pub transfers_path: PathBuf,
    /// Threads executing transfers in the sync runner
    pub workers: usize,
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,
    pub json_logs: bool,
}

impl Config {
    /// Parses the arguments that follow the program name.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut positional = Vec::new();
        let mut workers = DEFAULT_WORKERS;
        let mut log_level = DEFAULT_LOG_LEVEL.to_owned();
        let mut json_logs = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--workers" => {
                    let value = args
                        .next()
                        .ok_or_else(|| ConfigError::MissingValue(arg.clone()))?;
                    workers = match value.parse::<usize>() {
                        Ok(n) if n > 0 => n,
                        _ => return Err(ConfigError::InvalidWorkers(value)),
                    };
                }
                "--log-level" => {
                    log_level = args
                        .next()
                        .ok_or_else(|| ConfigError::MissingValue(arg.clone()))?;
                }
                "--json" => json_logs = true,
                flag if flag.starts_with("--") => return Err(ConfigError::UnknownOption(arg)),
                _ => positional.push(arg),
            }
        }

        let [accounts_path, transfers_path]: [String; 2] =
            positional.try_into().map_err(|_| ConfigError::Usage)?;

        Ok(Self {
            accounts_path: accounts_path.into(),
            transfers_path: transfers_path.into(),
            workers,
            log_level,
            json_logs,
        })
    }
}
