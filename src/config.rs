use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::host::DEFAULT_API_URL;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration, read from the environment (and a `.env` file if present)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` uses the platform data directory
    pub db_path: Option<PathBuf>,
    pub github_token: Option<String>,
    pub github_api_url: String,
    /// `None` lets git commands run without a deadline
    pub command_timeout: Option<Duration>,
    pub http_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            github_token: None,
            github_api_url: DEFAULT_API_URL.to_string(),
            command_timeout: Some(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS)),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

fn parse_secs(name: &str, value: Option<String>, default: u64) -> AppResult<u64> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a number of seconds, got {:?}", name, v))),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is fine
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(AppError::Config(format!("Failed to read .env: {}", e)));
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let command_secs = parse_secs(
            "GPM_COMMAND_TIMEOUT_SECS",
            var("GPM_COMMAND_TIMEOUT_SECS"),
            DEFAULT_COMMAND_TIMEOUT_SECS,
        )?;
        let http_secs = parse_secs(
            "GPM_HTTP_TIMEOUT_SECS",
            var("GPM_HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;
        if http_secs == 0 {
            return Err(AppError::Config(
                "GPM_HTTP_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            db_path: var("GPM_DB_PATH").map(PathBuf::from),
            github_token: var("GITHUB_TOKEN").map(|t| t.trim().to_string()),
            github_api_url: var("GITHUB_API_URL")
                .map(|u| u.trim().to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            // 0 disables the deadline
            command_timeout: (command_secs > 0).then(|| Duration::from_secs(command_secs)),
            http_timeout: Duration::from_secs(http_secs),
        })
    }
}
