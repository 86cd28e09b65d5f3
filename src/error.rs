use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Already registered: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Unsupported remote URL: {0}")]
    RemoteParse(String),

    #[error("Source host error: {message}")]
    HostApi {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("No pull requests selected")]
    NoSelection,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn command(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        AppError::Command {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    pub fn host_api(message: impl Into<String>, status_code: Option<u16>) -> Self {
        AppError::HostApi {
            message: message.into(),
            status_code,
        }
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        tracing::error!("Connection pool error: {:?}", err);
        AppError::Pool(err.to_string())
    }
}

impl From<refinery::Error> for AppError {
    fn from(err: refinery::Error) -> Self {
        AppError::Internal(format!("Migration error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("HTTP error: {:?}", err);
        let status_code = err.status().map(|s| s.as_u16());
        if err.is_timeout() {
            AppError::host_api("Request timed out", status_code)
        } else if err.is_connect() {
            AppError::host_api("Failed to connect to source host", status_code)
        } else {
            AppError::host_api(err.to_string(), status_code)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::InvalidInput(format!("Invalid JSON: {}", err))
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // In debug mode, return detailed error messages for debugging
        #[cfg(debug_assertions)]
        let user_message = self.to_string();

        // In release mode, generalize infrastructure errors to prevent information leakage
        #[cfg(not(debug_assertions))]
        let user_message = match self {
            AppError::Database(_) | AppError::Pool(_) => "Database error occurred".to_string(),
            AppError::Io(_) => "File operation failed".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal error occurred".to_string(),
            other => other.to_string(),
        };

        serializer.serialize_str(&user_message)
    }
}

pub type AppResult<T> = Result<T, AppError>;
