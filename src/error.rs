//! Error types for the sheetgate crate

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of a failure.
///
/// The retrier consults this to decide whether an error is transient
/// (worth another attempt) or fatal (surfaced immediately).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity failures: refused connections, resets, broken pipes
    Network,
    /// The request or the whole operation timed out
    Timeout,
    /// The backend answered 429
    RateLimited,
    /// The backend answered 5xx
    Server,
    /// Missing or rejected credentials
    Auth,
    /// The addressed resource does not exist
    NotFound,
    /// The caller handed us something malformed
    InvalidInput,
    /// The backend answered with a body we could not interpret
    InvalidResponse,
}

/// Top-level error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A retried operation ran out of attempts; carries the last cause.
    #[error("operation '{operation}' failed after {attempts} attempts")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A retried operation blew through its overall deadline.
    #[error("operation '{operation}' exceeded its deadline")]
    DeadlineExceeded { operation: String },
}

impl Error {
    /// Retryability classification, if one applies.
    ///
    /// `None` means the error is never retried: exhausted/deadline wrappers,
    /// local I/O, config problems.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Api(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Errors from the remote spreadsheet/file-storage backend
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed. Check the configured backend API key.")]
    Unauthorized,

    #[error("Access denied. The credential cannot touch this resource.")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Session token expired or malformed")]
    InvalidToken,
}

impl ApiError {
    /// Map each variant onto its [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized | ApiError::Forbidden | ApiError::InvalidToken => {
                ErrorKind::Auth
            }
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::RateLimit(_) => ErrorKind::RateLimited,
            ApiError::BadRequest(_) => ErrorKind::InvalidInput,
            ApiError::ServerError(_) => ErrorKind::Server,
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to backend".to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("Backend API key not configured")]
    MissingApiKey,

    #[error("Spreadsheet id not configured")]
    MissingSpreadsheetId,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
