// src/error.rs

//! Unified error handling for the archiver.

use thiserror::Error;

/// Result type alias for archiver operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Unexpected HTTP status
    #[error("unexpected status {code} for {url}")]
    Status { code: u16, url: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layout error
    #[error("Storage error at {path}: {message}")]
    Storage { path: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a storage error with the offending path.
    pub fn storage(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error is worth retrying within the same cycle.
    ///
    /// Timeouts, connection failures (including resets mid-request or
    /// mid-body) and 5xx responses are transient; everything else is
    /// either fatal or handled elsewhere. Local JSON parsing goes
    /// through `serde_json`, so `is_decode` here only ever means the
    /// body transfer itself broke.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || e.is_decode()
            }
            Self::Status { code, .. } => *code >= 500,
            _ => false,
        }
    }
}
