// src/error.rs

//! Unified error handling for the aggregator.

use std::fmt;

use thiserror::Error;

/// Result type alias for aggregator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Failure of a single host call.
///
/// These never escape an aggregation pass: the fetcher logs them, penalizes
/// the host in the health cache and the host contributes no records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure or timeout
    #[error("{host} unreachable: {message}")]
    HostUnreachable { host: String, message: String },

    /// Non-2xx status
    #[error("{host} answered with status {status}")]
    HostBadResponse { host: String, status: u16 },

    /// Empty body or unexpected payload shape
    #[error("{host} sent a malformed payload: {message}")]
    HostMalformedPayload { host: String, message: String },
}

impl FetchError {
    pub fn unreachable(host: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::HostUnreachable {
            host: host.into(),
            message: message.to_string(),
        }
    }

    pub fn bad_response(host: impl Into<String>, status: u16) -> Self {
        Self::HostBadResponse {
            host: host.into(),
            status,
        }
    }

    pub fn malformed(host: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::HostMalformedPayload {
            host: host.into(),
            message: message.to_string(),
        }
    }

    /// Host the failure belongs to.
    pub fn host(&self) -> &str {
        match self {
            Self::HostUnreachable { host, .. }
            | Self::HostBadResponse { host, .. }
            | Self::HostMalformedPayload { host, .. } => host,
        }
    }
}
