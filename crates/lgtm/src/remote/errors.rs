use thiserror::Error;

use crate::http::HttpError;

/// Errors returned by the remote follow-state service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The service answered with a non-success status envelope.
    #[error("{status}: {error}{}", fmt_message(.message))]
    Status {
        status: String,
        error: String,
        message: Option<String>,
    },

    /// The requested resource (usually a project slug) is unknown to the service.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Non-2xx HTTP status without a decodable status envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network or connection error.
    #[error("Network error: {0}")]
    Network(#[from] HttpError),

    /// The response body did not have the expected shape.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Credentials or other client configuration is unusable.
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

fn fmt_message(message: &Option<String>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!(" ({m})"),
        _ => String::new(),
    }
}

impl RemoteError {
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    #[inline]
    pub fn status(status: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Status {
            status: status.into(),
            error: error.into(),
            message: None,
        }
    }

    /// Check if the service reported that the resource does not exist.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the underlying transport timed out.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message so multi-line bodies don't
/// break progress output.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;
