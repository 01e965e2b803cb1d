//! Registry client error types.

use thiserror::Error;

/// Errors returned by [`crate::RegistryClient`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The base URL could not be parsed.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// The base URL does not use http or https.
    #[error("invalid URL scheme: {0} (must be http or https)")]
    InvalidScheme(String),

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// DNS, TCP, TLS or body-read failure.
    #[error("failed to execute HTTP request: {0}")]
    Transport(#[source] reqwest::Error),

    /// Non-2xx response carrying a structured error body.
    #[error("API error (status {status}): {detail}")]
    Api { status: u16, detail: String },

    /// Non-2xx response whose body was not a structured error.
    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Request body could not be serialized.
    #[error("failed to marshal request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// 2xx response whose body did not match the expected shape.
    #[error("failed to unmarshal response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RegistryError {
    /// HTTP status code, if the registry answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is a construction-time configuration problem.
    ///
    /// These do not go away by retrying; the endpoint has to change.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl(_) | Self::InvalidScheme(_) | Self::Client(_)
        )
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Transport(err)
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
