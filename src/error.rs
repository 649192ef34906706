//! Request-level errors and the HTTP statuses they map to.
//!
//! Every handler funnels its failures into [`ProxyError`], which the reply
//! layer turns into the JSON error body the front end expects. Nothing here
//! is retried.

use serde_json::Value;
use thiserror::Error;

/// A failed call to the FileMaker Data API, normalized from its error
/// envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamFailure {
    /// The HTTP status the backend answered with.
    pub status: u16,

    /// FileMaker's own error code (`"401"`, `"952"`, ...), if it sent one.
    pub code: Option<String>,

    /// The first message from the backend envelope, or a generic
    /// status-based message if the body couldn't be parsed.
    pub message: String,

    /// The raw `messages` array from the envelope, if there was one.
    pub details: Option<Value>,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    Validation(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("server configuration error: {0}")]
    Configuration(String),

    #[error("FileMaker authentication failed: {}", .0.message)]
    UpstreamAuth(UpstreamFailure),

    #[error("{step} failed: {}", failure.message)]
    UpstreamOperation {
        step: &'static str,
        failure: UpstreamFailure,
    },

    #[error("geocoding failed: {status} - {message}")]
    Geocoding { status: String, message: String },

    #[error("no file received in form part `{0}`")]
    NoFileReceived(String),

    #[error("failed to parse multipart/form-data: {0}")]
    Multipart(String),

    #[error("uploaded file exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl ProxyError {
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::Validation(_) => 400,
            ProxyError::MethodNotAllowed(_) => 405,
            ProxyError::Configuration(_) => 500,
            ProxyError::UpstreamAuth(f) => {
                if f.status >= 400 {
                    f.status
                } else {
                    401
                }
            }
            ProxyError::UpstreamOperation { failure, .. } => {
                // A backend that reports failure with a 2xx/3xx status still
                // failed from our caller's point of view.
                if failure.status >= 400 {
                    failure.status
                } else {
                    500
                }
            }
            ProxyError::Geocoding { .. } => 500,
            ProxyError::NoFileReceived(_) => 400,
            ProxyError::Multipart(_) => 400,
            ProxyError::PayloadTooLarge { .. } => 413,
            ProxyError::Transport(_) => 500,
            ProxyError::Unknown(_) => 500,
        }
    }

    /// Upstream error details worth passing back to the caller, if any.
    pub fn details(&self) -> Option<&Value> {
        match self {
            ProxyError::UpstreamAuth(f) => f.details.as_ref(),
            ProxyError::UpstreamOperation { failure, .. } => failure.details.as_ref(),
            _ => None,
        }
    }
}
