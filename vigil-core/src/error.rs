//! Error taxonomy for calls against the scan service.

use thiserror::Error;

/// Failure classes of a single gateway call.
///
/// Payloads are plain strings so errors can be cloned into tracker events
/// and status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The service rejected the submitted input.
    #[error("validation rejected by service: {0}")]
    Validation(String),

    /// Transport failure, including request timeouts.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status, or a success status with an unreadable body.
    #[error("service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// The referenced scan does not exist on the service.
    #[error("scan {0} not found")]
    NotFound(String),
}

impl GatewayError {
    /// Whether the tracker may retry on the next poll tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Network(_) | GatewayError::Service { .. })
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Network(format!("request timed out: {err}"))
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
