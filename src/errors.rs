use reqwest::StatusCode;
use thiserror::Error;

use crate::models::verification::VerificationStatus;

pub type Result<T> = std::result::Result<T, PortalError>;

#[derive(Debug, Error)]
pub enum PortalError {
    /// The backend rejected the bearer token. The shared session has been cleared.
    #[error("session expired or invalid; log in again")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("verification request {id} was already decided ({status})")]
    AlreadyDecided {
        id: String,
        status: VerificationStatus,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{service} returned {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("backend broke the response contract: {0}")]
    Contract(String),

    #[error("intent store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("session error: {0}")]
    Session(String),
}

impl PortalError {
    /// Build the error for a non-success response, using the server's message.
    pub fn from_status(service: &'static str, status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => PortalError::Unauthorized,
            StatusCode::FORBIDDEN => PortalError::Forbidden(message),
            StatusCode::NOT_FOUND => PortalError::NotFound(message),
            StatusCode::CONFLICT => PortalError::Conflict(message),
            _ => PortalError::Api {
                service,
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether the same request may be sent again with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        match self {
            PortalError::Transport(_) => true,
            PortalError::Api { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}

/// Pull the operator-facing message out of an error body.
///
/// Backends answer `{"message": "..."}`; some gateways use `{"error": "..."}`.
pub fn extract_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(msg) = value.get(field).and_then(|v| v.as_str()) {
                if !msg.trim().is_empty() {
                    return msg.to_string();
                }
            }
        }
    }
    status
        .canonical_reason()
        .unwrap_or("unexpected response")
        .to_string()
}
