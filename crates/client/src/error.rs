//! API Error Types
//!
//! Classification of every failure a remote call can produce. The split
//! decides what the orchestrator does next: transient errors are retried on
//! the next poll tick or reconnect, everything else is surfaced to the
//! operator verbatim.

use thiserror::Error;

/// Error returned by [`crate::TestingApi`] and [`crate::EventSource`] calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connection failure, timeout, or a 5xx from the service.
    #[error("Service unavailable: {0}")]
    Transient(String),

    /// The job is not in the status the action requires.
    #[error("{0}")]
    Conflict(String),

    /// Request rejected as malformed (empty document, bad field values).
    #[error("{0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Plan or rate limit reached. Retrying will not help.
    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn quota(msg: impl Into<String>) -> Self {
        Self::Quota(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Map an HTTP status and the server-provided detail text.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match status {
            400 | 422 => Self::Validation(detail),
            401 | 403 => Self::Unauthorized(detail),
            402 | 429 => Self::Quota(detail),
            404 => Self::NotFound(detail),
            409 => Self::Conflict(detail),
            500..=599 => Self::Transient(detail),
            _ => Self::Decode(format!("HTTP {}: {}", status, detail)),
        }
    }

    /// Safe to retry on the next tick or reconnect.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        Self::Transient(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ApiError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Http(response) => {
                let status = response.status().as_u16();
                Self::from_status(status, format!("push channel rejected with HTTP {}", status))
            }
            WsError::Url(e) => Self::Validation(format!("invalid push channel URL: {}", e)),
            other => Self::Transient(other.to_string()),
        }
    }
}

impl From<ApiError> for String {
    fn from(err: ApiError) -> Self {
        err.to_string()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
