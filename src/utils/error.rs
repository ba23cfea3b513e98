//! Error Handling
//!
//! Unified error types for the orchestrator.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use webtest_client::ApiError;
use webtest_core::CoreError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Remote service errors, shown to the operator as the service phrased them
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Errors from the shared core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operator action that the current workflow phase does not allow
    #[error("Cannot {action} while {phase}")]
    InvalidTransition { phase: String, action: String },

    /// The execution job failed or was lost
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The workflow was cancelled by the operator
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid transition error
    pub fn invalid_transition(phase: impl std::fmt::Display, action: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            phase: phase.to_string(),
            action: action.to_string(),
        }
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a cancelled error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Transient remote failure that a later tick or reconnect may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Api(e) if e.is_transient())
    }
}

/// Convert AppError to the operator-facing string attached to the workflow
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
