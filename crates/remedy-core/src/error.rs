//! Error types for the deployment engine.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::{ControlAction, DeploymentStatus};

/// Comprehensive error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The executor refused or never answered a plan submission
    #[error("Submission rejected: {message}")]
    Submission {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },
    /// A pause/resume/cancel/rollback/skip request failed at the executor
    #[error("{} request rejected: {message}", .action.as_str())]
    ControlRejected {
        action: ControlAction,
        message: String,
    },
    /// Operation is not valid in the current state; nothing was changed
    #[error("Cannot {action} while deployment is {}: {reason}", .status.as_str())]
    Precondition {
        action: String,
        status: DeploymentStatus,
        reason: String,
    },
    /// Step index does not exist in the active deployment
    #[error("Step {index} not found")]
    StepNotFound { index: usize },
    /// Status lookup or analysis call failed at the transport level
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },
    /// Event stream connection could not be opened
    #[error("Stream connection error: {message}")]
    Stream { message: String },
    /// Frame or response body could not be decoded
    #[error("Decode error: {source}")]
    Decode {
        #[from]
        source: serde_json::Error,
    },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid input validation errors
    #[error("Invalid input for field '{field}': {reason}")]
    InvalidInput { field: String, reason: String },
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
    /// The controller actor has shut down
    #[error("Deployment controller is no longer running")]
    ControllerClosed,
}

/// Builder for creating input validation errors.
pub struct InvalidInputBuilder {
    field: String,
}

impl InvalidInputBuilder {
    /// Create a new invalid input error builder for a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Build the error with the given reason.
    pub fn with_reason(self, reason: impl Into<String>) -> EngineError {
        EngineError::InvalidInput {
            field: self.field,
            reason: reason.into(),
        }
    }
}

/// Builder for precondition failures on controller operations.
pub struct PreconditionBuilder {
    action: String,
    status: DeploymentStatus,
}

impl PreconditionBuilder {
    pub fn new(action: impl Into<String>, status: DeploymentStatus) -> Self {
        Self {
            action: action.into(),
            status,
        }
    }

    pub fn with_reason(self, reason: impl Into<String>) -> EngineError {
        EngineError::Precondition {
            action: self.action,
            status: self.status,
            reason: reason.into(),
        }
    }
}

impl EngineError {
    /// Creates a builder for input validation errors.
    pub fn invalid_input(field: impl Into<String>) -> InvalidInputBuilder {
        InvalidInputBuilder::new(field)
    }

    /// Creates a builder for precondition errors.
    pub fn precondition(action: impl Into<String>, status: DeploymentStatus) -> PreconditionBuilder {
        PreconditionBuilder::new(action, status)
    }

    /// Submission failure without an underlying transport error.
    pub fn submission(message: impl Into<String>) -> Self {
        EngineError::Submission {
            message: message.into(),
            source: None,
        }
    }

    pub fn control_rejected(action: ControlAction, message: impl Into<String>) -> Self {
        EngineError::ControlRejected {
            action,
            message: message.into(),
        }
    }

    /// Whether the failure left local state untouched and may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Submission { .. }
                | EngineError::Transport { .. }
                | EngineError::Stream { .. }
        )
    }
}

/// Extension trait for Result to provide concise error mapping with
/// anyhow-style context.
pub trait ResultExt<T, E> {
    /// Add context to any error type, converting to EngineError.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static;
}

/// Specialized extension trait for HTTP results.
pub trait TransportResultExt<T> {
    /// Map transport errors with a message.
    fn transport_context(self, message: &str) -> Result<T>;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| EngineError::Configuration {
            message: format!("{}: {}", context, e),
        })
    }
}

impl<T> TransportResultExt<T> for std::result::Result<T, reqwest::Error> {
    fn transport_context(self, message: &str) -> Result<T> {
        self.map_err(|e| EngineError::Transport {
            message: format!("{message}: {e}"),
            source: Some(e),
        })
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_message_names_action_and_status() {
        let err = EngineError::precondition("rollback", DeploymentStatus::Running)
            .with_reason("plan is not reversible");
        assert_eq!(
            err.to_string(),
            "Cannot rollback while deployment is running: plan is not reversible"
        );
    }

    #[test]
    fn test_control_rejected_message() {
        let err = EngineError::control_rejected(ControlAction::Pause, "HTTP 409");
        assert_eq!(err.to_string(), "pause request rejected: HTTP 409");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_submission_is_retryable() {
        assert!(EngineError::submission("HTTP 503").is_retryable());
    }
}
