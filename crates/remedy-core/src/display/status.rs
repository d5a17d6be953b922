//! Confirmation messages for operator commands.

use std::fmt;

use crate::{error::EngineError, models::DeploymentStatus};

/// Outcome line printed after an operator command.
pub struct OperationStatus {
    pub message: String,
    pub success: bool,
}

impl OperationStatus {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }

    /// Success line naming the status a command left the deployment in.
    pub fn now(command: &str, status: DeploymentStatus) -> Self {
        Self::success(format!("{command} accepted, deployment is {}", status.with_icon()))
    }
}

impl From<&EngineError> for OperationStatus {
    fn from(error: &EngineError) -> Self {
        Self::failure(error.to_string())
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}",
            if self.success { "Success:" } else { "Error:" },
            self.message
        )
    }
}
