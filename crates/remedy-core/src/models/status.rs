//! Status enumerations for deployments, steps and plans.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Overall status of a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// No deployment has been submitted yet
    #[default]
    Ready,

    /// The executor is working through the plan
    Running,

    /// Execution is suspended between steps
    Paused,

    /// Every step the executor chose to run has finished
    Completed,

    /// The executor reported a terminal failure
    Failed,

    /// Cancelled locally; terminal regardless of executor acknowledgment
    Cancelled,

    /// A rollback was requested and is in progress
    RollingBack,

    /// Rollback finished successfully
    CompletedRolledBack,
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ready" | "pending" => Ok(DeploymentStatus::Ready),
            "running" | "in_progress" => Ok(DeploymentStatus::Running),
            "paused" => Ok(DeploymentStatus::Paused),
            "completed" | "succeeded" => Ok(DeploymentStatus::Completed),
            "failed" => Ok(DeploymentStatus::Failed),
            "cancelled" | "canceled" => Ok(DeploymentStatus::Cancelled),
            "rolling_back" | "rollingback" => Ok(DeploymentStatus::RollingBack),
            "completed_rolled_back" | "rolled_back" => Ok(DeploymentStatus::CompletedRolledBack),
            _ => Err(format!("Invalid deployment status: {s}")),
        }
    }
}

impl DeploymentStatus {
    /// Wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Ready => "ready",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Paused => "paused",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
            DeploymentStatus::RollingBack => "rolling_back",
            DeploymentStatus::CompletedRolledBack => "completed_rolled_back",
        }
    }

    /// Whether no further forward progress is expected.
    ///
    /// `Completed` and `Failed` are terminal even though a rollback may still
    /// be invoked on a reversible plan.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed
                | DeploymentStatus::Failed
                | DeploymentStatus::Cancelled
                | DeploymentStatus::CompletedRolledBack
        )
    }

    /// Whether the executor is expected to keep emitting events.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Running | DeploymentStatus::Paused | DeploymentStatus::RollingBack
        )
    }

    /// Whether `next` is an edge of the deployment state machine.
    ///
    /// ```text
    /// ready → running → {paused, completed, failed, cancelled}
    /// paused → {running, completed, failed, cancelled}
    /// {completed, failed} → rolling_back
    /// rolling_back → {completed_rolled_back, failed}
    /// ```
    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Ready, Running)
                | (Running, Paused | Completed | Failed | Cancelled)
                | (Paused, Running | Completed | Failed | Cancelled)
                | (Completed | Failed, RollingBack)
                | (RollingBack, CompletedRolledBack | Failed)
        )
    }

    /// Get status with a leading icon for display.
    pub fn with_icon(&self) -> &'static str {
        match self {
            DeploymentStatus::Ready => "○ Ready",
            DeploymentStatus::Running => "➤ Running",
            DeploymentStatus::Paused => "‖ Paused",
            DeploymentStatus::Completed => "✓ Completed",
            DeploymentStatus::Failed => "✗ Failed",
            DeploymentStatus::Cancelled => "⊘ Cancelled",
            DeploymentStatus::RollingBack => "↺ Rolling Back",
            DeploymentStatus::CompletedRolledBack => "↺ Rolled Back",
        }
    }
}

/// Type-safe enumeration of step statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step has not started
    #[default]
    Pending,

    /// Step is executing
    Running,

    /// Step finished successfully
    Completed,

    /// Step reported a failure
    Failed,

    /// Step was skipped by the operator before it started
    Skipped,
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            _ => Err(format!("Invalid step status: {s}")),
        }
    }
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    /// Completed, failed and skipped steps never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Get status with consistent icon formatting for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use remedy_core::models::StepStatus;
    ///
    /// assert_eq!(StepStatus::Completed.with_icon(), "✓ Completed");
    /// assert_eq!(StepStatus::Running.with_icon(), "➤ Running");
    /// assert_eq!(StepStatus::Pending.with_icon(), "○ Pending");
    /// ```
    pub fn with_icon(&self) -> &'static str {
        match self {
            StepStatus::Pending => "○ Pending",
            StepStatus::Running => "➤ Running",
            StepStatus::Completed => "✓ Completed",
            StepStatus::Failed => "✗ Failed",
            StepStatus::Skipped => "↷ Skipped",
        }
    }
}

/// Risk assessment attached to a plan by the analysis service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(format!("Invalid risk level: {s}")),
        }
    }
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// AI provider that produced a remediation plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    #[serde(alias = "chatgpt")]
    OpenAi,
    Gemini,
    Local,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "openai" | "chatgpt" | "gpt" => Ok(Provider::OpenAi),
            "gemini" | "google" => Ok(Provider::Gemini),
            "local" => Ok(Provider::Local),
            _ => Err(format!("Invalid provider: {s}")),
        }
    }
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Local => "local",
        }
    }
}

/// How the executor advances between steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Executor runs every step back to back
    #[default]
    Automatic,

    /// Executor waits for the operator between steps
    Supervised,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "automatic" | "auto" => Ok(ExecutionMode::Automatic),
            "supervised" | "manual" => Ok(ExecutionMode::Supervised),
            _ => Err(format!("Invalid execution mode: {s}")),
        }
    }
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Automatic => "automatic",
            ExecutionMode::Supervised => "supervised",
        }
    }
}

/// Operator-issued control requests sent to the executor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
    Cancel,
    Rollback,
    Skip,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Cancel => "cancel",
            ControlAction::Rollback => "rollback",
            ControlAction::Skip => "skip",
        }
    }
}

/// Health of the event stream feeding a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamHealth {
    /// Connected and delivering events
    #[default]
    Live,

    /// Connection dropped; a reconnect is in progress
    Reconnecting,

    /// Reconnect failed; state may be stale until refreshed
    Lost,

    /// Connected but silent for longer than the stall timeout
    Stalled,

    /// Consumer closed on purpose
    Closed,
}

impl StreamHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamHealth::Live => "live",
            StreamHealth::Reconnecting => "reconnecting",
            StreamHealth::Lost => "lost",
            StreamHealth::Stalled => "stalled",
            StreamHealth::Closed => "closed",
        }
    }

    /// State shown to the operator may no longer match the executor.
    pub fn is_stale(&self) -> bool {
        matches!(self, StreamHealth::Lost | StreamHealth::Stalled)
    }
}
