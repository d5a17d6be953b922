//! Display implementations for domain models.
//!
//! Kept apart from the model definitions so the models stay free of
//! presentation concerns. Everything renders as markdown.

use std::fmt;

use super::datetime::{HumanDuration, LocalDateTime};
use crate::{
    controller::Notice,
    models::{
        DeploymentStatus, ExecutionMode, Plan, Provider, RiskLevel, StatusReport, Step,
        StepStatus, StreamHealth,
    },
};

macro_rules! display_as_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

display_as_str!(
    DeploymentStatus,
    StepStatus,
    RiskLevel,
    Provider,
    ExecutionMode,
    StreamHealth,
);

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Remediation plan ({})", self.provider())?;
        writeln!(f)?;

        writeln!(f, "- Risk: {}", self.risk_level())?;
        writeln!(
            f,
            "- Reversible: {}",
            if self.reversible() { "yes" } else { "no" }
        )?;
        if let Some(estimate) = self.estimated_duration() {
            writeln!(f, "- Estimated duration: {estimate}")?;
        }

        if !self.description().is_empty() {
            writeln!(f)?;
            writeln!(f, "{}", self.description())?;
        }

        writeln!(f, "\n## Steps")?;
        writeln!(f)?;
        for (index, step) in self.steps().iter().enumerate() {
            writeln!(f, "{}. {}", index + 1, step.description)?;
            writeln!(f, "   `{}`", step.command)?;
        }

        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "### {}. {} ({})",
            self.id.index() + 1,
            self.description,
            self.status.with_icon()
        )?;
        writeln!(f)?;
        writeln!(f, "`{}`", self.command)?;
        writeln!(f)?;

        if let Some(started) = &self.started_at {
            write!(f, "- Started: {}", LocalDateTime(started))?;
            match self.duration() {
                Some(duration) => writeln!(f, " ({})", HumanDuration(duration))?,
                None => writeln!(f)?,
            }
            writeln!(f)?;
        }

        if self.status == StepStatus::Failed {
            if let Some(error) = &self.error {
                writeln!(f, "**Error**: {error}")?;
                writeln!(f)?;
            }
        }

        if let Some(output) = self.output.as_deref().filter(|o| !o.trim().is_empty()) {
            writeln!(f, "```")?;
            writeln!(f, "{}", output.trim_end())?;
            writeln!(f, "```")?;
            writeln!(f)?;
        }

        Ok(())
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::StepFailed { step, error, .. } => {
                write!(f, "✗ Step {} failed", step.index() + 1)?;
                if let Some(error) = error {
                    write!(f, ": {error}")?;
                }
                Ok(())
            }
            Notice::DeploymentCompleted { deployment } => {
                write!(f, "✓ Deployment {deployment} completed")
            }
            Notice::DeploymentFailed {
                deployment,
                error,
                during_rollback,
            } => {
                let what = if *during_rollback { "Rollback of" } else { "Deployment" };
                write!(f, "✗ {what} {deployment} failed")?;
                if let Some(error) = error {
                    write!(f, ": {error}")?;
                }
                Ok(())
            }
            Notice::RolledBack { deployment } => {
                write!(f, "↺ Deployment {deployment} rolled back")
            }
            Notice::Cancelled { deployment } => write!(f, "⊘ Deployment {deployment} cancelled"),
            Notice::ControlRejected {
                action, message, ..
            } => write!(f, "⚠ Executor rejected {}: {message}", action.as_str()),
            Notice::StreamLost { reason, .. } => {
                write!(f, "⚠ Live updates lost ({reason}); use `refresh` to check status")
            }
            Notice::Stalled { silent_for, .. } => write!(
                f,
                "⚠ No updates for {}; the view may be stale",
                HumanDuration(
                    jiff::SignedDuration::try_from(*silent_for).unwrap_or(jiff::SignedDuration::MAX)
                )
            ),
            Notice::Reconciled { action, .. } => write!(
                f,
                "ℹ Executor kept running; {} did not take effect",
                action.as_str()
            ),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- Status: {}", self.status.with_icon())?;
        if let Some(index) = self.current_step_index {
            writeln!(f, "- Current step: {}", index + 1)?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "- **Error**: {error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jiff::Timestamp;

    use super::*;
    use crate::models::{ControlAction, DeploymentId, PlanStep, StepId};

    fn plan() -> Plan {
        Plan::new(
            Provider::OpenAi,
            "Flush the stuck queue",
            vec![
                PlanStep {
                    command: "queuectl drain orders".to_string(),
                    description: "Drain the orders queue".to_string(),
                },
                PlanStep {
                    command: "queuectl restart orders".to_string(),
                    description: "Restart the consumer".to_string(),
                },
            ],
            RiskLevel::High,
            true,
            Some("10 minutes".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_plan_display() {
        let output = plan().to_string();
        assert!(output.starts_with("# Remediation plan (openai)"));
        assert!(output.contains("- Risk: high"));
        assert!(output.contains("- Reversible: yes"));
        assert!(output.contains("- Estimated duration: 10 minutes"));
        assert!(output.contains("1. Drain the orders queue\n   `queuectl drain orders`"));
        assert!(output.contains("2. Restart the consumer"));
    }

    #[test]
    fn test_step_display_failed_with_output() {
        let plan = plan();
        let mut step = Step::from_plan_step(1, &plan.steps()[1]);
        let start: Timestamp = "2024-05-01T10:00:00Z".parse().unwrap();
        let end: Timestamp = "2024-05-01T10:00:04Z".parse().unwrap();
        step.begin(Some(start));
        step.fail(
            Some(end),
            Some("restarting...\n".to_string()),
            Some("exit status 1".to_string()),
        );

        let output = step.to_string();
        assert!(output.contains("### 2. Restart the consumer (✗ Failed)"));
        assert!(output.contains("`queuectl restart orders`"));
        assert!(output.contains("(4.0s)"));
        assert!(output.contains("**Error**: exit status 1"));
        assert!(output.contains("```\nrestarting...\n```"));
    }

    #[test]
    fn test_pending_step_has_no_timing() {
        let step = Step::from_plan_step(0, &plan().steps()[0]);
        let output = step.to_string();
        assert!(output.contains("(○ Pending)"));
        assert!(!output.contains("Started"));
    }

    #[test]
    fn test_notice_display() {
        let deployment = DeploymentId::from("dep-9");
        let failed = Notice::StepFailed {
            deployment: deployment.clone(),
            step: StepId(0),
            error: Some("timeout".to_string()),
        };
        assert_eq!(failed.to_string(), "✗ Step 1 failed: timeout");

        let rollback = Notice::DeploymentFailed {
            deployment: deployment.clone(),
            error: None,
            during_rollback: true,
        };
        assert_eq!(rollback.to_string(), "✗ Rollback of dep-9 failed");

        let rejected = Notice::ControlRejected {
            deployment: deployment.clone(),
            action: ControlAction::Pause,
            message: "API error (409 Conflict)".to_string(),
        };
        assert_eq!(
            rejected.to_string(),
            "⚠ Executor rejected pause: API error (409 Conflict)"
        );

        let stalled = Notice::Stalled {
            deployment,
            silent_for: Duration::from_secs(300),
        };
        assert_eq!(stalled.to_string(), "⚠ No updates for 5m 00s; the view may be stale");
    }

    #[test]
    fn test_status_display_matches_wire_names() {
        assert_eq!(DeploymentStatus::CompletedRolledBack.to_string(), "completed_rolled_back");
        assert_eq!(StreamHealth::Stalled.to_string(), "stalled");
        assert_eq!(ExecutionMode::Supervised.to_string(), "supervised");
    }

    #[test]
    fn test_status_report_display() {
        let report = StatusReport {
            status: DeploymentStatus::Failed,
            current_step_index: Some(1),
            error: Some("exit status 2".to_string()),
        };
        let output = report.to_string();
        assert!(output.contains("- Current step: 2\n"));
        assert!(output.contains("- **Error**: exit status 2\n"));
    }
}
