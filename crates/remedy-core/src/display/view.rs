//! Read-only projection of a deployment for presentation.

use std::fmt;

use super::datetime::{HumanDuration, LocalDateTime};
use crate::models::{Deployment, PendingState, Step, StepStatus};

/// Number of steps in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StepCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.finished()
    }

    /// Steps that will not run again.
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Deployment as the operator sees it: progress, per-step state, the output
/// buffer and whether the view can be trusted.
pub struct DeploymentView<'a> {
    deployment: &'a Deployment,
    show_output: bool,
    output_lines: Option<usize>,
}

impl<'a> DeploymentView<'a> {
    pub fn new(deployment: &'a Deployment) -> Self {
        Self {
            deployment,
            show_output: true,
            output_lines: None,
        }
    }

    /// Omits the output buffer.
    pub fn without_output(mut self) -> Self {
        self.show_output = false;
        self
    }

    /// Shows only the last `lines` lines of output.
    pub fn tail(mut self, lines: usize) -> Self {
        self.output_lines = Some(lines);
        self
    }

    pub fn counts(&self) -> StepCounts {
        let mut counts = StepCounts::default();
        for step in &self.deployment.steps {
            match step.status {
                StepStatus::Pending => counts.pending += 1,
                StepStatus::Running => counts.running += 1,
                StepStatus::Completed => counts.completed += 1,
                StepStatus::Failed => counts.failed += 1,
                StepStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Fraction of steps that are finished, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        let counts = self.counts();
        if counts.total() == 0 {
            return 0.0;
        }
        counts.finished() as f64 / counts.total() as f64
    }

    /// The live stream was lost or has gone quiet.
    pub fn is_stale(&self) -> bool {
        self.deployment.stream_health.is_stale()
    }

    pub fn current_step(&self) -> Option<&'a Step> {
        self.deployment.steps.get(self.deployment.current_step_index)
    }

    fn fmt_output(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.deployment.output_text();
        if text.trim().is_empty() {
            return Ok(());
        }
        let lines: Vec<&str> = text.trim_end().lines().collect();
        let skip = self
            .output_lines
            .map_or(0, |keep| lines.len().saturating_sub(keep));

        writeln!(f, "## Output")?;
        writeln!(f)?;
        writeln!(f, "```")?;
        for line in &lines[skip..] {
            writeln!(f, "{line}")?;
        }
        writeln!(f, "```")?;
        writeln!(f)
    }
}

impl fmt::Display for DeploymentView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deployment = self.deployment;
        let counts = self.counts();

        writeln!(
            f,
            "# Deployment {} ({})",
            deployment.id,
            deployment.status.with_icon()
        )?;
        writeln!(f)?;
        writeln!(f, "- Incident: {}", deployment.incident_id)?;
        writeln!(f, "- Mode: {}", deployment.execution_mode)?;
        writeln!(
            f,
            "- Progress: {}/{} steps ({:.0}%)",
            counts.finished(),
            counts.total(),
            self.progress() * 100.0
        )?;
        if counts.failed > 0 || counts.skipped > 0 {
            writeln!(
                f,
                "- Failed: {}, Skipped: {}",
                counts.failed, counts.skipped
            )?;
        }
        if let Some(started) = &deployment.started_at {
            writeln!(f, "- Started: {}", LocalDateTime(started))?;
        }
        if let Some(ended) = &deployment.ended_at {
            writeln!(f, "- Ended: {}", LocalDateTime(ended))?;
        }
        if let Some(total) = deployment.total_duration.and_then(HumanDuration::from_secs_f64) {
            writeln!(f, "- Duration: {total}")?;
        }
        writeln!(f, "- Stream: {}", deployment.stream_health)?;

        if let Some(pending) = &deployment.pending_control {
            match &pending.state {
                PendingState::Awaiting => writeln!(
                    f,
                    "- Pending: {} awaiting executor confirmation",
                    pending.action.as_str()
                )?,
                PendingState::Rejected { message } => writeln!(
                    f,
                    "- Pending: {} rejected by executor ({message})",
                    pending.action.as_str()
                )?,
            }
        }
        if let Some(failure) = &deployment.failure {
            writeln!(f, "- **Failure**: {failure}")?;
        }
        if self.is_stale() {
            writeln!(f)?;
            writeln!(
                f,
                "> ⚠ Live updates are {}; this view may be out of date.",
                deployment.stream_health
            )?;
        }

        writeln!(f, "\n## Steps")?;
        writeln!(f)?;
        for step in &deployment.steps {
            write!(f, "{step}")?;
        }

        if self.show_output {
            self.fmt_output(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use super::*;
    use crate::{
        models::{
            ControlAction, DeploymentId, ExecutionMode, Plan, PlanStep, Provider, RiskLevel,
            StreamHealth,
        },
        stream::{StepEvent, StreamEvent},
    };

    fn deployment(steps: usize) -> Deployment {
        let plan = Plan::new(
            Provider::Claude,
            "Rotate certificates",
            (0..steps)
                .map(|i| PlanStep {
                    command: format!("certctl rotate node-{i}"),
                    description: format!("Rotate node {i}"),
                })
                .collect(),
            RiskLevel::Low,
            true,
            None,
        )
        .unwrap();
        Deployment::new(
            DeploymentId::from("dep-3"),
            "INC-7",
            &plan,
            ExecutionMode::Supervised,
            Timestamp::UNIX_EPOCH,
        )
    }

    fn step_event(index: usize) -> StepEvent {
        StepEvent {
            step_id: Some(index),
            ..Default::default()
        }
    }

    #[test]
    fn test_counts_and_progress() {
        let mut deployment = deployment(4);
        let now = Timestamp::UNIX_EPOCH;
        deployment.apply(&StreamEvent::StepStarted(step_event(0)), now);
        deployment.apply(&StreamEvent::StepCompleted(step_event(0)), now);
        deployment.apply(&StreamEvent::StepStarted(step_event(1)), now);
        deployment.apply(&StreamEvent::StepFailed(step_event(1)), now);
        deployment.request_control(ControlAction::Pause, 1, now).unwrap();
        deployment.skip_step(crate::models::StepId(2)).unwrap();

        let view = DeploymentView::new(&deployment);
        let counts = view.counts();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.pending, 1);
        assert!((view.progress() - 0.75).abs() < f64::EPSILON);
        assert_eq!(view.current_step().map(|s| s.id.index()), Some(1));
    }

    #[test]
    fn test_view_renders_pending_and_stale_marker() {
        let mut deployment = deployment(2);
        let now = Timestamp::UNIX_EPOCH;
        deployment.request_control(ControlAction::Pause, 7, now).unwrap();
        deployment.reject_control(7, "HTTP 409");
        deployment.stream_health = StreamHealth::Lost;

        let output = DeploymentView::new(&deployment).to_string();
        assert!(output.starts_with("# Deployment dep-3 (‖ Paused)"));
        assert!(output.contains("- Progress: 0/2 steps (0%)"));
        assert!(output.contains("- Pending: pause rejected by executor (HTTP 409)"));
        assert!(output.contains("this view may be out of date"));
        assert!(output.contains("### 1. Rotate node 0 (○ Pending)"));
    }

    #[test]
    fn test_output_tail() {
        let mut deployment = deployment(1);
        let now = Timestamp::UNIX_EPOCH;
        for line in ["one\n", "two\n", "three\n"] {
            deployment.apply(
                &StreamEvent::Output(StepEvent {
                    step_id: Some(0),
                    data: Some(line.to_string()),
                    ..Default::default()
                }),
                now,
            );
        }

        let output = DeploymentView::new(&deployment).tail(2).to_string();
        assert!(output.contains("```\ntwo\nthree\n```"));
        assert!(!output.contains("one"));

        let quiet = DeploymentView::new(&deployment).without_output().to_string();
        assert!(!quiet.contains("## Output"));
    }
}
