//! Deployment state and the pure rules for applying streamed events to it.
//!
//! Nothing in this module performs I/O. The controller decides *when* an
//! event or control action is applied; this module decides *what* it does, so
//! replaying the same ordered events against the same starting state always
//! produces the same result.

use std::fmt;

use jiff::Timestamp;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{
    ControlAction, DeploymentStatus, ExecutionMode, Plan, Step, StepId, StepStatus, StreamHealth,
};
use crate::{
    error::{EngineError, Result},
    stream::{DeploymentCompleted, DeploymentFailed, StepEvent, StreamEvent},
};

/// Identifier assigned by the remote executor on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(pub String);

impl DeploymentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeploymentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One chunk of streamed command output, kept in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepId>,
    pub text: String,
}

/// Confirmation state of an optimistic control transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PendingState {
    /// Request sent, executor has not answered yet
    Awaiting,
    /// Executor refused; the local status was kept anyway
    Rejected { message: String },
}

/// Control transition applied locally before the executor confirmed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingControl {
    pub action: ControlAction,
    /// Matches acknowledgments to the request that produced them
    pub seq: u64,
    /// Status before the optimistic transition
    pub previous: DeploymentStatus,
    #[serde(flatten)]
    pub state: PendingState,
}

/// Why an event left the deployment untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    UnknownKind,
    UnknownStep(Option<StepId>),
    StepNotInState {
        step: StepId,
        status: StepStatus,
    },
    DeploymentNotInState {
        kind: &'static str,
        status: DeploymentStatus,
    },
    EmptyOutput,
}

impl fmt::Display for Ignored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ignored::UnknownKind => write!(f, "unknown event kind"),
            Ignored::UnknownStep(Some(step)) => write!(f, "unknown step {step}"),
            Ignored::UnknownStep(None) => write!(f, "event has no step reference"),
            Ignored::StepNotInState { step, status } => {
                write!(f, "step {step} is {}", status.as_str())
            }
            Ignored::DeploymentNotInState { kind, status } => {
                write!(f, "{kind} not valid while deployment is {}", status.as_str())
            }
            Ignored::EmptyOutput => write!(f, "output event carries no text"),
        }
    }
}

/// Effect of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    StepStarted {
        step: StepId,
        /// An unconfirmed pause was overruled by the executor
        reconciled: bool,
    },
    StepCompleted(StepId),
    StepFailed {
        step: StepId,
        error: Option<String>,
    },
    Output,
    DeploymentCompleted,
    DeploymentFailed {
        error: Option<String>,
        during_rollback: bool,
    },
    RolledBack,
    Ignored(Ignored),
}

impl Applied {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Applied::Ignored(_))
    }
}

/// Status snapshot returned by the executor's status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One supervised execution attempt of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub incident_id: String,
    pub execution_mode: ExecutionMode,
    pub reversible: bool,
    pub status: DeploymentStatus,
    /// Step currently executing, or the last one touched
    pub current_step_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    /// Seconds, as reported by the executor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<OutputChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_control: Option<PendingControl>,
    pub stream_health: StreamHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Number of events that changed state
    pub events_applied: u64,
}

impl Deployment {
    /// Creates a running deployment with one pending step per plan entry.
    pub fn new(
        id: DeploymentId,
        incident_id: impl Into<String>,
        plan: &Plan,
        execution_mode: ExecutionMode,
        started_at: Timestamp,
    ) -> Self {
        let steps = plan
            .steps()
            .iter()
            .enumerate()
            .map(|(index, plan_step)| Step::from_plan_step(index, plan_step))
            .collect();

        Self {
            id,
            incident_id: incident_id.into(),
            execution_mode,
            reversible: plan.reversible(),
            status: DeploymentStatus::Running,
            current_step_index: 0,
            started_at: Some(started_at),
            ended_at: None,
            total_duration: None,
            steps,
            output: Vec::new(),
            pending_control: None,
            stream_health: StreamHealth::Live,
            failure: None,
            events_applied: 0,
        }
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id.index())
    }

    /// Concatenated output buffer.
    pub fn output_text(&self) -> String {
        self.output.iter().map(|chunk| chunk.text.as_str()).collect()
    }

    /// Whether `rollback` would currently be accepted.
    pub fn can_roll_back(&self) -> bool {
        self.reversible
            && matches!(
                self.status,
                DeploymentStatus::Completed | DeploymentStatus::Failed
            )
    }

    /// Applies one streamed event. `received_at` stamps deployment-level end
    /// times; step times always come from the event itself.
    pub fn apply(&mut self, event: &StreamEvent, received_at: Timestamp) -> Applied {
        let applied = match event {
            StreamEvent::StepStarted(e) => self.apply_step_started(e),
            StreamEvent::StepCompleted(e) => self.apply_step_completed(e),
            StreamEvent::StepFailed(e) => self.apply_step_failed(e),
            StreamEvent::DeploymentCompleted(e) => self.apply_completed(e, received_at),
            StreamEvent::DeploymentFailed(e) => self.apply_failed(e, received_at),
            StreamEvent::RollbackCompleted(_) => self.apply_rolled_back(received_at),
            StreamEvent::Output(e) => self.apply_output(e),
            StreamEvent::Unknown => Applied::Ignored(Ignored::UnknownKind),
        };

        if !applied.is_ignored() {
            self.events_applied += 1;
        }
        applied
    }

    fn apply_step_started(&mut self, event: &StepEvent) -> Applied {
        let mut reconciled = false;
        if self.status == DeploymentStatus::Paused && self.pause_unconfirmed() {
            // The executor is still running steps, so the pause did not take.
            debug!("Deployment {} reconciled to running by step_started", self.id);
            self.status = DeploymentStatus::Running;
            self.pending_control = None;
            reconciled = true;
        }
        if self.status != DeploymentStatus::Running {
            return Applied::Ignored(Ignored::DeploymentNotInState {
                kind: "step_started",
                status: self.status,
            });
        }

        let index = match self.resolve(event) {
            Ok(index) => index,
            Err(ignored) => return Applied::Ignored(ignored),
        };
        let step = &mut self.steps[index];
        if !step.begin(event.start_time) {
            return Applied::Ignored(Ignored::StepNotInState {
                step: step.id,
                status: step.status,
            });
        }

        if matches!(
            self.pending_control,
            Some(PendingControl {
                action: ControlAction::Resume,
                ..
            })
        ) {
            self.pending_control = None;
        }
        self.current_step_index = index;
        Applied::StepStarted {
            step: StepId(index),
            reconciled,
        }
    }

    fn apply_step_completed(&mut self, event: &StepEvent) -> Applied {
        let index = match self.resolve(event) {
            Ok(index) => index,
            Err(ignored) => return Applied::Ignored(ignored),
        };
        let step = &mut self.steps[index];
        if !step.complete(event.end_time, event.output.clone()) {
            return Applied::Ignored(Ignored::StepNotInState {
                step: step.id,
                status: step.status,
            });
        }
        self.current_step_index = index;
        Applied::StepCompleted(StepId(index))
    }

    fn apply_step_failed(&mut self, event: &StepEvent) -> Applied {
        let index = match self.resolve(event) {
            Ok(index) => index,
            Err(ignored) => return Applied::Ignored(ignored),
        };
        let step = &mut self.steps[index];
        if !step.fail(event.end_time, event.output.clone(), event.error.clone()) {
            return Applied::Ignored(Ignored::StepNotInState {
                step: step.id,
                status: step.status,
            });
        }
        self.current_step_index = index;
        Applied::StepFailed {
            step: StepId(index),
            error: event.error.clone(),
        }
    }

    fn apply_completed(&mut self, event: &DeploymentCompleted, received_at: Timestamp) -> Applied {
        if !matches!(
            self.status,
            DeploymentStatus::Running | DeploymentStatus::Paused
        ) {
            return Applied::Ignored(Ignored::DeploymentNotInState {
                kind: "deployment_completed",
                status: self.status,
            });
        }
        self.status = DeploymentStatus::Completed;
        self.ended_at = Some(received_at);
        self.total_duration = event.total_duration;
        self.pending_control = None;
        Applied::DeploymentCompleted
    }

    fn apply_failed(&mut self, event: &DeploymentFailed, received_at: Timestamp) -> Applied {
        let during_rollback = self.status == DeploymentStatus::RollingBack;
        if !matches!(
            self.status,
            DeploymentStatus::Running | DeploymentStatus::Paused | DeploymentStatus::RollingBack
        ) {
            return Applied::Ignored(Ignored::DeploymentNotInState {
                kind: "deployment_failed",
                status: self.status,
            });
        }
        self.status = DeploymentStatus::Failed;
        self.ended_at = Some(received_at);
        self.failure = Some(match (&event.error, during_rollback) {
            (Some(error), false) => error.clone(),
            (Some(error), true) => format!("rollback failed: {error}"),
            (None, false) => "deployment failed".to_string(),
            (None, true) => "rollback failed".to_string(),
        });
        self.pending_control = None;
        Applied::DeploymentFailed {
            error: event.error.clone(),
            during_rollback,
        }
    }

    fn apply_rolled_back(&mut self, received_at: Timestamp) -> Applied {
        if self.status != DeploymentStatus::RollingBack {
            return Applied::Ignored(Ignored::DeploymentNotInState {
                kind: "rollback_completed",
                status: self.status,
            });
        }
        self.status = DeploymentStatus::CompletedRolledBack;
        self.ended_at = Some(received_at);
        self.pending_control = None;
        Applied::RolledBack
    }

    fn apply_output(&mut self, event: &StepEvent) -> Applied {
        let step = event.step();
        if let Some(id) = step {
            if self.step(id).is_none() {
                return Applied::Ignored(Ignored::UnknownStep(Some(id)));
            }
        }
        match event.text() {
            Some(text) if !text.is_empty() => {
                self.output.push(OutputChunk {
                    step,
                    text: text.to_string(),
                });
                Applied::Output
            }
            _ => Applied::Ignored(Ignored::EmptyOutput),
        }
    }

    fn resolve(&self, event: &StepEvent) -> std::result::Result<usize, Ignored> {
        match event.step() {
            Some(id) if id.index() < self.steps.len() => Ok(id.index()),
            other => Err(Ignored::UnknownStep(other)),
        }
    }

    fn pause_unconfirmed(&self) -> bool {
        matches!(
            self.pending_control,
            Some(PendingControl {
                action: ControlAction::Pause,
                ..
            })
        )
    }

    /// Validates and applies the local side of a control action.
    ///
    /// Pause, resume and rollback are recorded as pending until
    /// [`confirm_control`](Self::confirm_control) or
    /// [`reject_control`](Self::reject_control) is called with the same
    /// `seq`. Cancel is authoritative and never pending.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Precondition` without changing anything when the
    /// action is not valid in the current status.
    pub fn request_control(
        &mut self,
        action: ControlAction,
        seq: u64,
        now: Timestamp,
    ) -> Result<()> {
        let previous = self.status;
        let next = match action {
            ControlAction::Pause => {
                self.require(action, &[DeploymentStatus::Running])?;
                DeploymentStatus::Paused
            }
            ControlAction::Resume => {
                self.require(action, &[DeploymentStatus::Paused])?;
                DeploymentStatus::Running
            }
            ControlAction::Cancel => {
                self.require(
                    action,
                    &[DeploymentStatus::Running, DeploymentStatus::Paused],
                )?;
                self.status = DeploymentStatus::Cancelled;
                self.ended_at = Some(now);
                self.pending_control = None;
                self.stream_health = StreamHealth::Closed;
                return Ok(());
            }
            ControlAction::Rollback => {
                if !self.reversible {
                    return Err(EngineError::precondition(action.as_str(), self.status)
                        .with_reason("plan is not reversible"));
                }
                self.require(
                    action,
                    &[DeploymentStatus::Completed, DeploymentStatus::Failed],
                )?;
                self.failure = None;
                self.stream_health = StreamHealth::Live;
                DeploymentStatus::RollingBack
            }
            ControlAction::Skip => {
                return Err(EngineError::precondition(action.as_str(), self.status)
                    .with_reason("use skip_step to skip a step"));
            }
        };

        self.status = next;
        self.pending_control = Some(PendingControl {
            action,
            seq,
            previous,
            state: PendingState::Awaiting,
        });
        Ok(())
    }

    /// Clears the pending marker if it belongs to request `seq`.
    pub fn confirm_control(&mut self, seq: u64) -> bool {
        match &self.pending_control {
            Some(pending) if pending.seq == seq => {
                self.pending_control = None;
                true
            }
            _ => false,
        }
    }

    /// Marks request `seq` as refused. The optimistic status is kept.
    pub fn reject_control(&mut self, seq: u64, message: impl Into<String>) -> bool {
        match &mut self.pending_control {
            Some(pending) if pending.seq == seq => {
                pending.state = PendingState::Rejected {
                    message: message.into(),
                };
                true
            }
            _ => false,
        }
    }

    /// Marks a pending step as skipped.
    ///
    /// Allowed while paused, or while running in supervised mode with no
    /// step executing.
    pub fn skip_step(&mut self, id: StepId) -> Result<()> {
        let between_steps = match self.status {
            DeploymentStatus::Paused => true,
            DeploymentStatus::Running => {
                self.execution_mode == ExecutionMode::Supervised
                    && !self
                        .steps
                        .iter()
                        .any(|s| s.status == StepStatus::Running)
            }
            _ => false,
        };
        if !between_steps {
            return Err(EngineError::precondition("skip a step", self.status)
                .with_reason("steps can only be skipped between steps in supervised mode"));
        }

        let status = self.status;
        let step = self
            .steps
            .get_mut(id.index())
            .ok_or(EngineError::StepNotFound { index: id.index() })?;
        if !step.skip() {
            return Err(EngineError::precondition("skip a step", status)
                .with_reason(format!("step {id} is {}", step.status.as_str())));
        }
        Ok(())
    }

    /// Applies a status fetched out of band. Only legal forward edges are
    /// taken, and `rolling_back` only for a reversible plan; anything else
    /// leaves the status alone.
    pub fn apply_report(&mut self, report: &StatusReport, received_at: Timestamp) -> bool {
        if let Some(index) = report.current_step_index {
            if index < self.steps.len() {
                self.current_step_index = index;
            }
        }
        if report.status == self.status {
            return false;
        }
        let reachable = self.status.can_transition_to(report.status)
            && (report.status != DeploymentStatus::RollingBack || self.reversible);
        if !reachable {
            debug!(
                "Ignoring reported status {} for deployment {} in {}",
                report.status.as_str(),
                self.id,
                self.status.as_str()
            );
            return false;
        }

        self.status = report.status;
        self.pending_control = None;
        if report.status.is_terminal() {
            self.ended_at = Some(received_at);
        }
        match report.status {
            DeploymentStatus::Failed => {
                self.failure = report.error.clone().or_else(|| Some("deployment failed".to_string()));
            }
            DeploymentStatus::RollingBack => self.failure = None,
            _ => {}
        }
        true
    }

    fn require(&self, action: ControlAction, allowed: &[DeploymentStatus]) -> Result<()> {
        if allowed.contains(&self.status) {
            return Ok(());
        }
        let expected = allowed
            .iter()
            .map(DeploymentStatus::as_str)
            .collect::<Vec<_>>()
            .join(" or ");
        Err(EngineError::precondition(action.as_str(), self.status)
            .with_reason(format!("requires {expected}")))
    }
}
