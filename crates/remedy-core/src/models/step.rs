//! Step tracker: per-step state and its transition rules.

use std::fmt;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use super::{PlanStep, StepStatus};

/// Index-derived identifier of a step within its deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct StepId(pub usize);

impl StepId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable state of one command within a deployment.
///
/// The state machine is `pending → running → {completed, failed}` plus
/// `pending → skipped`. Every transition method returns `false` and leaves
/// the step untouched when the transition is not allowed, so replaying a
/// duplicated event is harmless.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub id: StepId,
    pub command: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    /// Creates a pending step from a plan entry.
    pub fn from_plan_step(index: usize, plan_step: &PlanStep) -> Self {
        Self {
            id: StepId(index),
            command: plan_step.command.clone(),
            description: plan_step.description.clone(),
            status: StepStatus::Pending,
            started_at: None,
            ended_at: None,
            output: None,
            error: None,
        }
    }

    /// `pending → running`.
    pub fn begin(&mut self, started_at: Option<Timestamp>) -> bool {
        if self.status != StepStatus::Pending {
            return false;
        }
        self.status = StepStatus::Running;
        if self.started_at.is_none() {
            self.started_at = started_at;
        }
        true
    }

    /// `running → completed`.
    pub fn complete(&mut self, ended_at: Option<Timestamp>, output: Option<String>) -> bool {
        if self.status != StepStatus::Running {
            return false;
        }
        self.status = StepStatus::Completed;
        self.finish(ended_at, output);
        true
    }

    /// `running → failed`.
    pub fn fail(
        &mut self,
        ended_at: Option<Timestamp>,
        output: Option<String>,
        error: Option<String>,
    ) -> bool {
        if self.status != StepStatus::Running {
            return false;
        }
        self.status = StepStatus::Failed;
        self.finish(ended_at, output);
        if error.is_some() {
            self.error = error;
        }
        true
    }

    /// `pending → skipped`. Whether skipping is allowed at the deployment
    /// level is the controller's decision.
    pub fn skip(&mut self) -> bool {
        if self.status != StepStatus::Pending {
            return false;
        }
        self.status = StepStatus::Skipped;
        true
    }

    /// Time between start and end as reported by the executor.
    pub fn duration(&self) -> Option<SignedDuration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    fn finish(&mut self, ended_at: Option<Timestamp>, output: Option<String>) {
        // An end time without a start time would make the duration meaningless.
        if self.started_at.is_some() && self.ended_at.is_none() {
            self.ended_at = ended_at;
        }
        if output.is_some() {
            self.output = output;
        }
    }
}
