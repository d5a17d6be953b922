//! Out-of-band signals raised by the controller.

use std::time::Duration;

use crate::models::{ControlAction, DeploymentId, StepId};

/// Something the presentation layer should surface to the operator.
///
/// Notices are delivered on a broadcast channel; a slow subscriber may miss
/// some, but the state snapshot always reflects every applied change.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    StepFailed {
        deployment: DeploymentId,
        step: StepId,
        error: Option<String>,
    },
    DeploymentCompleted {
        deployment: DeploymentId,
    },
    DeploymentFailed {
        deployment: DeploymentId,
        error: Option<String>,
        during_rollback: bool,
    },
    RolledBack {
        deployment: DeploymentId,
    },
    Cancelled {
        deployment: DeploymentId,
    },
    /// The executor refused a control request; local status was kept
    ControlRejected {
        deployment: DeploymentId,
        action: ControlAction,
        message: String,
    },
    /// The single reconnect attempt failed; the view may be stale
    StreamLost {
        deployment: DeploymentId,
        reason: String,
    },
    /// No event arrived within the stall timeout
    Stalled {
        deployment: DeploymentId,
        silent_for: Duration,
    },
    /// A streamed event overruled an unconfirmed control transition
    Reconciled {
        deployment: DeploymentId,
        action: ControlAction,
    },
}

impl Notice {
    pub fn deployment(&self) -> &DeploymentId {
        match self {
            Notice::StepFailed { deployment, .. }
            | Notice::DeploymentCompleted { deployment }
            | Notice::DeploymentFailed { deployment, .. }
            | Notice::RolledBack { deployment }
            | Notice::Cancelled { deployment }
            | Notice::ControlRejected { deployment, .. }
            | Notice::StreamLost { deployment, .. }
            | Notice::Stalled { deployment, .. }
            | Notice::Reconciled { deployment, .. } => deployment,
        }
    }

    /// Whether the notice reports a problem rather than progress.
    pub fn is_warning(&self) -> bool {
        !matches!(
            self,
            Notice::DeploymentCompleted { .. } | Notice::RolledBack { .. } | Notice::Cancelled { .. }
        )
    }
}
