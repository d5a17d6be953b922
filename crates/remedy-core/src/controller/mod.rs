//! Deployment controller: the single authority over deployment state.
//!
//! The controller runs as one task per session. A cheap, cloneable
//! [`DeploymentController`] handle sends it commands and awaits replies;
//! everything the task learns is published through a snapshot channel and a
//! notice channel.
//!
//! ```text
//!  DeploymentController ──commands──▶┌──────────────┐──watch──▶ snapshot()
//!                                    │    actor     │
//!  executor tasks ─────outcomes─────▶│ (one input   │──broadcast──▶ notices()
//!                                    │  at a time)  │
//!  StreamConsumer ─────signals──────▶└──────────────┘
//! ```
//!
//! # Lifecycle
//!
//! `ready → running → {paused, completed, failed, cancelled}`,
//! `paused → {running, cancelled}`, `{completed, failed} → rolling_back` for
//! reversible plans, and `rolling_back → {completed_rolled_back, failed}`.
//!
//! Pause, resume and rollback are applied optimistically and reconciled
//! against the executor's answer and the event stream. Cancel is authoritative
//! locally: once cancelled, nothing the executor sends changes the
//! deployment again.
//!
//! # Example
//!
//! ```rust,no_run
//! use remedy_core::{ControllerBuilder, EngineConfig, ExecutionMode, Plan, StartRequest};
//!
//! # async fn example(plan: Plan) -> Result<(), Box<dyn std::error::Error>> {
//! let controller = ControllerBuilder::new()
//!     .with_config(EngineConfig::default())
//!     .build()?;
//!
//! let id = controller
//!     .start(StartRequest {
//!         incident_id: "INC-1042".to_string(),
//!         plan,
//!         mode: ExecutionMode::Supervised,
//!     })
//!     .await?;
//! println!("deployment {id} running");
//!
//! controller.pause().await?;
//! controller.resume().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

pub mod builder;
mod actor;
mod notice;

#[cfg(test)]
mod tests;

use actor::{Actor, Command, Input, Reply, Timing};
pub use builder::ControllerBuilder;
pub use notice::Notice;

use crate::{
    config::EngineConfig,
    error::{EngineError, Result},
    executor::RemoteExecutor,
    models::{ControlAction, Deployment, DeploymentId, DeploymentStatus, ExecutionMode, Plan, StepId},
    stream::EventSource,
};

/// Parameters for [`DeploymentController::start`].
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub incident_id: String,
    pub plan: Plan,
    pub mode: ExecutionMode,
}

/// Handle to a running controller. Clones share the same session; the task
/// stops when [`shutdown`](Self::shutdown) is called or the last handle is
/// dropped.
#[derive(Clone)]
pub struct DeploymentController {
    inputs: mpsc::Sender<Input>,
    snapshot: watch::Receiver<Option<Deployment>>,
    notices: broadcast::Sender<Notice>,
    _stop: Arc<DropGuard>,
}

impl DeploymentController {
    /// Spawns the controller task. Must be called from within a Tokio
    /// runtime.
    pub(crate) fn spawn(
        executor: Arc<dyn RemoteExecutor>,
        source: Arc<dyn EventSource>,
        config: &EngineConfig,
    ) -> Self {
        let (inputs, receiver) = mpsc::channel(config.channel_capacity);
        let (snapshot_tx, snapshot) = watch::channel(None);
        let (notices, _) = broadcast::channel(config.channel_capacity);
        let stop = CancellationToken::new();

        let actor = Actor::new(
            executor,
            source,
            Timing {
                stall_timeout: config.stall_timeout(),
                reconnect_delay: config.reconnect_delay(),
            },
            inputs.clone(),
            snapshot_tx,
            notices.clone(),
        );
        tokio::spawn(actor.run(receiver, stop.clone()));

        Self {
            inputs,
            snapshot,
            notices,
            _stop: Arc::new(stop.drop_guard()),
        }
    }

    /// Submits `request.plan` and starts monitoring the new deployment.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Submission` if the executor refuses the plan, in
    /// which case no deployment is created. Returns
    /// `EngineError::Precondition` while another deployment is active or a
    /// submission is already in flight.
    pub async fn start(&self, request: StartRequest) -> Result<DeploymentId> {
        self.request(|reply| Command::Start { request, reply }).await
    }

    /// Pauses a running deployment. Resolves once the executor answers.
    ///
    /// # Errors
    ///
    /// `EngineError::ControlRejected` if the executor refuses; the local
    /// status stays `paused` until the stream says otherwise.
    pub async fn pause(&self) -> Result<()> {
        self.control(ControlAction::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.control(ControlAction::Resume).await
    }

    /// Cancels the deployment. The local status becomes `cancelled` before
    /// the executor is contacted and never changes afterwards.
    pub async fn cancel(&self) -> Result<()> {
        self.control(ControlAction::Cancel).await
    }

    /// Rolls back a completed or failed deployment of a reversible plan.
    pub async fn rollback(&self) -> Result<()> {
        self.control(ControlAction::Rollback).await
    }

    /// Skips the pending step at `index`.
    pub async fn skip_step(&self, index: usize) -> Result<()> {
        let step = StepId(index);
        self.request(|reply| Command::SkipStep { step, reply }).await
    }

    /// Fetches the executor's view of the deployment and applies it where it
    /// moves the local status forward.
    pub async fn refresh(&self) -> Result<DeploymentStatus> {
        self.request(|reply| Command::Refresh { reply }).await
    }

    /// Current deployment, if one was ever started.
    pub fn snapshot(&self) -> Option<Deployment> {
        self.snapshot.borrow().clone()
    }

    /// Session status: the deployment's status, or `ready` before any start.
    pub fn status(&self) -> DeploymentStatus {
        self.snapshot
            .borrow()
            .as_ref()
            .map_or(DeploymentStatus::Ready, |d| d.status)
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Deployment>> {
        self.snapshot.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Closes the event stream and stops the controller task.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, receiver) = oneshot::channel();
        self.inputs
            .send(Command::Shutdown { reply }.into())
            .await
            .map_err(|_| EngineError::ControllerClosed)?;
        receiver.await.map_err(|_| EngineError::ControllerClosed)
    }

    async fn control(&self, action: ControlAction) -> Result<()> {
        self.request(|reply| Command::Control { action, reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, receiver) = oneshot::channel();
        self.inputs
            .send(command(reply).into())
            .await
            .map_err(|_| EngineError::ControllerClosed)?;
        receiver.await.map_err(|_| EngineError::ControllerClosed)?
    }
}
