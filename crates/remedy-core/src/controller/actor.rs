//! The task that owns deployment state.
//!
//! Every input (operator commands, answers from the executor, stream
//! signals) arrives on one channel and is handled to completion before the
//! next one is read. Network calls run in spawned tasks that post their
//! outcome back as another input, so the actor itself never awaits I/O.

use std::{sync::Arc, time::Duration};

use jiff::Timestamp;
use log::{debug, info, warn};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use super::{Notice, StartRequest};
use crate::{
    error::{EngineError, Result},
    executor::{RemoteExecutor, SubmitRequest},
    models::{
        Applied, ControlAction, Deployment, DeploymentId, DeploymentStatus, Ignored,
        StatusReport, StepId, StreamHealth,
    },
    stream::{EventSource, StreamConsumer, StreamEvent, StreamMessage, StreamSignal},
};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command {
    Start {
        request: StartRequest,
        reply: Reply<DeploymentId>,
    },
    Control {
        action: ControlAction,
        reply: Reply<()>,
    },
    SkipStep {
        step: StepId,
        reply: Reply<()>,
    },
    Refresh {
        reply: Reply<DeploymentStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) enum Input {
    Command(Command),
    Submitted {
        request: SubmitRequest,
        result: Result<DeploymentId>,
        reply: Reply<DeploymentId>,
    },
    ControlAnswered {
        deployment: DeploymentId,
        action: ControlAction,
        seq: u64,
        result: Result<()>,
        reply: Reply<()>,
    },
    StatusFetched {
        deployment: DeploymentId,
        result: Result<StatusReport>,
        reply: Reply<DeploymentStatus>,
    },
    Stream(StreamMessage),
}

impl From<Command> for Input {
    fn from(command: Command) -> Self {
        Input::Command(command)
    }
}

impl From<StreamMessage> for Input {
    fn from(message: StreamMessage) -> Self {
        Input::Stream(message)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Timing {
    pub stall_timeout: Duration,
    pub reconnect_delay: Duration,
}

pub(crate) struct Actor {
    executor: Arc<dyn RemoteExecutor>,
    source: Arc<dyn EventSource>,
    timing: Timing,
    inputs: mpsc::Sender<Input>,
    snapshot: watch::Sender<Option<Deployment>>,
    notices: broadcast::Sender<Notice>,
    deployment: Option<Deployment>,
    consumer: Option<StreamConsumer>,
    submitting: bool,
    generation: u64,
    seq: u64,
    last_activity: Instant,
}

impl Actor {
    pub(crate) fn new(
        executor: Arc<dyn RemoteExecutor>,
        source: Arc<dyn EventSource>,
        timing: Timing,
        inputs: mpsc::Sender<Input>,
        snapshot: watch::Sender<Option<Deployment>>,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self {
            executor,
            source,
            timing,
            inputs,
            snapshot,
            notices,
            deployment: None,
            consumer: None,
            submitting: false,
            generation: 0,
            seq: 0,
            last_activity: Instant::now(),
        }
    }

    pub(crate) async fn run(mut self, mut receiver: mpsc::Receiver<Input>, stop: CancellationToken) {
        loop {
            let deadline = self.stall_deadline();
            let input = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                input = receiver.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_stall();
                    continue;
                }
            };

            if !self.handle(input) {
                break;
            }
        }

        self.close_consumer();
        debug!("Deployment controller stopped");
    }

    /// Returns false once the actor should stop.
    fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Command(Command::Start { request, reply }) => self.start(request, reply),
            Input::Command(Command::Control { action, reply }) => self.control(action, reply),
            Input::Command(Command::SkipStep { step, reply }) => self.skip_step(step, reply),
            Input::Command(Command::Refresh { reply }) => self.refresh(reply),
            Input::Command(Command::Shutdown { reply }) => {
                self.close_consumer();
                self.publish();
                let _ = reply.send(());
                return false;
            }
            Input::Submitted {
                request,
                result,
                reply,
            } => self.on_submitted(request, result, reply),
            Input::ControlAnswered {
                deployment,
                action,
                seq,
                result,
                reply,
            } => self.on_control_answered(&deployment, action, seq, result, reply),
            Input::StatusFetched {
                deployment,
                result,
                reply,
            } => self.on_status_fetched(&deployment, result, reply),
            Input::Stream(message) => self.on_stream(message),
        }
        true
    }

    fn start(&mut self, request: StartRequest, reply: Reply<DeploymentId>) {
        if let Err(e) = self.check_can_start(&request) {
            let _ = reply.send(Err(e));
            return;
        }
        self.submitting = true;

        let submit = SubmitRequest {
            incident_id: request.incident_id,
            provider: request.plan.provider(),
            plan: request.plan,
            execution_mode: request.mode,
        };
        info!(
            "Submitting {}-step plan for incident {}",
            submit.plan.steps().len(),
            submit.incident_id
        );

        let executor = Arc::clone(&self.executor);
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = executor.submit(&submit).await;
            let _ = inputs
                .send(Input::Submitted {
                    request: submit,
                    result,
                    reply,
                })
                .await;
        });
    }

    fn check_can_start(&self, request: &StartRequest) -> Result<()> {
        if request.incident_id.trim().is_empty() {
            return Err(EngineError::invalid_input("incident_id").with_reason("cannot be empty"));
        }
        if self.submitting {
            return Err(EngineError::precondition("start", DeploymentStatus::Ready)
                .with_reason("a submission is already in flight"));
        }
        match &self.deployment {
            Some(deployment) if !deployment.status.is_terminal() => {
                Err(EngineError::precondition("start", deployment.status)
                    .with_reason("a deployment is already active"))
            }
            _ => Ok(()),
        }
    }

    /// The previous deployment must stay terminal until the pending
    /// submission is answered and replaces it.
    fn check_not_submitting(&self, action: &str) -> Result<()> {
        if !self.submitting {
            return Ok(());
        }
        let status = self
            .deployment
            .as_ref()
            .map_or(DeploymentStatus::Ready, |d| d.status);
        Err(EngineError::precondition(action, status)
            .with_reason("a new deployment is being submitted"))
    }

    fn on_submitted(
        &mut self,
        request: SubmitRequest,
        result: Result<DeploymentId>,
        reply: Reply<DeploymentId>,
    ) {
        self.submitting = false;
        match result {
            Ok(id) => {
                self.deployment = Some(Deployment::new(
                    id.clone(),
                    request.incident_id,
                    &request.plan,
                    request.execution_mode,
                    Timestamp::now(),
                ));
                info!("Deployment {id} started");
                self.open_consumer(id.clone());
                self.publish();
                let _ = reply.send(Ok(id));
            }
            Err(e) => {
                warn!("Submission for incident {} failed: {e}", request.incident_id);
                let _ = reply.send(Err(e));
            }
        }
    }

    fn control(&mut self, action: ControlAction, reply: Reply<()>) {
        if let Err(e) = self.check_not_submitting(action.as_str()) {
            let _ = reply.send(Err(e));
            return;
        }
        let seq = self.next_seq();
        let Some(deployment) = self.deployment.as_mut() else {
            let _ = reply.send(Err(no_deployment(action.as_str())));
            return;
        };
        if let Err(e) = deployment.request_control(action, seq, Timestamp::now()) {
            let _ = reply.send(Err(e));
            return;
        }

        let id = deployment.id.clone();
        info!("Deployment {id}: {} requested", action.as_str());
        match action {
            ControlAction::Cancel => {
                self.close_consumer();
                self.notify(Notice::Cancelled {
                    deployment: id.clone(),
                });
            }
            ControlAction::Rollback => self.open_consumer(id.clone()),
            _ => {}
        }
        self.last_activity = Instant::now();
        self.publish();
        self.spawn_control(id, action, seq, None, reply);
    }

    fn skip_step(&mut self, step: StepId, reply: Reply<()>) {
        if let Err(e) = self.check_not_submitting("skip a step") {
            let _ = reply.send(Err(e));
            return;
        }
        let seq = self.next_seq();
        let Some(deployment) = self.deployment.as_mut() else {
            let _ = reply.send(Err(no_deployment("skip a step")));
            return;
        };
        if let Err(e) = deployment.skip_step(step) {
            let _ = reply.send(Err(e));
            return;
        }

        let id = deployment.id.clone();
        info!("Deployment {id}: step {step} skipped");
        self.publish();
        self.spawn_control(id, ControlAction::Skip, seq, Some(step), reply);
    }

    fn spawn_control(
        &self,
        deployment: DeploymentId,
        action: ControlAction,
        seq: u64,
        step: Option<StepId>,
        reply: Reply<()>,
    ) {
        let executor = Arc::clone(&self.executor);
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = match step {
                Some(step) => executor.skip_step(&deployment, step).await,
                None => executor.control(&deployment, action).await,
            };
            let _ = inputs
                .send(Input::ControlAnswered {
                    deployment,
                    action,
                    seq,
                    result,
                    reply,
                })
                .await;
        });
    }

    fn on_control_answered(
        &mut self,
        deployment: &DeploymentId,
        action: ControlAction,
        seq: u64,
        result: Result<()>,
        reply: Reply<()>,
    ) {
        let changed = match self.deployment.as_mut() {
            Some(current) if &current.id == deployment => match &result {
                Ok(()) => current.confirm_control(seq),
                Err(e) => current.reject_control(seq, rejection_message(e)),
            },
            _ => {
                debug!("Dropping {} answer for replaced deployment {deployment}", action.as_str());
                let _ = reply.send(result);
                return;
            }
        };

        match &result {
            Ok(()) => debug!("Deployment {deployment}: {} confirmed", action.as_str()),
            Err(e) => {
                warn!("Deployment {deployment}: {e}");
                self.notify(Notice::ControlRejected {
                    deployment: deployment.clone(),
                    action,
                    message: rejection_message(e),
                });
            }
        }
        if changed {
            self.publish();
        }
        let _ = reply.send(result);
    }

    fn refresh(&mut self, reply: Reply<DeploymentStatus>) {
        if let Err(e) = self.check_not_submitting("refresh") {
            let _ = reply.send(Err(e));
            return;
        }
        let Some(deployment) = &self.deployment else {
            let _ = reply.send(Err(no_deployment("refresh")));
            return;
        };

        let id = deployment.id.clone();
        let executor = Arc::clone(&self.executor);
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            let result = executor.fetch_status(&id).await;
            let _ = inputs
                .send(Input::StatusFetched {
                    deployment: id,
                    result,
                    reply,
                })
                .await;
        });
    }

    fn on_status_fetched(
        &mut self,
        deployment: &DeploymentId,
        result: Result<StatusReport>,
        reply: Reply<DeploymentStatus>,
    ) {
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!("Status fetch for deployment {deployment} failed: {e}");
                let _ = reply.send(Err(e));
                return;
            }
        };

        // A fetch answered while a new submission is pending must not bring
        // the previous deployment back to life.
        let submitting = self.submitting;
        let Some(current) = self
            .deployment
            .as_mut()
            .filter(|current| &current.id == deployment)
            .filter(|current| !(submitting && current.status.is_terminal()))
        else {
            let _ = reply.send(Ok(report.status));
            return;
        };

        let before = current.status;
        let changed = current.apply_report(&report, Timestamp::now());
        let progressing = report.status.is_active() && current.status.is_active();
        // Lost streams and deployments reactivated by the report have no
        // consumer left.
        let reopen = progressing && self.consumer.is_none();
        if progressing && (reopen || current.stream_health.is_stale()) {
            current.stream_health = StreamHealth::Live;
        }
        let status = current.status;

        if changed {
            info!(
                "Deployment {deployment} moved from {} to {} by status fetch",
                before.as_str(),
                status.as_str()
            );
        }
        if reopen {
            self.open_consumer(deployment.clone());
        } else if progressing {
            self.last_activity = Instant::now();
        }
        if changed && status.is_terminal() {
            self.finish(before == DeploymentStatus::RollingBack, None);
        }
        self.publish();
        let _ = reply.send(Ok(status));
    }

    fn on_stream(&mut self, message: StreamMessage) {
        let live_generation = self.consumer.as_ref().map(StreamConsumer::generation);
        if live_generation != Some(message.generation) {
            debug!(
                "Dropping signal from closed stream generation {}",
                message.generation
            );
            return;
        }
        let signal = match message.signal {
            StreamSignal::Event(event) => return self.on_event(&event),
            other => other,
        };
        let Some(deployment) = self.deployment.as_mut() else {
            return;
        };
        let id = deployment.id.clone();

        match signal {
            StreamSignal::Event(_) => {}
            StreamSignal::Reconnecting(reason) => {
                debug!("Deployment {id}: reconnecting after {reason}");
                deployment.stream_health = StreamHealth::Reconnecting;
            }
            StreamSignal::Reconnected => {
                deployment.stream_health = StreamHealth::Live;
                self.last_activity = Instant::now();
            }
            StreamSignal::Lost(reason) => {
                warn!("Deployment {id}: event stream lost: {reason}");
                deployment.stream_health = StreamHealth::Lost;
                self.consumer = None;
                self.notify(Notice::StreamLost {
                    deployment: id,
                    reason,
                });
            }
        }
        self.publish();
    }

    fn on_event(&mut self, event: &StreamEvent) {
        self.last_activity = Instant::now();
        let Some(deployment) = self.deployment.as_mut() else {
            return;
        };
        if deployment.stream_health == StreamHealth::Stalled {
            deployment.stream_health = StreamHealth::Live;
        }
        let id = deployment.id.clone();

        let applied = deployment.apply(event, Timestamp::now());
        let notice = match applied {
            Applied::StepStarted {
                reconciled: true, ..
            } => {
                info!("Deployment {id}: pause overruled by executor, back to running");
                Some(Notice::Reconciled {
                    deployment: id.clone(),
                    action: ControlAction::Pause,
                })
            }
            Applied::StepFailed { step, error } => {
                warn!("Deployment {id}: step {step} failed");
                Some(Notice::StepFailed {
                    deployment: id.clone(),
                    step,
                    error,
                })
            }
            Applied::DeploymentFailed {
                during_rollback, ..
            } => {
                self.finish(during_rollback, Some(event));
                None
            }
            Applied::DeploymentCompleted | Applied::RolledBack => {
                self.finish(false, Some(event));
                None
            }
            Applied::Ignored(reason @ Ignored::UnknownStep(_)) => {
                warn!("Deployment {id}: ignoring {}: {reason}", event.kind());
                None
            }
            Applied::Ignored(reason) => {
                debug!("Deployment {id}: ignoring {}: {reason}", event.kind());
                None
            }
            Applied::StepStarted { .. } | Applied::StepCompleted(_) | Applied::Output => None,
        };

        if let Some(notice) = notice {
            self.notify(notice);
        }
        self.publish();
    }

    /// Closes the stream after a terminal status and raises the matching
    /// notice.
    fn finish(&mut self, during_rollback: bool, event: Option<&StreamEvent>) {
        self.close_consumer();
        let Some(deployment) = &self.deployment else {
            return;
        };
        let id = deployment.id.clone();
        let notice = match deployment.status {
            DeploymentStatus::Completed => Notice::DeploymentCompleted { deployment: id },
            DeploymentStatus::CompletedRolledBack => Notice::RolledBack { deployment: id },
            DeploymentStatus::Cancelled => Notice::Cancelled { deployment: id },
            DeploymentStatus::Failed => {
                let error = match event {
                    Some(StreamEvent::DeploymentFailed(failed)) => failed.error.clone(),
                    _ => deployment.failure.clone(),
                };
                Notice::DeploymentFailed {
                    deployment: id,
                    error,
                    during_rollback,
                }
            }
            _ => return,
        };
        info!(
            "Deployment {} finished as {}",
            notice.deployment(),
            deployment.status.as_str()
        );
        self.notify(notice);
    }

    fn on_stall(&mut self) {
        let Some(deployment) = self.deployment.as_mut() else {
            return;
        };
        deployment.stream_health = StreamHealth::Stalled;
        let id = deployment.id.clone();
        warn!(
            "Deployment {id}: no events for {}s, view may be stale",
            self.timing.stall_timeout.as_secs()
        );
        self.notify(Notice::Stalled {
            deployment: id,
            silent_for: self.timing.stall_timeout,
        });
        self.publish();
    }

    /// Only a live stream on a deployment that should be producing events is
    /// watched.
    fn stall_deadline(&self) -> Option<Instant> {
        let deployment = self.deployment.as_ref()?;
        self.consumer.as_ref()?;
        let watched = matches!(
            deployment.status,
            DeploymentStatus::Running | DeploymentStatus::RollingBack
        ) && deployment.stream_health == StreamHealth::Live;
        watched.then(|| self.last_activity + self.timing.stall_timeout)
    }

    fn open_consumer(&mut self, deployment: DeploymentId) {
        self.generation += 1;
        debug!(
            "Opening event stream generation {} for deployment {deployment}",
            self.generation
        );
        self.consumer = Some(StreamConsumer::spawn(
            Arc::clone(&self.source),
            deployment,
            self.generation,
            self.timing.reconnect_delay,
            self.inputs.clone(),
        ));
        self.last_activity = Instant::now();
    }

    fn close_consumer(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.close();
        }
        if let Some(deployment) = self.deployment.as_mut() {
            deployment.stream_health = StreamHealth::Closed;
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.deployment.clone());
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine; the snapshot still carries the state.
        let _ = self.notices.send(notice);
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

fn no_deployment(action: &str) -> EngineError {
    EngineError::precondition(action, DeploymentStatus::Ready)
        .with_reason("no deployment has been started")
}

fn rejection_message(error: &EngineError) -> String {
    match error {
        EngineError::ControlRejected { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
