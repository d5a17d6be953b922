#![allow(dead_code)]

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use remedy_core::{
    ControlAction, ControllerBuilder, Deployment, DeploymentController, DeploymentId,
    EngineConfig, EngineError, EventConnection, EventSource, ExecutionMode, Plan, PlanStep,
    Provider, RemoteExecutor, Result, RiskLevel, StartRequest, StatusReport, StepId,
    SubmitRequest,
};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

/// Executor double that records every call and answers from a script.
#[derive(Default)]
pub struct MockExecutor {
    calls: Mutex<Vec<String>>,
    reject_submit: Mutex<bool>,
    rejected: Mutex<HashSet<ControlAction>>,
    status: Mutex<Option<StatusReport>>,
    gate: Mutex<Option<Arc<Notify>>>,
    submit_gate: Mutex<Option<Arc<Notify>>>,
    submissions: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_submit(&self) {
        *self.reject_submit.lock().unwrap() = true;
    }

    pub fn reject(&self, action: ControlAction) {
        self.rejected.lock().unwrap().insert(action);
    }

    pub fn report(&self, report: StatusReport) {
        *self.status.lock().unwrap() = Some(report);
    }

    /// Control calls block until the returned handle is notified.
    pub fn hold_controls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Submissions block until the returned handle is notified.
    pub fn hold_submissions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn answer(&self, action: ControlAction) -> Result<()> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.rejected.lock().unwrap().contains(&action) {
            return Err(EngineError::control_rejected(action, "API error (409 Conflict)"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn submit(&self, request: &SubmitRequest) -> Result<DeploymentId> {
        self.record(format!("submit {}", request.incident_id));
        let gate = self.submit_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.reject_submit.lock().unwrap() {
            return Err(EngineError::submission("API error (503 Service Unavailable)"));
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DeploymentId(format!("dep-{n}")))
    }

    async fn control(&self, deployment: &DeploymentId, action: ControlAction) -> Result<()> {
        self.record(format!("{} {deployment}", action.as_str()));
        self.answer(action).await
    }

    async fn skip_step(&self, deployment: &DeploymentId, step: StepId) -> Result<()> {
        self.record(format!("skip {deployment} {step}"));
        self.answer(ControlAction::Skip).await
    }

    async fn fetch_status(&self, deployment: &DeploymentId) -> Result<StatusReport> {
        self.record(format!("status {deployment}"));
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| EngineError::Transport {
                message: "no status scripted".to_string(),
                source: None,
            })
    }
}

/// Event source whose connections are fed by the test. Each `connect` takes
/// the next prepared [`Feed`]; with none prepared the connection is refused.
#[derive(Default)]
pub struct ChannelSource {
    feeds: Mutex<VecDeque<mpsc::UnboundedReceiver<Option<String>>>>,
    connects: AtomicUsize,
}

impl ChannelSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn feed(&self) -> Feed {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push_back(receiver);
        Feed(sender)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn connect(&self, _deployment: &DeploymentId) -> Result<Box<dyn EventConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let receiver = self.feeds.lock().unwrap().pop_front();
        match receiver {
            Some(receiver) => Ok(Box::new(ChannelConnection(receiver))),
            None => Err(EngineError::Stream {
                message: "connection refused".to_string(),
            }),
        }
    }
}

struct ChannelConnection(mpsc::UnboundedReceiver<Option<String>>);

#[async_trait]
impl EventConnection for ChannelConnection {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        Ok(self.0.recv().await.flatten())
    }

    async fn close(&mut self) {
        self.0.close();
    }
}

/// Test side of one stream connection. Frames sent after the consumer closed
/// the connection are lost, as they would be on the network.
pub struct Feed(mpsc::UnboundedSender<Option<String>>);

impl Feed {
    pub fn send(&self, event: Value) {
        let _ = self.0.send(Some(event.to_string()));
    }

    pub fn send_raw(&self, frame: &str) {
        let _ = self.0.send(Some(frame.to_string()));
    }

    /// Simulates the executor dropping the connection.
    pub fn disconnect(&self) {
        let _ = self.0.send(None);
    }
}

/// Helper function to create a test plan with `steps` steps
pub fn create_test_plan(steps: usize, reversible: bool) -> Plan {
    let steps = (0..steps)
        .map(|i| PlanStep {
            command: format!("kubectl rollout restart deploy/api-{i}"),
            description: format!("Restart api shard {i}"),
        })
        .collect();
    Plan::new(
        Provider::Claude,
        "Restart the API shards",
        steps,
        RiskLevel::Medium,
        reversible,
        Some("5 minutes".to_string()),
    )
    .expect("Failed to create plan")
}

pub fn start_request(steps: usize, reversible: bool, mode: ExecutionMode) -> StartRequest {
    StartRequest {
        incident_id: "INC-1042".to_string(),
        plan: create_test_plan(steps, reversible),
        mode,
    }
}

/// Helper function to create a controller over the given doubles
pub fn create_test_controller(
    executor: &Arc<MockExecutor>,
    source: &Arc<ChannelSource>,
) -> DeploymentController {
    let config = EngineConfig {
        reconnect_delay_ms: 10,
        ..EngineConfig::default()
    };
    ControllerBuilder::new()
        .with_config(config)
        .with_executor(Arc::clone(executor) as Arc<dyn RemoteExecutor>)
        .with_event_source(Arc::clone(source) as Arc<dyn EventSource>)
        .build()
        .expect("Failed to create controller")
}

/// Waits until the published deployment satisfies `predicate`.
pub async fn wait_for<F>(controller: &DeploymentController, mut predicate: F) -> Deployment
where
    F: FnMut(&Deployment) -> bool,
{
    let mut receiver = controller.subscribe();
    let found = tokio::time::timeout(
        Duration::from_secs(5),
        receiver.wait_for(|d| d.as_ref().is_some_and(&mut predicate)),
    )
    .await
    .expect("Timed out waiting for deployment state")
    .expect("Controller stopped");
    found.clone().expect("Deployment missing")
}

/// Polls `condition` until it holds, for state the snapshot does not carry.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Timed out waiting for condition"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
