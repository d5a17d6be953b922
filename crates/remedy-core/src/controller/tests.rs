//! Tests for the controller's input handling.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::*;
use crate::{
    models::{PlanStep, Provider, RiskLevel, StatusReport, StepStatus},
    stream::{EventConnection, StepEvent, StreamEvent, StreamMessage, StreamSignal},
};

/// Accepts everything and reports the deployment as running.
struct AcceptingExecutor;

#[async_trait]
impl RemoteExecutor for AcceptingExecutor {
    async fn submit(&self, _request: &crate::executor::SubmitRequest) -> Result<DeploymentId> {
        Ok(DeploymentId::from("dep-unit"))
    }

    async fn control(&self, _deployment: &DeploymentId, _action: ControlAction) -> Result<()> {
        Ok(())
    }

    async fn skip_step(&self, _deployment: &DeploymentId, _step: StepId) -> Result<()> {
        Ok(())
    }

    async fn fetch_status(&self, _deployment: &DeploymentId) -> Result<StatusReport> {
        Ok(StatusReport {
            status: DeploymentStatus::Running,
            current_step_index: None,
            error: None,
        })
    }
}

/// Connections that stay open and never deliver a frame.
struct SilentSource;

struct SilentConnection;

#[async_trait]
impl EventSource for SilentSource {
    async fn connect(&self, _deployment: &DeploymentId) -> Result<Box<dyn EventConnection>> {
        Ok(Box::new(SilentConnection))
    }
}

#[async_trait]
impl EventConnection for SilentConnection {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        std::future::pending().await
    }

    async fn close(&mut self) {}
}

/// Helper function to create a controller over silent doubles
fn create_test_controller() -> DeploymentController {
    ControllerBuilder::new()
        .with_executor(Arc::new(AcceptingExecutor))
        .with_event_source(Arc::new(SilentSource))
        .build()
        .expect("Failed to create controller")
}

fn request(steps: usize) -> StartRequest {
    let plan = Plan::new(
        Provider::Local,
        "Clear disk pressure",
        (0..steps)
            .map(|i| PlanStep {
                command: format!("logrotate -f /etc/logrotate.d/app{i}"),
                description: format!("Rotate app{i} logs"),
            })
            .collect(),
        RiskLevel::Low,
        false,
        None,
    )
    .expect("Failed to create plan");
    StartRequest {
        incident_id: "INC-3".to_string(),
        plan,
        mode: ExecutionMode::Automatic,
    }
}

fn step_started(generation: u64, index: usize) -> Input {
    Input::Stream(StreamMessage {
        generation,
        signal: StreamSignal::Event(StreamEvent::StepStarted(StepEvent {
            step_id: Some(index),
            ..Default::default()
        })),
    })
}

#[tokio::test]
async fn test_messages_from_closed_generation_are_dropped() {
    let controller = create_test_controller();
    controller
        .start(request(2))
        .await
        .expect("Failed to start deployment");

    // The first consumer is generation 1; anything else is stale.
    controller.inputs.send(step_started(7, 0)).await.unwrap();
    controller.refresh().await.expect("Failed to refresh");
    let deployment = controller.snapshot().unwrap();
    assert_eq!(deployment.steps[0].status, StepStatus::Pending);
    assert_eq!(deployment.events_applied, 0);

    controller.inputs.send(step_started(1, 0)).await.unwrap();
    controller.refresh().await.expect("Failed to refresh");
    let deployment = controller.snapshot().unwrap();
    assert_eq!(deployment.steps[0].status, StepStatus::Running);
    assert_eq!(deployment.events_applied, 1);
}

#[tokio::test]
async fn test_operations_before_start_are_preconditions() {
    let controller = create_test_controller();
    assert_eq!(controller.status(), DeploymentStatus::Ready);

    for result in [
        controller.pause().await,
        controller.cancel().await,
        controller.skip_step(0).await,
    ] {
        assert!(matches!(
            result,
            Err(EngineError::Precondition {
                status: DeploymentStatus::Ready,
                ..
            })
        ));
    }
    assert!(controller.refresh().await.is_err());
    assert!(controller.snapshot().is_none());
}

#[tokio::test]
async fn test_empty_incident_rejected() {
    let controller = create_test_controller();
    let mut start = request(1);
    start.incident_id = "   ".to_string();
    assert!(matches!(
        controller.start(start).await,
        Err(EngineError::InvalidInput { .. })
    ));
}

#[tokio::test]
async fn test_shutdown_closes_stream_and_stops_actor() {
    let controller = create_test_controller();
    controller
        .start(request(1))
        .await
        .expect("Failed to start deployment");

    controller.shutdown().await.expect("Failed to shut down");
    let deployment = controller.snapshot().unwrap();
    assert_eq!(deployment.stream_health, crate::models::StreamHealth::Closed);

    let result = tokio::time::timeout(Duration::from_secs(1), controller.pause())
        .await
        .expect("Closed controller should answer immediately");
    assert!(matches!(result, Err(EngineError::ControllerClosed)));
}
