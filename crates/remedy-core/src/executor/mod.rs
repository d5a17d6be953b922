//! Remote executor collaborator.
//!
//! The executor owns the target infrastructure; this crate only asks it to
//! do things and observes what it reports. Control calls are advisory: the
//! authoritative state arrives over the event stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::{ControlAction, DeploymentId, ExecutionMode, Plan, Provider, StatusReport, StepId},
};

pub mod http;

pub use http::HttpExecutor;

/// Body of a plan submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub incident_id: String,
    pub provider: Provider,
    pub plan: Plan,
    pub execution_mode: ExecutionMode,
}

/// Executor's answer to an accepted submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(alias = "deploymentId", alias = "id")]
    pub deployment_id: String,
}

/// Operations the remote executor exposes.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Submits a plan and returns the identifier of the new deployment.
    ///
    /// # Errors
    ///
    /// `EngineError::Submission` when the executor rejects the request or
    /// cannot be reached.
    async fn submit(&self, request: &SubmitRequest) -> Result<DeploymentId>;

    /// Sends a pause, resume, cancel or rollback request.
    ///
    /// # Errors
    ///
    /// `EngineError::ControlRejected` for any transport or executor failure.
    async fn control(&self, deployment: &DeploymentId, action: ControlAction) -> Result<()>;

    async fn pause(&self, deployment: &DeploymentId) -> Result<()> {
        self.control(deployment, ControlAction::Pause).await
    }

    async fn resume(&self, deployment: &DeploymentId) -> Result<()> {
        self.control(deployment, ControlAction::Resume).await
    }

    async fn cancel(&self, deployment: &DeploymentId) -> Result<()> {
        self.control(deployment, ControlAction::Cancel).await
    }

    async fn rollback(&self, deployment: &DeploymentId) -> Result<()> {
        self.control(deployment, ControlAction::Rollback).await
    }

    /// Asks the executor not to run a pending step.
    async fn skip_step(&self, deployment: &DeploymentId, step: StepId) -> Result<()>;

    /// One-shot status lookup used when the event stream cannot be trusted.
    async fn fetch_status(&self, deployment: &DeploymentId) -> Result<StatusReport>;
}
