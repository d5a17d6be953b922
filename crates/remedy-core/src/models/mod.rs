//! Data models for plans, steps and deployments.

pub mod deployment;
pub mod plan;
pub mod status;
pub mod step;


pub use deployment::{
    Applied, Deployment, DeploymentId, Ignored, OutputChunk, PendingControl, PendingState,
    StatusReport,
};
pub use plan::{AnalysisResponse, Plan, PlanStep};
pub use status::{
    ControlAction, DeploymentStatus, ExecutionMode, Provider, RiskLevel, StepStatus, StreamHealth,
};
pub use step::{Step, StepId};
