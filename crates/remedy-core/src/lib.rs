//! Core library for the Remedy deployment engine.
//!
//! This crate drives the execution of an incident remediation plan on a
//! remote executor and keeps a live, consistent view of its progress. It
//! contains the deployment state machine, the event stream consumer, the
//! HTTP clients for the executor and analysis service, and the display
//! layer the CLI renders.
//!
//! # Display Architecture
//!
//! - **Domain Models** ([`models`]): Implement [`std::fmt::Display`] for direct
//!   formatting
//! - **Display Wrappers** ([`display`]): Read-only projections such as
//!   [`DeploymentView`] that add progress and staleness information
//! - **Terminal Rendering**: Rich markdown output via the CLI's terminal
//!   renderer
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use remedy_core::{
//!     AnalysisService, ControllerBuilder, EngineConfig, ExecutionMode, HttpAnalysisClient,
//!     Provider, StartRequest,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(None)?;
//!
//! // Ask the analysis service for a plan
//! let plan = HttpAnalysisClient::new(&config)?
//!     .analyze("INC-1042", Provider::Claude)
//!     .await?;
//! println!("{plan}");
//!
//! // Run it and watch the state change
//! let controller = ControllerBuilder::new().with_config(config).build()?;
//! controller
//!     .start(StartRequest {
//!         incident_id: "INC-1042".to_string(),
//!         plan,
//!         mode: ExecutionMode::Automatic,
//!     })
//!     .await?;
//!
//! let mut updates = controller.subscribe();
//! while updates.changed().await.is_ok() {
//!     if let Some(deployment) = updates.borrow().as_ref() {
//!         println!("{}", deployment.status.with_icon());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod executor;
pub mod models;
pub mod stream;

// Re-export commonly used types
pub use analysis::{AnalysisService, HttpAnalysisClient};
pub use config::EngineConfig;
pub use controller::{ControllerBuilder, DeploymentController, Notice, StartRequest};
pub use display::{DeploymentView, HumanDuration, LocalDateTime};
pub use error::{EngineError, Result};
pub use executor::{HttpExecutor, RemoteExecutor, SubmitRequest};
pub use models::{
    AnalysisResponse, ControlAction, Deployment, DeploymentId, DeploymentStatus, ExecutionMode,
    PendingControl, PendingState, Plan, PlanStep, Provider, RiskLevel, StatusReport, Step,
    StepId, StepStatus, StreamHealth,
};
pub use stream::{
    decode_frame, EventConnection, EventSource, StreamEvent, WebSocketSource,
};
