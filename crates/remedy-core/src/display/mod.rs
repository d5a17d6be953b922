//! Display formatting for plans, deployments and controller signals.
//!
//! Domain models implement [`std::fmt::Display`] directly (see [`models`]);
//! this module adds read-only projections and small wrappers that need more
//! context than a single model carries.
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  Domain Models  │    │ Views & Wrappers│    │   Markdown      │
//! │ (Plan, Step,    │───▶│ (DeploymentView,│───▶│    Output       │
//! │  Deployment)    │    │  HumanDuration) │    │   (Terminal)    │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`datetime`]: Timestamp and duration formatting
//! - [`models`]: Display implementations for domain models and notices
//! - [`status`]: Confirmation messages for operator commands
//! - [`view`]: [`DeploymentView`], the progress projection rendered while a
//!   deployment runs
//!
//! All output is markdown so the CLI can render it with its terminal skin.

pub mod datetime;
pub mod models;
pub mod status;
pub mod view;

pub use datetime::{HumanDuration, LocalDateTime};
pub use status::OperationStatus;
pub use view::{DeploymentView, StepCounts};
