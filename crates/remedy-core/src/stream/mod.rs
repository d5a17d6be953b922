//! Streaming update consumer.
//!
//! Owns the persistent connection to the executor for one deployment,
//! decodes frames into [`StreamEvent`]s and forwards them, in arrival order,
//! to whoever holds the receiving end (the deployment controller).
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  EventSource    │    │ StreamConsumer  │    │   Controller    │
//! │ (websocket, or  │───▶│ decode, forward │───▶│  (one channel)  │
//! │  test double)   │    │ one reconnect   │    │                 │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! The transport sits behind [`EventSource`] / [`EventConnection`] so tests
//! can script frames without a network.

use async_trait::async_trait;

use crate::{error::Result, models::DeploymentId};

pub mod consumer;
pub mod event;
pub mod websocket;

pub use consumer::{StreamConsumer, StreamMessage, StreamSignal};
pub use event::{
    decode_frame, DeploymentCompleted, DeploymentFailed, RollbackCompleted, StepEvent, StreamEvent,
};
pub use websocket::WebSocketSource;

/// Opens event connections for a deployment.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Connects to the executor's event stream for `deployment`.
    async fn connect(&self, deployment: &DeploymentId) -> Result<Box<dyn EventConnection>>;
}

/// One open event connection.
#[async_trait]
pub trait EventConnection: Send {
    /// Waits for the next text frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection and an
    /// error when the transport broke.
    async fn next_frame(&mut self) -> Result<Option<String>>;

    /// Closes the connection; errors are not interesting at this point.
    async fn close(&mut self);
}
