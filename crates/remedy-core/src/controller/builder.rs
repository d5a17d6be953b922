//! Builder for creating and configuring DeploymentController instances.

use std::sync::Arc;

use super::DeploymentController;
use crate::{
    config::EngineConfig,
    error::Result,
    executor::{HttpExecutor, RemoteExecutor},
    stream::{EventSource, WebSocketSource},
};

/// Builder for creating and configuring DeploymentController instances.
#[derive(Clone, Default)]
pub struct ControllerBuilder {
    config: EngineConfig,
    executor: Option<Arc<dyn RemoteExecutor>>,
    source: Option<Arc<dyn EventSource>>,
}

impl ControllerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses a custom executor instead of the HTTP client built from the
    /// config.
    pub fn with_executor(mut self, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Uses a custom event source instead of the WebSocket transport built
    /// from the config.
    pub fn with_event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Builds the controller and spawns its task on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` if the config fails validation
    /// Returns `EngineError::Configuration` if the HTTP client cannot be built
    pub fn build(self) -> Result<DeploymentController> {
        self.config.validate()?;

        let executor: Arc<dyn RemoteExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HttpExecutor::new(&self.config)?),
        };
        let source: Arc<dyn EventSource> = match self.source {
            Some(source) => source,
            None => Arc::new(WebSocketSource::new(
                self.config.stream_url(),
                self.config.api_key.clone(),
            )),
        };

        Ok(DeploymentController::spawn(executor, source, &self.config))
    }
}
