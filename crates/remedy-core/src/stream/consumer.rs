//! Receive loop for one deployment's event stream.

use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{decode_frame, EventConnection, EventSource, StreamEvent};
use crate::models::DeploymentId;

/// What the consumer reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    Event(StreamEvent),
    /// Connection dropped unexpectedly; one reconnect is being attempted
    Reconnecting(String),
    Reconnected,
    /// Reconnect failed; the consumer has stopped
    Lost(String),
}

/// A signal tagged with the generation of the consumer that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub generation: u64,
    pub signal: StreamSignal,
}

/// Handle to a running consumer task. Dropping the handle closes it.
pub struct StreamConsumer {
    generation: u64,
    token: CancellationToken,
}

impl StreamConsumer {
    /// Spawns the receive loop for `deployment`.
    ///
    /// Every decoded frame is sent to `sink` as a [`StreamMessage`] converted
    /// into `T`, so the owner can merge stream traffic into its own input
    /// channel.
    pub fn spawn<T>(
        source: Arc<dyn EventSource>,
        deployment: DeploymentId,
        generation: u64,
        reconnect_delay: Duration,
        sink: mpsc::Sender<T>,
    ) -> Self
    where
        T: From<StreamMessage> + Send + 'static,
    {
        let token = CancellationToken::new();
        let receive_loop = ReceiveLoop {
            source,
            deployment,
            generation,
            reconnect_delay,
            token: token.clone(),
            sink,
        };
        tokio::spawn(receive_loop.run());

        Self { generation, token }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stops the loop and closes the connection. Idempotent.
    pub fn close(&self) {
        self.token.cancel();
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct ReceiveLoop<T> {
    source: Arc<dyn EventSource>,
    deployment: DeploymentId,
    generation: u64,
    reconnect_delay: Duration,
    token: CancellationToken,
    sink: mpsc::Sender<T>,
}

impl<T> ReceiveLoop<T>
where
    T: From<StreamMessage> + Send + 'static,
{
    async fn run(self) {
        let mut connection = match self.connect().await {
            Some(Ok(connection)) => connection,
            Some(Err(reason)) => match self.reconnect(reason).await {
                Some(connection) => connection,
                None => return,
            },
            None => return,
        };
        info!("Event stream open for deployment {}", self.deployment);

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.token.cancelled() => None,
                frame = connection.next_frame() => Some(frame),
            };
            let Some(frame) = frame else {
                connection.close().await;
                debug!("Event stream for deployment {} closed", self.deployment);
                return;
            };

            let reason = match frame {
                Ok(Some(text)) => {
                    match decode_frame(&text) {
                        Ok(event) => {
                            if !self.forward(StreamSignal::Event(event)).await {
                                return;
                            }
                        }
                        Err(e) => warn!(
                            "Skipping malformed frame on deployment {}: {e}",
                            self.deployment
                        ),
                    }
                    continue;
                }
                Ok(None) => "connection closed by executor".to_string(),
                Err(e) => e.to_string(),
            };

            if self.token.is_cancelled() {
                return;
            }
            warn!("Event stream for deployment {} lost: {reason}", self.deployment);
            connection = match self.reconnect(reason).await {
                Some(connection) => connection,
                None => return,
            };
        }
    }

    /// `None` when cancelled before the connection finished.
    async fn connect(&self) -> Option<Result<Box<dyn EventConnection>, String>> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            result = self.source.connect(&self.deployment) => {
                Some(result.map_err(|e| e.to_string()))
            }
        }
    }

    /// Makes the single reconnect attempt. Reports `Lost` and returns `None`
    /// when it fails.
    async fn reconnect(&self, reason: String) -> Option<Box<dyn EventConnection>> {
        if !self.forward(StreamSignal::Reconnecting(reason)).await {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => return None,
            _ = tokio::time::sleep(self.reconnect_delay) => {}
        }

        match self.connect().await? {
            Ok(connection) => {
                info!("Event stream for deployment {} reconnected", self.deployment);
                self.forward(StreamSignal::Reconnected).await.then_some(connection)
            }
            Err(reason) => {
                warn!(
                    "Reconnect for deployment {} failed: {reason}",
                    self.deployment
                );
                self.forward(StreamSignal::Lost(reason)).await;
                None
            }
        }
    }

    /// Returns false once the owner has gone away.
    async fn forward(&self, signal: StreamSignal) -> bool {
        let message = StreamMessage {
            generation: self.generation,
            signal,
        };
        self.sink.send(T::from(message)).await.is_ok()
    }
}
