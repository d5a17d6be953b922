//! WebSocket transport for executor event streams.

use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, warn};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};

use super::{EventConnection, EventSource};
use crate::{
    error::{EngineError, Result},
    executor::http::endpoint,
    models::DeploymentId,
};

/// Connects to `{stream_url}/deployments/{id}/stream`.
#[derive(Debug, Clone)]
pub struct WebSocketSource {
    stream_url: String,
    api_key: Option<String>,
}

impl WebSocketSource {
    pub fn new(stream_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            stream_url: stream_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Stream URL with the deployment id percent-encoded as one segment.
    pub fn url_for(&self, deployment: &DeploymentId) -> Result<String> {
        let url = endpoint(
            &self.stream_url,
            &["deployments", deployment.as_str(), "stream"],
        )?;
        Ok(url.into())
    }
}

#[async_trait]
impl EventSource for WebSocketSource {
    async fn connect(&self, deployment: &DeploymentId) -> Result<Box<dyn EventConnection>> {
        let url = self.url_for(deployment)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| EngineError::Stream {
                message: format!("invalid stream URL {url}: {e}"),
            })?;

        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                EngineError::Configuration {
                    message: format!("invalid api_key: {e}"),
                }
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        debug!("Connecting to event stream {url}");
        let (inner, _response) = connect_async(request)
            .await
            .map_err(|e| EngineError::Stream {
                message: format!("failed to connect to {url}: {e}"),
            })?;

        Ok(Box::new(WebSocketConnection { inner }))
    }
}

struct WebSocketConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl EventConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.inner.next().await {
            let message = message.map_err(|e| EngineError::Stream {
                message: e.to_string(),
            })?;
            match message {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => warn!("Skipping non UTF-8 binary frame"),
                },
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            debug!("Error closing event stream: {e}");
        }
    }
}
