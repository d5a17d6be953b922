//! HTTP client for the remote executor API.
//!
//! Routes:
//!
//! - `POST {base}/deployments` submit a plan
//! - `POST {base}/deployments/{id}/{pause|resume|cancel|rollback}`
//! - `POST {base}/deployments/{id}/steps/{index}/skip`
//! - `GET  {base}/deployments/{id}` status snapshot

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Url,
};

use super::{RemoteExecutor, SubmitRequest, SubmitResponse};
use crate::{
    config::EngineConfig,
    error::{EngineError, Result, TransportResultExt},
    models::{ControlAction, DeploymentId, StatusReport, StepId},
};

/// reqwest-backed [`RemoteExecutor`].
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpExecutor {
    /// Creates a client for `config.executor_url`.
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http_client = build_http_client(config)?;
        let base_url = config.executor_url.trim_end_matches('/').to_string();
        endpoint(&base_url, &[])?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn deployment_url(&self, deployment: &DeploymentId, tail: &[&str]) -> Result<Url> {
        let mut segments = vec!["deployments", deployment.as_str()];
        segments.extend_from_slice(tail);
        endpoint(&self.base_url, &segments)
    }

    async fn post_control(&self, url: Url, action: ControlAction) -> Result<()> {
        let response = self
            .http_client
            .post(url.clone())
            .send()
            .await
            .map_err(|e| EngineError::control_rejected(action, format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            debug!("Executor accepted {} at {url}", action.as_str());
            Ok(())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(EngineError::control_rejected(
                action,
                format!("API error ({status}): {error_text}"),
            ))
        }
    }
}

/// Appends `segments` to `base`, percent-encoding each one so identifiers
/// cannot escape their path segment.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| EngineError::Configuration {
        message: format!("invalid URL {base}: {e}"),
    })?;
    url.path_segments_mut()
        .map_err(|()| EngineError::Configuration {
            message: format!("{base} cannot be used as a base URL"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Shared client setup for executor and analysis calls.
pub(crate) fn build_http_client(config: &EngineConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(api_key) = &config.api_key {
        let auth_value = format!("Bearer {api_key}");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| EngineError::Configuration {
                message: format!("invalid api_key: {e}"),
            })?,
        );
    }

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| EngineError::Configuration {
            message: format!("failed to create HTTP client: {e}"),
        })
}

#[async_trait]
impl RemoteExecutor for HttpExecutor {
    async fn submit(&self, request: &SubmitRequest) -> Result<DeploymentId> {
        let url = endpoint(&self.base_url, &["deployments"])?;

        let response = self
            .http_client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| EngineError::Submission {
                message: format!("HTTP request failed: {e}"),
                source: Some(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(EngineError::submission(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let body: SubmitResponse = response.json().await.map_err(|e| EngineError::Submission {
            message: format!("failed to parse response: {e}"),
            source: Some(e),
        })?;
        if body.deployment_id.trim().is_empty() {
            return Err(EngineError::submission("executor returned an empty deployment id"));
        }

        info!(
            "Executor accepted plan for incident {} as deployment {}",
            request.incident_id, body.deployment_id
        );
        Ok(DeploymentId(body.deployment_id))
    }

    async fn control(&self, deployment: &DeploymentId, action: ControlAction) -> Result<()> {
        if action == ControlAction::Skip {
            return Err(EngineError::control_rejected(
                action,
                "skip requires a step; use skip_step",
            ));
        }
        let url = self.deployment_url(deployment, &[action.as_str()])?;
        self.post_control(url, action).await
    }

    async fn skip_step(&self, deployment: &DeploymentId, step: StepId) -> Result<()> {
        let index = step.to_string();
        let url = self.deployment_url(deployment, &["steps", &index, "skip"])?;
        self.post_control(url, ControlAction::Skip).await
    }

    async fn fetch_status(&self, deployment: &DeploymentId) -> Result<StatusReport> {
        let url = self.deployment_url(deployment, &[])?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .transport_context("HTTP request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::Transport {
                message: format!("deployment {deployment} not found"),
                source: None,
            });
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(EngineError::Transport {
                message: format!("API error ({status}): {error_text}"),
                source: None,
            });
        }

        response
            .json()
            .await
            .transport_context("failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_removed() {
        let config = EngineConfig {
            executor_url: "http://executor.local/api/".to_string(),
            ..EngineConfig::default()
        };
        let executor = HttpExecutor::new(&config).unwrap();
        assert_eq!(executor.base_url(), "http://executor.local/api");
        assert_eq!(
            executor
                .deployment_url(&DeploymentId::from("d-1"), &["pause"])
                .unwrap()
                .as_str(),
            "http://executor.local/api/deployments/d-1/pause"
        );
    }

    #[test]
    fn test_identifiers_are_percent_encoded() {
        let url = endpoint("http://executor.local", &["deployments", "a/b?c#d"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://executor.local/deployments/a%2Fb%3Fc%23d"
        );
        assert!(matches!(
            endpoint("not a url", &["deployments"]),
            Err(EngineError::Configuration { .. })
        ));
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        let config = EngineConfig {
            api_key: Some("bad\nkey".to_string()),
            ..EngineConfig::default()
        };
        assert!(matches!(
            HttpExecutor::new(&config),
            Err(EngineError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_executor_is_submission_error() {
        let config = EngineConfig {
            executor_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..EngineConfig::default()
        };
        let executor = HttpExecutor::new(&config).unwrap();
        let plan = crate::models::Plan::new(
            crate::models::Provider::Claude,
            "noop",
            vec![crate::models::PlanStep {
                command: "true".to_string(),
                description: "nothing".to_string(),
            }],
            crate::models::RiskLevel::Low,
            false,
            None,
        )
        .unwrap();

        let err = executor
            .submit(&SubmitRequest {
                incident_id: "INC-1".to_string(),
                provider: crate::models::Provider::Claude,
                plan,
                execution_mode: crate::models::ExecutionMode::Automatic,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Submission { .. }));
    }
}
