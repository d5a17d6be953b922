//! Client for the AI analysis service that turns an incident into a plan.

use async_trait::async_trait;
use log::info;
use reqwest::Url;
use serde::Serialize;

use crate::{
    config::EngineConfig,
    error::{EngineError, Result, TransportResultExt},
    executor::http::{build_http_client, endpoint},
    models::{AnalysisResponse, Plan, Provider},
};

/// Produces remediation plans for incidents.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Asks `provider` to analyze `incident_id`.
    ///
    /// # Errors
    ///
    /// `EngineError::Transport` for network or HTTP failures,
    /// `EngineError::InvalidInput` if the response cannot form a valid plan.
    async fn analyze(&self, incident_id: &str, provider: Provider) -> Result<Plan>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest {
    provider: Provider,
}

/// reqwest-backed [`AnalysisService`] calling
/// `POST {base}/incidents/{id}/analyze`.
#[derive(Debug, Clone)]
pub struct HttpAnalysisClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(config)?,
            base_url: config.analysis_url().trim_end_matches('/').to_string(),
        })
    }

    fn analyze_url(&self, incident_id: &str) -> Result<Url> {
        endpoint(&self.base_url, &["incidents", incident_id, "analyze"])
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn analyze(&self, incident_id: &str, provider: Provider) -> Result<Plan> {
        if incident_id.trim().is_empty() {
            return Err(EngineError::invalid_input("incident_id").with_reason("cannot be empty"));
        }

        let response = self
            .http_client
            .post(self.analyze_url(incident_id)?)
            .json(&AnalyzeRequest { provider })
            .send()
            .await
            .transport_context("HTTP request failed")?;

        let status = response.status();
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

        let body: AnalysisResponse = response
            .json()
            .await
            .transport_context("failed to parse response")?;
        let plan = Plan::from_analysis(provider, body)?;
        info!(
            "{} produced a {}-step plan for incident {incident_id}",
            provider.as_str(),
            plan.steps().len()
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_url_uses_analysis_base() {
        let config = EngineConfig {
            analysis_url: Some("http://analysis.local/v1/".to_string()),
            ..EngineConfig::default()
        };
        let client = HttpAnalysisClient::new(&config).unwrap();
        assert_eq!(
            client.analyze_url("INC-42").unwrap().as_str(),
            "http://analysis.local/v1/incidents/INC-42/analyze"
        );
        assert_eq!(
            client.analyze_url("INC 7/a").unwrap().as_str(),
            "http://analysis.local/v1/incidents/INC%207%2Fa/analyze"
        );
    }

    #[tokio::test]
    async fn test_empty_incident_rejected_before_request() {
        let client = HttpAnalysisClient::new(&EngineConfig::default()).unwrap();
        let err = client.analyze("  ", Provider::Claude).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }
}
