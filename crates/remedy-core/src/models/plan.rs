//! Plan model definition and related functionality.

use serde::{Deserialize, Serialize};

use super::{Provider, RiskLevel};
use crate::error::{EngineError, Result};

/// One entry of a remediation plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    /// Command the executor will run
    pub command: String,

    /// Human-readable explanation of the command
    pub description: String,
}

/// Immutable remediation plan produced by the analysis service.
///
/// Fields are only reachable through accessors; once validated a plan cannot
/// be changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "PlanDocument")]
pub struct Plan {
    provider: Provider,
    description: String,
    steps: Vec<PlanStep>,
    risk_level: RiskLevel,
    reversible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimated_duration: Option<String>,
}

/// Unvalidated plan as found in JSON documents.
#[derive(Debug, Deserialize)]
struct PlanDocument {
    provider: Provider,
    #[serde(default)]
    description: String,
    steps: Vec<PlanStep>,
    #[serde(default)]
    risk_level: RiskLevel,
    #[serde(default)]
    reversible: bool,
    #[serde(default)]
    estimated_duration: Option<String>,
}

impl TryFrom<PlanDocument> for Plan {
    type Error = EngineError;

    fn try_from(doc: PlanDocument) -> Result<Self> {
        Plan::new(
            doc.provider,
            doc.description,
            doc.steps,
            doc.risk_level,
            doc.reversible,
            doc.estimated_duration,
        )
    }
}

/// Response body of the analysis service.
///
/// `steps` and `commands` are parallel arrays zipped index-wise into
/// [`PlanStep`] pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    #[serde(default)]
    pub description: String,
    pub steps: Vec<String>,
    pub commands: Vec<String>,
    #[serde(default)]
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub reversible: bool,
}

impl Plan {
    /// Creates a validated plan.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` when the plan has no steps or a
    /// step has an empty command.
    pub fn new(
        provider: Provider,
        description: impl Into<String>,
        steps: Vec<PlanStep>,
        risk_level: RiskLevel,
        reversible: bool,
        estimated_duration: Option<String>,
    ) -> Result<Self> {
        if steps.is_empty() {
            return Err(EngineError::invalid_input("steps").with_reason("plan has no steps"));
        }
        if let Some(index) = steps.iter().position(|s| s.command.trim().is_empty()) {
            return Err(EngineError::invalid_input("steps")
                .with_reason(format!("step {index} has an empty command")));
        }

        Ok(Self {
            provider,
            description: description.into(),
            steps,
            risk_level,
            reversible,
            estimated_duration,
        })
    }

    /// Builds a plan from the analysis service's parallel arrays.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` if `steps` and `commands` differ in
    /// length, or for any reason [`Plan::new`] rejects.
    pub fn from_analysis(provider: Provider, response: AnalysisResponse) -> Result<Self> {
        if response.steps.len() != response.commands.len() {
            return Err(EngineError::invalid_input("commands").with_reason(format!(
                "{} step descriptions but {} commands",
                response.steps.len(),
                response.commands.len()
            )));
        }

        let steps = response
            .commands
            .into_iter()
            .zip(response.steps)
            .map(|(command, description)| PlanStep {
                command,
                description,
            })
            .collect();

        Self::new(
            provider,
            response.description,
            steps,
            response.risk_level,
            response.reversible,
            response.estimated_time,
        )
    }

    /// Parses and validates a plan document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    /// Whether a rollback is meaningful for this plan.
    pub fn reversible(&self) -> bool {
        self.reversible
    }

    /// Display-only estimate; never used for scheduling.
    pub fn estimated_duration(&self) -> Option<&str> {
        self.estimated_duration.as_deref()
    }
}
