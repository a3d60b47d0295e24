//! Response models of the remote analysis service.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One ranked root cause. The service orders them; the order is kept as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RootCause {
    pub category: String,
    pub simple_term: Option<String>,
    /// `high`, `medium` or `low`.
    pub confidence: Option<String>,
    /// 0.0 to 1.0.
    pub confidence_score: Option<f64>,
    pub explanation: String,
    pub contributing_factors: Vec<String>,
    pub analogy: Option<String>,
}

impl RootCause {
    /// Rounded confidence percentage, 0 when the service sent no score.
    pub fn confidence_percent(&self) -> u8 {
        let score = self.confidence_score.unwrap_or_default().clamp(0.0, 1.0);
        (score * 100.0).round() as u8
    }
}

/// The service reports red flags either as plain messages or as objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ServiceRedFlag {
    Message(String),
    Detailed {
        message: String,
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        severity: Option<String>,
    },
}

impl ServiceRedFlag {
    pub fn message(&self) -> &str {
        match self {
            ServiceRedFlag::Message(message) | ServiceRedFlag::Detailed { message, .. } => message,
        }
    }

    pub fn action(&self) -> Option<&str> {
        match self {
            ServiceRedFlag::Message(_) => None,
            ServiceRedFlag::Detailed { action, .. } => action.as_deref(),
        }
    }

    pub fn severity(&self) -> Option<&str> {
        match self {
            ServiceRedFlag::Message(_) => None,
            ServiceRedFlag::Detailed { severity, .. } => severity.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RecommendedAction {
    Text(String),
    Structured {
        #[serde(default)]
        action_type: Option<String>,
        description: String,
        #[serde(default)]
        priority: Option<String>,
    },
}

impl RecommendedAction {
    pub fn describe(&self) -> String {
        match self {
            RecommendedAction::Text(text) => text.clone(),
            RecommendedAction::Structured {
                description,
                priority: Some(priority),
                ..
            } => format!("{description} ({priority})"),
            RecommendedAction::Structured { description, .. } => description.clone(),
        }
    }
}

/// Body of a successful `POST /api/v1/analyze`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisResult {
    pub success: Option<bool>,
    pub primary_diagnosis: Option<String>,
    pub root_causes: Vec<RootCause>,
    pub summary: Option<String>,
    pub detailed_analysis: Option<String>,
    pub treatment_recommendation: Option<String>,
    pub recommended_actions: Vec<RecommendedAction>,
    pub red_flags: Vec<ServiceRedFlag>,
    pub requires_specialist: bool,
    pub processing_time_ms: Option<u64>,
    pub retrieval_chunks_used: Option<u32>,
    pub model_used: Option<String>,
    pub language: Option<String>,
    pub sources_used: Vec<String>,
}

/// Body of `GET /api/v1/health`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HealthStatus {
    pub status: String,
    pub version: Option<String>,
    pub timestamp: Option<String>,
    pub services: BTreeMap<String, bool>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}
