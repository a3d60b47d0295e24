//! Analysis service client.

use std::time::Duration;

use async_trait::async_trait;
use intake_spec::{AnalysisResult, HealthStatus};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use ureq::Agent;

use crate::config::IntakeConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,
    #[error("could not reach the analysis service: {0}")]
    Network(String),
    #[error("analysis service returned status {status}")]
    Status { status: u16, detail: Option<String> },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Remote analysis operations, abstracted so the pipeline can be tested.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Sends a transformed snapshot to `POST /api/v1/analyze`.
    async fn analyze(&self, payload: Value) -> Result<AnalysisResult, ClientError>;

    /// Calls `GET /api/v1/health`.
    async fn health(&self) -> Result<HealthStatus, ClientError>;
}

/// Blocking `ureq` agent driven from tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct HttpAnalysisClient {
    agent: Agent,
    analyze_url: String,
    health_url: String,
}

impl HttpAnalysisClient {
    pub fn new(config: &IntakeConfig) -> Self {
        Self::with_timeout(config, config.timeout())
    }

    pub fn with_timeout(config: &IntakeConfig, timeout: Duration) -> Self {
        let agent = Agent::new_with_config(
            Agent::config_builder()
                .timeout_global(Some(timeout))
                .http_status_as_error(false)
                .build(),
        );
        Self {
            agent,
            analyze_url: config.analyze_url(),
            health_url: config.health_url(),
        }
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, payload: Value) -> Result<AnalysisResult, ClientError> {
        let agent = self.agent.clone();
        let url = self.analyze_url.clone();
        debug!(%url, "posting analysis request");
        blocking(move || {
            let response = agent
                .post(&url)
                .header("Accept", "application/json")
                .send_json(&payload)
                .map_err(transport_error)?;
            read_body(response)
        })
        .await
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        let agent = self.agent.clone();
        let url = self.health_url.clone();
        blocking(move || {
            let response = agent
                .get(&url)
                .header("Accept", "application/json")
                .call()
                .map_err(transport_error)?;
            read_body(response)
        })
        .await
    }
}

async fn blocking<T, F>(call: F) -> Result<T, ClientError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ClientError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| ClientError::Network(err.to_string()))?
}

fn transport_error(err: ureq::Error) -> ClientError {
    match err {
        ureq::Error::Timeout(_) => ClientError::Timeout,
        other => {
            warn!(error = %other, "analysis transport failure");
            ClientError::Network(other.to_string())
        }
    }
}

fn read_body<T: DeserializeOwned>(
    mut response: ureq::http::Response<ureq::Body>,
) -> Result<T, ClientError> {
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let detail = response
            .body_mut()
            .read_json::<Value>()
            .ok()
            .and_then(|body| error_detail(&body));
        warn!(status, "analysis service rejected request");
        return Err(ClientError::Status { status, detail });
    }
    response
        .body_mut()
        .read_json::<T>()
        .map_err(|err| ClientError::Decode(err.to_string()))
}

/// Extracts the `detail` of an error body, flattening validation error lists.
pub fn error_detail(body: &Value) -> Option<String> {
    match body.get("detail")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let messages: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    let message = item.get("msg")?.as_str()?;
                    let field = item
                        .get("loc")
                        .and_then(Value::as_array)
                        .and_then(|loc| loc.last())
                        .and_then(Value::as_str);
                    Some(match field {
                        Some(field) => format!("{field}: {message}"),
                        None => message.to_string(),
                    })
                })
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detail_accepts_plain_text() {
        assert_eq!(
            error_detail(&json!({ "detail": "age is required" })).as_deref(),
            Some("age is required")
        );
    }

    #[test]
    fn detail_flattens_validation_lists() {
        let body = json!({
            "detail": [
                { "loc": ["body", "age"], "msg": "field required" },
                { "loc": ["body", "weight"], "msg": "value is not a valid float" }
            ]
        });
        assert_eq!(
            error_detail(&body).as_deref(),
            Some("age: field required; weight: value is not a valid float")
        );
        assert_eq!(error_detail(&json!({ "error": "x" })), None);
    }

    #[tokio::test]
    async fn unreachable_service_is_a_network_error() {
        let config = IntakeConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..IntakeConfig::default()
        };
        let client = HttpAnalysisClient::with_timeout(&config, Duration::from_secs(5));
        let err = client.health().await.expect_err("nothing listens on port 9");
        assert!(matches!(err, ClientError::Network(_) | ClientError::Timeout));
    }
}
