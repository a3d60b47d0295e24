//! Validate, transform and send a form, tracking the submission state.

use std::sync::Arc;
use std::time::Duration;

use intake_spec::{AnalysisResult, FormSession, FormValidation, RedFlag, TransformError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::{AnalysisClient, ClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Validating,
    Submitting,
    Success,
    Failed,
}

/// Which user-facing message a failure maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ClientData,
    Timeout,
    Network,
    Server,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl SubmitError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SubmitError::Timeout(_) | SubmitError::Client(ClientError::Timeout) => {
                FailureKind::Timeout
            }
            SubmitError::Client(ClientError::Network(_)) => FailureKind::Network,
            SubmitError::Client(ClientError::Status { status: 408, .. }) => FailureKind::Timeout,
            SubmitError::Client(ClientError::Status { status, .. }) if *status < 500 => {
                FailureKind::ClientData
            }
            SubmitError::Client(ClientError::Status { .. } | ClientError::Decode(_)) => {
                FailureKind::Server
            }
            SubmitError::Transform(_) => FailureKind::ClientData,
        }
    }

    /// The single message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Timeout(_)
            | SubmitError::Client(ClientError::Timeout)
            | SubmitError::Client(ClientError::Status { status: 408, .. }) => {
                "Request timeout. The server is taking too long to respond. Please try again."
                    .into()
            }
            SubmitError::Client(ClientError::Network(_)) => {
                "Cannot connect to backend server. Please ensure the server is running.".into()
            }
            SubmitError::Client(ClientError::Status { status: 400, .. }) => {
                "Invalid form data. Please check all fields and try again.".into()
            }
            SubmitError::Client(ClientError::Status {
                status: 422,
                detail,
            }) => format!(
                "Invalid form data. {}",
                detail
                    .as_deref()
                    .unwrap_or("Please check all required fields.")
            ),
            SubmitError::Client(ClientError::Status { status: 503, .. }) => {
                "Backend service unavailable. Please try again later.".into()
            }
            SubmitError::Client(ClientError::Status { status, .. }) if *status >= 500 => {
                "Server error. Please try again in a moment.".into()
            }
            SubmitError::Client(_) => "Analysis failed. Please try again.".into(),
            SubmitError::Transform(err) => format!("Invalid form data. {err}"),
        }
    }
}

/// How one submit attempt ended.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Validation failed; nothing was sent.
    Invalid(FormValidation),
    /// An active red flag blocks submission; nothing was sent.
    Blocked(Vec<RedFlag>),
    Success(AnalysisResult),
    Failed(SubmitError),
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Success(_))
    }
}

pub struct SubmissionPipeline {
    client: Arc<dyn AnalysisClient>,
    timeout: Duration,
    state: watch::Sender<PipelineState>,
}

impl SubmissionPipeline {
    pub fn new(client: Arc<dyn AnalysisClient>, timeout: Duration) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            client,
            timeout,
            state,
        }
    }

    /// Receives every state transition; a front-end disables its submit
    /// control while the state is `Submitting`.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    fn transition(&self, next: PipelineState) {
        info!(state = ?next, "submission state");
        self.state.send_replace(next);
    }

    /// Runs one submission. Taking `&mut self` keeps at most one in flight.
    ///
    /// Invalid or blocked forms return to `Idle` without a network call. A
    /// sent form ends in `Success` or `Failed` and stays there until the next
    /// attempt or [`SubmissionPipeline::reset`].
    pub async fn submit(&mut self, session: &mut FormSession) -> SubmitOutcome {
        self.transition(PipelineState::Validating);

        if !session.can_submit() {
            self.transition(PipelineState::Idle);
            return SubmitOutcome::Blocked(session.red_flags().blocks().cloned().collect());
        }

        let validation = session.validate_all();
        if !validation.is_valid {
            self.transition(PipelineState::Idle);
            return SubmitOutcome::Invalid(validation);
        }

        let mut payload = match session.payload() {
            Ok(payload) => payload,
            Err(err) => return self.fail(err.into()),
        };
        payload.insert(
            "submitted_at".into(),
            Value::String(jiff::Timestamp::now().to_string()),
        );

        self.transition(PipelineState::Submitting);
        let call = self.client.analyze(Value::Object(payload));
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => self.fail(SubmitError::Timeout(self.timeout)),
            Ok(Err(err)) => self.fail(err.into()),
            Ok(Ok(result)) => {
                self.transition(PipelineState::Success);
                SubmitOutcome::Success(result)
            }
        }
    }

    fn fail(&self, err: SubmitError) -> SubmitOutcome {
        warn!(kind = ?err.kind(), error = %err, "submission failed");
        self.transition(PipelineState::Failed);
        SubmitOutcome::Failed(err)
    }

    pub fn reset(&self) {
        self.transition(PipelineState::Idle);
    }
}
