use std::sync::Arc;

use intake_spec::{
    ChangeReport, FieldChanged, FormSession, FormSnapshot, FormSpec, SessionError, ValidationError,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::autosave::AutoSaver;
use crate::client::AnalysisClient;
use crate::config::IntakeConfig;
use crate::persistence::{SnapshotStore, StoreError};
use crate::pipeline::{PipelineState, SubmissionPipeline, SubmitOutcome};

/// Owns a form session and routes its edits to auto-save and its submits to
/// the pipeline.
pub struct FormController {
    session: FormSession,
    saver: AutoSaver,
    pipeline: SubmissionPipeline,
}

impl FormController {
    /// Opens a session, restoring a saved snapshot when one exists. An
    /// unreadable saved state is discarded and the form starts empty.
    pub async fn open(
        spec: Arc<FormSpec>,
        store: Arc<dyn SnapshotStore>,
        client: Arc<dyn AnalysisClient>,
        config: &IntakeConfig,
    ) -> Result<Self, StoreError> {
        let mut session = FormSession::new(spec);
        match store.load().await {
            Ok(Some(snapshot)) => {
                info!(fields = snapshot.len(), "restoring saved form");
                session.restore(snapshot);
            }
            Ok(None) => {}
            Err(err @ StoreError::Corrupt { .. }) => {
                warn!(error = %err, "discarding unreadable saved form");
                store.clear().await?;
            }
            Err(err) => return Err(err),
        }
        Ok(Self {
            session,
            saver: AutoSaver::spawn(store, config.autosave_quiet()),
            pipeline: SubmissionPipeline::new(client, config.timeout()),
        })
    }

    pub fn session(&self) -> &FormSession {
        &self.session
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.pipeline.subscribe()
    }

    /// Applies an edit and schedules the new snapshot for saving.
    pub fn change(&mut self, event: FieldChanged) -> Result<ChangeReport, SessionError> {
        let report = self.session.apply(event)?;
        self.saver.schedule(self.session.snapshot().clone());
        Ok(report)
    }

    /// Replaces every answer at once and schedules the result for saving.
    pub fn restore(&mut self, snapshot: FormSnapshot) {
        self.session.restore(snapshot);
        self.saver.schedule(self.session.snapshot().clone());
    }

    pub fn complete_section(&mut self, index: usize) -> Vec<ValidationError> {
        self.session.complete_section(index)
    }

    /// Submits the form. Success clears the saved state and the session;
    /// every other outcome keeps the answers for another attempt.
    pub async fn submit(&mut self) -> SubmitOutcome {
        let outcome = self.pipeline.submit(&mut self.session).await;
        if outcome.is_success() {
            if let Err(err) = self.saver.clear().await {
                warn!(error = %err, "could not clear saved form");
            }
            self.session.reset();
        }
        outcome
    }

    /// Writes any pending change and stops auto-saving.
    pub async fn close(self) -> Result<(), StoreError> {
        self.saver.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, MockAnalysisClient};
    use crate::persistence::MemorySnapshotStore;
    use intake_spec::{
        AnalysisResult, DiagnosisView, FieldValue, FormSnapshot, RootCause, discovery,
    };
    use serde_json::json;

    fn spec() -> Arc<FormSpec> {
        Arc::new(discovery::load().expect("discovery form"))
    }

    fn answers() -> FormSnapshot {
        FormSnapshot::from_json(&json!({
            "age": 29,
            "height_unit": "ft",
            "height_feet": 5,
            "height_inches": 11,
            "weight_kg": 75,
            "main_issue": "ed",
            "emergency_red_flags": "none",
            "medical_conditions": ["none"],
            "current_medications": ["none"],
            "spinal_genital_surgery": "no",
            "alcohol_consumption": "occasionally",
            "smoking_status": "former",
            "sleep_quality": "good",
            "physical_activity": "active",
            "relationship_status": "single",
            "masturbation_method": "hands",
            "masturbation_grip": "normal",
            "masturbation_frequency": "1_to_2",
            "porn_frequency": "rarely",
            "ed_gets_erections": "yes",
            "ed_sexual_activity_status": "not_active",
            "ed_morning_erections": "often",
            "ed_masturbation_imagination": "yes",
            "first_consultation": "no",
            "previous_treatments": ["ayurvedic"]
        }))
    }

    #[tokio::test]
    async fn restores_the_saved_form() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(answers()));
        let controller = FormController::open(
            spec(),
            store,
            Arc::new(MockAnalysisClient::new()),
            &IntakeConfig::default(),
        )
        .await
        .expect("open");
        assert_eq!(controller.session().snapshot(), &answers());
        assert!(controller.session().visibility().is_section_visible("ed_branch"));
    }

    #[tokio::test]
    async fn success_clears_saved_state() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(answers()));
        let mut mock = MockAnalysisClient::new();
        mock.expect_analyze()
            .times(1)
            .withf(|payload| payload["height_ft"] == 5 && payload["previous_treatments"] == json!(["ayurvedic"]))
            .returning(|_| Ok(AnalysisResult::default()));
        let mut controller = FormController::open(
            spec(),
            store.clone(),
            Arc::new(mock),
            &IntakeConfig::default(),
        )
        .await
        .expect("open");

        let outcome = controller.submit().await;
        assert!(outcome.is_success(), "{outcome:?}");
        assert!(controller.session().snapshot().is_empty());
        assert_eq!(store.current(), None);
    }

    #[tokio::test]
    async fn returned_root_cause_reaches_the_diagnosis_unchanged() {
        let cause = RootCause {
            category: "Performance anxiety".into(),
            simple_term: Some("Nervousness during sex".into()),
            confidence: Some("high".into()),
            confidence_score: Some(0.82),
            explanation: "Erections are fine alone but fade with a partner.".into(),
            contributing_factors: vec!["Morning erections present".into()],
            analogy: None,
        };
        let returned = AnalysisResult {
            primary_diagnosis: Some("Psychogenic ED".into()),
            root_causes: vec![cause.clone()],
            ..AnalysisResult::default()
        };
        let store = Arc::new(MemorySnapshotStore::with_snapshot(answers()));
        let mut mock = MockAnalysisClient::new();
        mock.expect_analyze()
            .times(1)
            .returning(move |_| Ok(returned.clone()));
        let mut controller = FormController::open(
            spec(),
            store.clone(),
            Arc::new(mock),
            &IntakeConfig::default(),
        )
        .await
        .expect("open");

        let SubmitOutcome::Success(result) = controller.submit().await else {
            panic!("expected success");
        };
        assert_eq!(result.root_causes, vec![cause.clone()]);

        let view = DiagnosisView::from(&result);
        assert_eq!(view.primary_diagnosis.as_deref(), Some("Psychogenic ED"));
        assert_eq!(view.root_causes.len(), 1);
        let shown = &view.root_causes[0];
        assert_eq!(shown.rank, 1);
        assert_eq!(shown.category, cause.category);
        assert_eq!(shown.simple_term, cause.simple_term);
        assert_eq!(shown.confidence_percent, 82);
        assert_eq!(shown.explanation, cause.explanation);
        assert_eq!(shown.contributing_factors, cause.contributing_factors);

        assert!(controller.session().snapshot().is_empty());
        assert_eq!(store.current(), None);
        assert_eq!(*controller.subscribe().borrow(), PipelineState::Success);
    }

    #[tokio::test]
    async fn failure_keeps_answers_for_retry() {
        let store = Arc::new(MemorySnapshotStore::with_snapshot(answers()));
        let mut mock = MockAnalysisClient::new();
        mock.expect_analyze()
            .times(2)
            .returning(|_| Err(ClientError::Network("connection refused".into())));
        let mut controller = FormController::open(
            spec(),
            store.clone(),
            Arc::new(mock),
            &IntakeConfig::default(),
        )
        .await
        .expect("open");

        for _ in 0..2 {
            let SubmitOutcome::Failed(err) = controller.submit().await else {
                panic!("expected failure");
            };
            assert!(err.user_message().starts_with("Cannot connect"));
        }
        assert_eq!(controller.session().snapshot(), &answers());
        assert_eq!(store.current(), Some(answers()));
    }

    #[tokio::test(start_paused = true)]
    async fn edits_are_saved_after_the_quiet_interval() {
        let store = Arc::new(MemorySnapshotStore::new());
        let mut controller = FormController::open(
            spec(),
            store.clone(),
            Arc::new(MockAnalysisClient::new()),
            &IntakeConfig::default(),
        )
        .await
        .expect("open");

        controller
            .change(FieldChanged::set("age", FieldValue::one("30")))
            .expect("change");
        controller
            .change(FieldChanged::set("weight_kg", FieldValue::one("70")))
            .expect("change");
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

        assert_eq!(store.writes(), 1);
        assert_eq!(store.current().map(|s| s.len()), Some(2));
        controller.close().await.expect("close");
    }

    #[tokio::test]
    async fn restored_answers_are_written_on_close() {
        let store = Arc::new(MemorySnapshotStore::new());
        let mut controller = FormController::open(
            spec(),
            store.clone(),
            Arc::new(MockAnalysisClient::new()),
            &IntakeConfig::default(),
        )
        .await
        .expect("open");

        controller.restore(answers());
        assert_eq!(controller.complete_section(0), Vec::new());
        assert_eq!(controller.session().progress().current, 2);
        controller.close().await.expect("close");
        assert_eq!(store.current(), Some(answers()));
    }
}
