use analysis_flow::{Context, FlowError, FlowRunner, Session, SessionStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chart::chart_from_lab_values;
use crate::client::InferenceClient;
use crate::config::Config;
use crate::error::{ActionError, AssistantError};
use crate::models::{
    ActionKind, ActionOutcome, AnalysisOptions, AnalysisType, AnalyzeRequest, InputSource,
    InterpretedAnalysis, LabValue, Language, PipelineStage, SessionView,
};
use crate::tasks::keys;
use crate::workflow::{create_flow_runners, create_session};

type ActionResult<T> = std::result::Result<T, ActionError>;

/// Session-level operations shared by the HTTP service and the CLI.
///
/// Every action runs through a [`FlowRunner`] on its own working context, so a
/// failed action leaves the stored session as it was and only the newest action
/// of a session commits. Direct edits go through [`SessionStorage::update`].
#[derive(Clone)]
pub struct Assistant {
    storage: Arc<dyn SessionStorage>,
    analysis: FlowRunner,
    follow_up: FlowRunner,
    demo_sample: PathBuf,
    default_language: Language,
}

impl Assistant {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        storage: Arc<dyn SessionStorage>,
        config: &Config,
    ) -> Self {
        let (analysis, follow_up) = create_flow_runners(client, storage.clone());
        Self {
            storage,
            analysis,
            follow_up,
            demo_sample: config.demo_sample.clone(),
            default_language: config.default_language,
        }
    }

    pub fn default_language(&self) -> Language {
        self.default_language
    }

    pub async fn create_session(&self) -> ActionResult<String> {
        let session = create_session();
        let id = session.id.clone();
        self.storage.save(session).await?;
        info!(session_id = %id, "session created");
        Ok(id)
    }

    pub async fn delete_session(&self, session_id: &str) -> ActionResult<()> {
        self.session(session_id).await?;
        self.storage.delete(session_id).await?;
        info!(session_id, "session deleted");
        Ok(())
    }

    /// Replace the session's selected files.
    pub async fn select_files(&self, session_id: &str, files: Vec<InputSource>) -> ActionResult<()> {
        self.storage
            .update(
                session_id,
                Box::new(|session| session.context.set_sync(keys::SELECTED_FILES, &files)),
            )
            .await?;
        info!(session_id, files = files.len(), "file selection replaced");
        Ok(())
    }

    /// Analyze the selected files. Files given in the request replace the
    /// selection first.
    pub async fn analyze(
        &self,
        session_id: &str,
        request: AnalyzeRequest,
    ) -> ActionResult<InterpretedAnalysis> {
        let work = working_context()?;
        let result = self.try_analyze(session_id, request, &work).await;
        self.finish(session_id, ActionKind::Analysis, &work, result).await
    }

    async fn try_analyze(
        &self,
        session_id: &str,
        request: AnalyzeRequest,
        work: &Context,
    ) -> ActionResult<InterpretedAnalysis> {
        if let Some(files) = request.files {
            self.select_files(session_id, files).await?;
        }

        let session = self.session(session_id).await?;
        let sources: Vec<InputSource> = session
            .context
            .get(keys::SELECTED_FILES)
            .await
            .unwrap_or_default();
        if sources.is_empty() {
            return Err(AssistantError::InvalidInput(
                "No files selected for analysis".to_string(),
            )
            .into());
        }

        let options = AnalysisOptions {
            analysis_type: request.analysis_type,
            notes: request.notes,
            language: request.language.unwrap_or(self.default_language),
        };
        self.run_analysis(session_id, sources, options, work).await
    }

    /// Analyze the configured sample file. The file selection is left alone.
    pub async fn run_demo(
        &self,
        session_id: &str,
        language: Option<Language>,
    ) -> ActionResult<InterpretedAnalysis> {
        let sample = InputSource::LocalPath {
            path: self.demo_sample.clone(),
            media_type: Some("text/csv".to_string()),
        };
        let options = AnalysisOptions {
            analysis_type: AnalysisType::General,
            notes: String::new(),
            language: language.unwrap_or(self.default_language),
        };

        let work = working_context()?;
        let result = self
            .run_analysis(session_id, vec![sample], options, &work)
            .await;
        self.finish(session_id, ActionKind::Demo, &work, result).await
    }

    async fn run_analysis(
        &self,
        session_id: &str,
        sources: Vec<InputSource>,
        options: AnalysisOptions,
        work: &Context,
    ) -> ActionResult<InterpretedAnalysis> {
        work.set(keys::INPUT_SOURCES, &sources).await?;
        work.set(keys::ANALYSIS_OPTIONS, &options).await?;

        self.analysis.run_with(session_id, work.clone()).await?;
        Ok(work.require(keys::ANALYSIS).await?)
    }

    /// Ask a single follow-up question about the current result, if any.
    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
        language: Option<Language>,
    ) -> ActionResult<String> {
        let work = working_context()?;
        let result = self.try_ask(session_id, question, language, &work).await;
        self.finish(session_id, ActionKind::FollowUp, &work, result).await
    }

    async fn try_ask(
        &self,
        session_id: &str,
        question: &str,
        language: Option<Language>,
        work: &Context,
    ) -> ActionResult<String> {
        work.set(keys::QUESTION, question).await?;
        work.set(keys::LANGUAGE, language.unwrap_or(self.default_language))
            .await?;

        let result = self.follow_up.run_with(session_id, work.clone()).await?;
        Ok(result.response.unwrap_or_default())
    }

    pub async fn view(&self, session_id: &str) -> ActionResult<SessionView> {
        let session = self.session(session_id).await?;
        let context = &session.context;

        let selected: Vec<InputSource> = context.get(keys::SELECTED_FILES).await.unwrap_or_default();
        let lab_values: Vec<LabValue> = context.get(keys::LAB_VALUES).await.unwrap_or_default();

        Ok(SessionView {
            session_id: session.id.clone(),
            selected_files: selected.iter().map(InputSource::display_name).collect(),
            analysis: context.get(keys::ANALYSIS).await,
            input_chart: chart_from_lab_values(&lab_values),
            lab_values,
            last_response: context.get(keys::LAST_RESPONSE).await,
            last_outcome: context.get(keys::LAST_OUTCOME).await,
            status_message: session.status_message.clone(),
        })
    }

    /// Drop the current result and last response. An action still in flight
    /// for this session will not commit afterwards.
    pub async fn clear_result(&self, session_id: &str) -> ActionResult<()> {
        self.storage
            .update(
                session_id,
                Box::new(|session| {
                    session.context.remove_sync(keys::ANALYSIS);
                    session.context.remove_sync(keys::LAST_RESPONSE);
                    session.action_seq += 1;
                    session.status_message = Some("Result cleared".to_string());
                    Ok(())
                }),
            )
            .await?;
        info!(session_id, "result cleared");
        Ok(())
    }

    /// Last textual response of the session, for export.
    pub async fn export(&self, session_id: &str) -> ActionResult<Option<String>> {
        let session = self.session(session_id).await?;
        Ok(session.context.get(keys::LAST_RESPONSE).await)
    }

    async fn session(&self, session_id: &str) -> Result<Session, FlowError> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }

    /// Record how an action ended, including the last stage it reached.
    /// Superseded actions and unknown sessions leave no trace.
    async fn finish<T>(
        &self,
        session_id: &str,
        action: ActionKind,
        work: &Context,
        result: ActionResult<T>,
    ) -> ActionResult<T> {
        let outcome = match &result {
            Ok(_) => Some(ActionOutcome::succeeded(action)),
            Err(ActionError::Flow(FlowError::Superseded(_) | FlowError::SessionNotFound(_))) => None,
            Err(e) => {
                let reached: PipelineStage = work.get(keys::STAGE).await.unwrap_or_default();
                warn!(session_id, ?action, ?reached, kind = e.kind(), error = %e, "action failed");
                Some(ActionOutcome::failed(action, reached, e.to_string()))
            }
        };

        if let Some(outcome) = outcome {
            if let Err(e) = self.record_outcome(session_id, &outcome).await {
                warn!(session_id, error = %e, "could not record action outcome");
            }
        }
        result
    }

    async fn record_outcome(&self, session_id: &str, outcome: &ActionOutcome) -> Result<(), FlowError> {
        let recorded = self
            .storage
            .update(
                session_id,
                Box::new(|session| session.context.set_sync(keys::LAST_OUTCOME, outcome)),
            )
            .await;
        match recorded {
            Ok(_) | Err(FlowError::SessionNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// Inputs of one action. The stage starts over so a committed stage from an
// earlier action is never reported for this one.
fn working_context() -> ActionResult<Context> {
    let work = Context::new();
    work.set_sync(keys::STAGE, PipelineStage::Idle)?;
    Ok(work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GenerationConfig;
    use crate::models::{PipelineStage, Severity};
    use analysis_flow::InMemorySessionStorage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const ANALYSIS_BODY: &str = r#"{"candidates":[{"content":{"parts":[{"text":"{\"summary\":\"Glucosa elevada\",\"findings\":[{\"title\":\"Glucosa\",\"description\":\"120 mg/dL\",\"severity\":\"warning\"}],\"chartData\":{\"labels\":[\"Glucosa\"],\"datasets\":[]},\"anomalies\":[\"Glucosa\"],\"recommendations\":[\"Repetir en ayunas\"]}"}]}}]}"#;

    struct Scripted {
        bodies: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(bodies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(bodies.iter().rev().map(|b| b.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for Scripted {
        async fn generate(
            &self,
            instruction: &str,
            _: &GenerationConfig,
        ) -> crate::error::Result<String> {
            self.calls.lock().unwrap().push(instruction.to_string());
            Ok(self.bodies.lock().unwrap().pop().unwrap_or_default())
        }
    }

    struct Refusing;

    #[async_trait]
    impl InferenceClient for Refusing {
        async fn generate(&self, _: &str, _: &GenerationConfig) -> crate::error::Result<String> {
            Err(AssistantError::UpstreamError {
                status: 503,
                body: "overloaded".to_string(),
            })
        }
    }

    fn assistant(client: Arc<Scripted>) -> Assistant {
        Assistant::new(
            client,
            Arc::new(InMemorySessionStorage::new()),
            &Config::default(),
        )
    }

    fn csv(text: &str) -> InputSource {
        InputSource::uploaded("labs.csv", "text/csv", text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn analysis_is_stored_with_lab_values() {
        let client = Scripted::new(&[ANALYSIS_BODY]);
        let assistant = assistant(client.clone());
        let id = assistant.create_session().await.unwrap();

        let analysis = assistant
            .analyze(
                &id,
                AnalyzeRequest {
                    files: Some(vec![csv("Glucosa: 120 mg/dL")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(analysis.result.findings[0].severity, Severity::Warning);
        let view = assistant.view(&id).await.unwrap();
        assert_eq!(view.selected_files, vec!["labs.csv"]);
        assert_eq!(view.analysis.as_ref(), Some(&analysis));
        assert_eq!(view.lab_values[0].label, "Glucosa");
        assert_eq!(view.input_chart.labels, vec!["Glucosa"]);
        assert!(view.last_response.unwrap().contains("Glucosa elevada"));
        assert_eq!(view.last_outcome.unwrap().stage, PipelineStage::Interpreted);
        assert_eq!(client.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_selection_is_rejected_before_any_call() {
        let client = Scripted::new(&[]);
        let assistant = assistant(client.clone());
        let id = assistant.create_session().await.unwrap();

        let err = assistant
            .analyze(&id, AnalyzeRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_input");
        assert!(client.calls.lock().unwrap().is_empty());
        let outcome = assistant.view(&id).await.unwrap().last_outcome.unwrap();
        assert_eq!(outcome.stage, PipelineStage::Failed);
        assert_eq!(outcome.reached, PipelineStage::Idle);
        assert_eq!(outcome.action, ActionKind::Analysis);
    }

    #[tokio::test]
    async fn failed_call_records_stage_reached() {
        let assistant = Assistant::new(
            Arc::new(Refusing),
            Arc::new(InMemorySessionStorage::new()),
            &Config::default(),
        );
        let id = assistant.create_session().await.unwrap();

        let err = assistant
            .analyze(
                &id,
                AnalyzeRequest {
                    files: Some(vec![csv("Urea: 30")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "upstream_error");
        let outcome = assistant.view(&id).await.unwrap().last_outcome.unwrap();
        assert_eq!(outcome.stage, PipelineStage::Failed);
        assert_eq!(outcome.reached, PipelineStage::AwaitingResponse);
        assert!(outcome.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn missing_demo_sample_fails_while_ingesting() {
        let config = Config {
            demo_sample: "/nonexistent/sample_data.csv".into(),
            ..Config::default()
        };
        let client = Scripted::new(&[]);
        let assistant = Assistant::new(
            client.clone(),
            Arc::new(InMemorySessionStorage::new()),
            &config,
        );
        let id = assistant.create_session().await.unwrap();

        let err = assistant.run_demo(&id, None).await.unwrap_err();

        assert_eq!(err.kind(), "file_not_found");
        let outcome = assistant.view(&id).await.unwrap().last_outcome.unwrap();
        assert_eq!(outcome.action, ActionKind::Demo);
        assert_eq!(outcome.reached, PipelineStage::Ingesting);
        assert!(client.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stage_of_earlier_success_is_not_reported_for_later_failure() {
        let assistant = assistant(Scripted::new(&[ANALYSIS_BODY]));
        let id = assistant.create_session().await.unwrap();
        assistant
            .analyze(
                &id,
                AnalyzeRequest {
                    files: Some(vec![csv("Urea: 30")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assistant
            .analyze(
                &id,
                AnalyzeRequest {
                    files: Some(Vec::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        let view = assistant.view(&id).await.unwrap();
        assert_eq!(view.last_outcome.unwrap().reached, PipelineStage::Idle);
        assert!(view.analysis.is_some());
    }

    #[tokio::test]
    async fn concurrent_selections_and_outcomes_are_all_kept() {
        let assistant = assistant(Scripted::new(&[]));
        let id = assistant.create_session().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let assistant = assistant.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    assistant
                        .select_files(&id, vec![csv("Urea: 30")])
                        .await
                        .unwrap();
                } else {
                    assistant.ask(&id, "", None).await.unwrap_err();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let view = assistant.view(&id).await.unwrap();
        assert_eq!(view.selected_files, vec!["labs.csv"]);
        assert_eq!(view.last_outcome.unwrap().action, ActionKind::FollowUp);
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let assistant = assistant(Scripted::new(&[]));
        let err = assistant.ask("nope", "¿Hola?", None).await.unwrap_err();
        assert_eq!(err.kind(), "session_not_found");
    }

    #[tokio::test]
    async fn clear_result_keeps_selection() {
        let assistant = assistant(Scripted::new(&[ANALYSIS_BODY]));
        let id = assistant.create_session().await.unwrap();
        assistant.select_files(&id, vec![csv("Urea: 30")]).await.unwrap();
        assistant.analyze(&id, AnalyzeRequest::default()).await.unwrap();

        assistant.clear_result(&id).await.unwrap();

        let view = assistant.view(&id).await.unwrap();
        assert!(view.analysis.is_none());
        assert!(view.last_response.is_none());
        assert_eq!(view.selected_files, vec!["labs.csv"]);
        assert_eq!(assistant.export(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleted_session_is_gone() {
        let assistant = assistant(Scripted::new(&[]));
        let id = assistant.create_session().await.unwrap();
        assistant.delete_session(&id).await.unwrap();
        assert_eq!(
            assistant.view(&id).await.unwrap_err().kind(),
            "session_not_found"
        );
        assert!(assistant.delete_session(&id).await.is_err());
    }
}
