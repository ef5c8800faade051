use analysis_flow::{FlowRunner, Graph, GraphBuilder, Session, SessionStorage, Task};
use std::sync::Arc;
use uuid::Uuid;

use crate::client::{GenerationConfig, InferenceClient};
use crate::tasks::*;

pub const ANALYSIS_WORKFLOW: &str = "biochem_analysis";
pub const FOLLOW_UP_WORKFLOW: &str = "biochem_follow_up";

/// ingest → prompt → model call → interpret
pub fn build_analysis_workflow(client: Arc<dyn InferenceClient>) -> Graph {
    let tasks: Vec<Arc<dyn Task>> = vec![
        Arc::new(IngestFilesTask),
        Arc::new(BuildPromptTask),
        Arc::new(CallModelTask::new(client, GenerationConfig::analysis())),
        Arc::new(InterpretAnalysisTask),
    ];

    GraphBuilder::new(ANALYSIS_WORKFLOW).chain(tasks).build()
}

/// follow-up prompt → model call → reply
pub fn build_follow_up_workflow(client: Arc<dyn InferenceClient>) -> Graph {
    let tasks: Vec<Arc<dyn Task>> = vec![
        Arc::new(BuildFollowUpPromptTask),
        Arc::new(CallModelTask::new(client, GenerationConfig::conversational())),
        Arc::new(InterpretReplyTask),
    ];

    GraphBuilder::new(FOLLOW_UP_WORKFLOW).chain(tasks).build()
}

pub fn create_flow_runners(
    client: Arc<dyn InferenceClient>,
    session_storage: Arc<dyn SessionStorage>,
) -> (FlowRunner, FlowRunner) {
    let analysis = Arc::new(build_analysis_workflow(client.clone()));
    let follow_up = Arc::new(build_follow_up_workflow(client));
    (
        FlowRunner::new(analysis, session_storage.clone()),
        FlowRunner::new(follow_up, session_storage),
    )
}

pub fn create_session() -> Session {
    Session::new(Uuid::new_v4().to_string())
}
