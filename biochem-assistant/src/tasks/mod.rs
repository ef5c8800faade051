pub mod build_prompt;
pub mod call_model;
pub mod follow_up;
pub mod ingest_files;
pub mod interpret_response;

pub use build_prompt::BuildPromptTask;
pub use call_model::CallModelTask;
pub use follow_up::{BuildFollowUpPromptTask, InterpretReplyTask};
pub use ingest_files::IngestFilesTask;
pub use interpret_response::InterpretAnalysisTask;

use analysis_flow::{Context, FlowError};
use tracing::info;

use crate::error::AssistantError;
use crate::models::PipelineStage;

/// Context keys shared by the tasks and the service.
pub mod keys {
    /// Files the user currently has selected (kept)
    pub const SELECTED_FILES: &str = "selected_files";
    /// Sources for the current action (per action)
    pub const INPUT_SOURCES: &str = "input_sources";
    /// Options for the current analysis (per action)
    pub const ANALYSIS_OPTIONS: &str = "analysis_options";
    /// Follow-up question and answer language (per action)
    pub const QUESTION: &str = "question";
    pub const LANGUAGE: &str = "language";
    /// Last pipeline stage the current action reached
    pub const STAGE: &str = "stage";
    /// Intermediate values, removed before an action commits
    pub const FILE_RECORDS: &str = "file_records";
    pub const INSTRUCTION: &str = "instruction";
    pub const RAW_RESPONSE: &str = "raw_response";
    /// Kept results
    pub const ANALYSIS: &str = "analysis";
    pub const LAB_VALUES: &str = "lab_values";
    pub const LAST_RESPONSE: &str = "last_response";
    pub const LAST_OUTCOME: &str = "last_outcome";
}

pub(crate) fn failed(task_id: &str, err: AssistantError) -> FlowError {
    FlowError::task_failed(task_id, err)
}

pub(crate) async fn enter_stage(
    context: &Context,
    task_id: &str,
    stage: PipelineStage,
) -> analysis_flow::Result<()> {
    info!(task = task_id, ?stage, "pipeline stage");
    context.set(keys::STAGE, stage).await
}
